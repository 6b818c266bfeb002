//! Reef versioned key-value store.
//!
//! State subsystems read committed state through an immutable [`Snapshot`]
//! and stage block mutations into a [`MutableTree`]. Committing a builder
//! produces the next snapshot together with a deterministic Merkle root over
//! the full key space, so two nodes applying the same writes always agree on
//! the resulting root.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use alloy_primitives::{keccak256, B256};

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// Immutable view of the store at a committed version.
///
/// Snapshots are cheap to clone and safe to read from any thread while the
/// next block is being built.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    root: B256,
    entries: Arc<Entries>,
}

impl Snapshot {
    /// The snapshot of the empty store, version 0.
    pub fn empty() -> Self {
        let entries = Entries::new();
        let root = merkle_root(&entries);
        Self {
            version: 0,
            root,
            entries: Arc::new(entries),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Root hash over every key/value pair at this version.
    pub fn root_hash(&self) -> B256 {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visits every entry with `start <= key < end` in key order
    /// (reverse key order when `ascending` is false). The visitor returns
    /// `true` to stop early; the call reports whether it was stopped.
    pub fn iterate_range(
        &self,
        start: &[u8],
        end: &[u8],
        ascending: bool,
        visit: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> bool {
        iterate_range(&self.entries, start, end, ascending, visit)
    }
}

/// Mutation staging area for the next version.
///
/// A builder starts from a parent snapshot, absorbs the block's writes and
/// removals, and is consumed by [`MutableTree::commit`] into the next
/// [`Snapshot`]. Dropping the builder discards every staged change.
#[derive(Debug)]
pub struct MutableTree {
    version: u64,
    entries: Entries,
}

impl MutableTree {
    pub fn from_snapshot(parent: &Snapshot) -> Self {
        Self {
            version: parent.version,
            entries: (*parent.entries).clone(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes a key. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    /// See [`Snapshot::iterate_range`].
    pub fn iterate_range(
        &self,
        start: &[u8],
        end: &[u8],
        ascending: bool,
        visit: impl FnMut(&[u8], &[u8]) -> bool,
    ) -> bool {
        iterate_range(&self.entries, start, end, ascending, visit)
    }

    /// Seals the staged state into the next version's snapshot.
    pub fn commit(self) -> Snapshot {
        let root = merkle_root(&self.entries);
        Snapshot {
            version: self.version + 1,
            root,
            entries: Arc::new(self.entries),
        }
    }
}

fn iterate_range(
    entries: &Entries,
    start: &[u8],
    end: &[u8],
    ascending: bool,
    mut visit: impl FnMut(&[u8], &[u8]) -> bool,
) -> bool {
    let range = entries.range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)));
    if ascending {
        for (key, value) in range {
            if visit(key, value) {
                return true;
            }
        }
    } else {
        for (key, value) in range.rev() {
            if visit(key, value) {
                return true;
            }
        }
    }
    false
}

/// Binary Merkle root over the sorted entries.
///
/// Leaves are `keccak256(len(key) BE8 || key || value)`; odd nodes are
/// carried up unhashed. The empty store hashes to `keccak256([])`.
fn merkle_root(entries: &Entries) -> B256 {
    let mut level: Vec<B256> = entries
        .iter()
        .map(|(key, value)| {
            let mut leaf = Vec::with_capacity(8 + key.len() + value.len());
            leaf.extend_from_slice(&(key.len() as u64).to_be_bytes());
            leaf.extend_from_slice(key);
            leaf.extend_from_slice(value);
            keccak256(&leaf)
        })
        .collect();

    if level.is_empty() {
        return keccak256([]);
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => {
                    let mut node = [0u8; 64];
                    node[..32].copy_from_slice(left.as_slice());
                    node[32..].copy_from_slice(right.as_slice());
                    next.push(keccak256(node));
                }
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        level = next;
    }
    level[0]
}
