//! Per-pair order book state.
//!
//! The book keeps the canonical picture of both sides of a pair: the orders
//! faulted in from the tree, the sorted id lists the engine walks, and the
//! dirty bookkeeping that defers every mutation to commit. A trailing `0` in
//! an id list is the sentinel meaning "nothing more in the tree"; id `0` is
//! never assigned to a real order.
//!
//! Three disjoint sets drive commit and incremental re-sorting:
//! - `dirty`: the record must be re-encoded;
//! - `unsorted_*`: the price moved, the id must be re-slotted;
//! - `deleted_*`: fully consumed or cancelled, the record must be removed.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use reef_primitives::U256;

use crate::key::{PairKey, Side, SortPrice};
use crate::order::Order;
use crate::source::StateSource;

/// The side a view's sell book lives on: a reversed view sells into the
/// canonical buy side.
pub(crate) fn side_of(reversed: bool) -> Side {
    if reversed {
        Side::Buy
    } else {
        Side::Sell
    }
}

/// Consumption order on a side: price ascending on the sell side, price
/// descending on the buy side, ids ascending within a price.
fn index_cmp(a: (SortPrice, u32), b: (SortPrice, u32), side: Side) -> Ordering {
    let by_price = match side {
        Side::Sell => a.0.cmp(&b.0),
        Side::Buy => b.0.cmp(&a.0),
    };
    by_price.then(a.1.cmp(&b.1))
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Book {
    /// Canonical orders faulted in so far; `None` caches a confirmed
    /// absence.
    pub(crate) orders: HashMap<u32, Option<Order>>,
    /// Current sorted views of the two sides.
    sell_ids: Vec<u32>,
    buy_ids: Vec<u32>,
    /// Raw pagination state, exactly as read from the tree.
    loaded_sell: Vec<u32>,
    loaded_buy: Vec<u32>,
    pub(crate) dirty: BTreeSet<u32>,
    unsorted_sell: BTreeSet<u32>,
    unsorted_buy: BTreeSet<u32>,
    pub(crate) deleted_sell: BTreeSet<u32>,
    pub(crate) deleted_buy: BTreeSet<u32>,
}

impl Book {
    /// The canonical form of an order, from cache or the tree.
    pub(crate) fn order(&mut self, source: &dyn StateSource, id: u32) -> Option<Order> {
        if let Some(slot) = self.orders.get(&id) {
            return slot.clone();
        }
        let loaded = source.load_order(id);
        self.orders.insert(id, loaded.clone());
        loaded
    }

    /// An order oriented the way the requesting view sees the pair.
    pub(crate) fn oriented_order(
        &mut self,
        source: &dyn StateSource,
        reversed: bool,
        id: u32,
    ) -> Option<Order> {
        let order = self.order(source, id)?;
        Some(if reversed { order.reversed() } else { order })
    }

    /// Caches a canonical order, overwriting any stale copy.
    pub(crate) fn insert_order(&mut self, order: Order) {
        debug_assert!(order.is_sorted());
        self.orders.insert(order.id, Some(order));
    }

    /// Routes a mutated order into the dirty bookkeeping.
    pub(crate) fn mark_dirty(&mut self, order: &Order) {
        debug_assert!(order.is_sorted());
        let side = order.side();
        if order.is_empty() {
            // a partial fill earlier in the block may have queued it for
            // re-sorting; deletion supersedes that
            self.unsorted_mut(side).remove(&order.id);
            self.deleted_mut(side).insert(order.id);
        } else if !order.keeps_rate() {
            self.unsorted_mut(side).insert(order.id);
        }
        self.dirty.insert(order.id);
    }

    pub(crate) fn is_deleted(&self, id: u32) -> bool {
        self.deleted_sell.contains(&id) || self.deleted_buy.contains(&id)
    }

    fn has_pending(&self, side: Side) -> bool {
        !self.unsorted(side).is_empty() || !self.deleted(side).is_empty()
    }

    fn unsorted(&self, side: Side) -> &BTreeSet<u32> {
        match side {
            Side::Sell => &self.unsorted_sell,
            Side::Buy => &self.unsorted_buy,
        }
    }

    fn unsorted_mut(&mut self, side: Side) -> &mut BTreeSet<u32> {
        match side {
            Side::Sell => &mut self.unsorted_sell,
            Side::Buy => &mut self.unsorted_buy,
        }
    }

    fn deleted(&self, side: Side) -> &BTreeSet<u32> {
        match side {
            Side::Sell => &self.deleted_sell,
            Side::Buy => &self.deleted_buy,
        }
    }

    fn deleted_mut(&mut self, side: Side) -> &mut BTreeSet<u32> {
        match side {
            Side::Sell => &mut self.deleted_sell,
            Side::Buy => &mut self.deleted_buy,
        }
    }

    fn loaded(&self, side: Side) -> &Vec<u32> {
        match side {
            Side::Sell => &self.loaded_sell,
            Side::Buy => &self.loaded_buy,
        }
    }

    fn loaded_mut(&mut self, side: Side) -> &mut Vec<u32> {
        match side {
            Side::Sell => &mut self.loaded_sell,
            Side::Buy => &mut self.loaded_buy,
        }
    }

    fn sorted_ids(&self, side: Side) -> &Vec<u32> {
        match side {
            Side::Sell => &self.sell_ids,
            Side::Buy => &self.buy_ids,
        }
    }

    fn set_sorted_ids(&mut self, side: Side, ids: Vec<u32>) {
        match side {
            Side::Sell => self.sell_ids = ids,
            Side::Buy => self.buy_ids = ids,
        }
    }

    /// The current sorted id list for a view's sell side, sentinel included.
    pub(crate) fn sell_ids_view(&self, reversed: bool) -> &Vec<u32> {
        self.sorted_ids(side_of(reversed))
    }

    /// Folds the pending deletions and price moves of a side into `list`.
    ///
    /// Deleted and price-moved ids are filtered out; moved orders are then
    /// re-inserted at their new slot via binary search. A moved order whose
    /// new slot lies beyond the loaded window stays queued until the window
    /// grows (unless the sentinel says the window is the whole book).
    pub(crate) fn update_dirty_orders(
        &mut self,
        source: &dyn StateSource,
        reversed: bool,
        list: &[u32],
    ) -> Vec<u32> {
        let side = side_of(reversed);
        let has_sentinel = list.last() == Some(&0);
        let body = if has_sentinel {
            &list[..list.len() - 1]
        } else {
            list
        };

        let deleted = self.deleted(side).clone();
        let unsorted = self.unsorted(side).clone();

        let mut kept: Vec<(SortPrice, u32)> = Vec::with_capacity(body.len());
        for &id in body {
            if deleted.contains(&id) || unsorted.contains(&id) {
                continue;
            }
            match self.order(source, id) {
                Some(order) => kept.push((order.sort_price(), id)),
                None => break,
            }
        }

        let mut moved: Vec<(SortPrice, u32)> = Vec::with_capacity(unsorted.len());
        for &id in &unsorted {
            if let Some(order) = self.order(source, id) {
                moved.push((order.sort_price(), id));
            }
        }
        moved.sort_by(|a, b| index_cmp(*a, *b, side));

        let mut pos = 0usize;
        for entry in moved {
            let idx = pos
                + kept[pos..]
                    .partition_point(|have| index_cmp(*have, entry, side) == Ordering::Less);
            if idx == kept.len() && !has_sentinel {
                break;
            }
            kept.insert(idx, entry);
            self.unsorted_mut(side).remove(&entry.1);
            pos = idx;
        }

        let mut ids: Vec<u32> = kept.into_iter().map(|(_, id)| id).collect();
        if has_sentinel {
            ids.push(0);
        }
        ids
    }

    /// Extends the raw loaded window of a side by up to `want` ids.
    fn load_more(
        &mut self,
        source: &dyn StateSource,
        pair: PairKey,
        reversed: bool,
        want: usize,
    ) {
        let side = side_of(reversed);
        if self.loaded(side).last() == Some(&0) {
            return;
        }
        let from = self.loaded(side).last().copied().and_then(|anchor| {
            self.order(source, anchor)
                .map(|order| (order.old_sort_price, anchor))
        });
        let page = source.load_order_page(pair, side, from, want.max(1));
        let loaded = self.loaded_mut(side);
        loaded.extend_from_slice(&page.ids);
        if page.exhausted {
            loaded.push(0);
        }
    }

    /// The `index`-th order of a view's sell side under the current sort,
    /// paginating from the tree and folding dirty state until the slot is
    /// resolved or the book is exhausted.
    pub(crate) fn order_sell_by_index(
        &mut self,
        source: &dyn StateSource,
        pair: PairKey,
        reversed: bool,
        index: usize,
    ) -> Option<Order> {
        let side = side_of(reversed);
        let mut ids = self.sorted_ids(side).clone();

        loop {
            if self.has_pending(side) {
                ids = self.update_dirty_orders(source, reversed, &ids);
            }
            let full = ids.last() == Some(&0);
            let available = ids.len() - usize::from(full);
            if index < available || full {
                break;
            }

            let before = self.loaded(side).len();
            self.load_more(source, pair, reversed, index + 1 - available);
            if self.loaded(side).len() == before {
                ids.push(0);
                break;
            }
            let fresh = self.loaded(side)[before..].to_vec();
            for id in fresh {
                if id == 0 {
                    ids.push(0);
                    break;
                }
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        self.set_sorted_ids(side, ids.clone());

        let full = ids.last() == Some(&0);
        let available = ids.len() - usize::from(full);
        if index >= available {
            return None;
        }
        self.oriented_order(source, reversed, ids[index])
    }

    /// Decrements an order by the filled volumes (given in the view's
    /// orientation) and routes it into the dirty bookkeeping. Returns the
    /// canonical post-fill state.
    pub(crate) fn update_sell_order(
        &mut self,
        source: &dyn StateSource,
        reversed: bool,
        id: u32,
        amount0: U256,
        amount1: U256,
    ) -> Order {
        let (dec_buy, dec_sell) = if reversed {
            (amount1, amount0)
        } else {
            (amount0, amount1)
        };

        self.order(source, id);
        let snapshot = {
            let order = self
                .orders
                .get_mut(&id)
                .and_then(Option::as_mut)
                .unwrap_or_else(|| panic!("update of unknown order {id}"));
            order.want_buy = order
                .want_buy
                .checked_sub(dec_buy)
                .unwrap_or_else(|| panic!("order {id} overfilled on the buy side"));
            order.want_sell = order
                .want_sell
                .checked_sub(dec_sell)
                .unwrap_or_else(|| panic!("order {id} overfilled on the sell side"));
            order.clone()
        };
        self.mark_dirty(&snapshot);
        snapshot
    }

    /// Discards the loaded window and pending sets after the tree absorbed
    /// them; cached orders are re-anchored to their freshly written slots.
    pub(crate) fn reset_after_commit(&mut self) {
        let removed: Vec<u32> = self
            .deleted_sell
            .iter()
            .chain(self.deleted_buy.iter())
            .copied()
            .collect();
        for id in removed {
            self.orders.insert(id, None);
        }
        self.deleted_sell.clear();
        self.deleted_buy.clear();
        self.unsorted_sell.clear();
        self.unsorted_buy.clear();
        self.dirty.clear();
        self.sell_ids.clear();
        self.buy_ids.clear();
        self.loaded_sell.clear();
        self.loaded_buy.clear();
        for slot in self.orders.values_mut() {
            if let Some(order) = slot {
                order.old_sort_price = order.sort_price();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reef_primitives::{Address, CoinId};

    use crate::source::OrderPage;

    fn pair() -> PairKey {
        PairKey::new(CoinId(1), CoinId(2))
    }

    fn sell_order(id: u32, want_buy: u64, want_sell: u64) -> Order {
        let mut order = Order {
            id,
            pair: pair(),
            is_buy: false,
            want_buy: U256::from(want_buy),
            want_sell: U256::from(want_sell),
            owner: Address::repeat_byte(id as u8),
            height: 1,
            old_sort_price: SortPrice::ZERO,
        };
        order.old_sort_price = order.sort_price();
        order
    }

    /// Serves a fixed set of persisted orders, sorted the way the tree
    /// would sort its index keys.
    #[derive(Debug, Default)]
    struct FixtureSource {
        persisted: Mutex<HashMap<u32, Order>>,
    }

    impl FixtureSource {
        fn with(orders: Vec<Order>) -> Self {
            let source = Self::default();
            let mut persisted = source.persisted.lock();
            for order in orders {
                persisted.insert(order.id, order);
            }
            drop(persisted);
            source
        }
    }

    impl StateSource for FixtureSource {
        fn load_balance(&self, _pair: PairKey, _owner: Address) -> Option<U256> {
            None
        }

        fn load_order(&self, id: u32) -> Option<Order> {
            self.persisted.lock().get(&id).cloned()
        }

        fn load_order_page(
            &self,
            _pair: PairKey,
            side: Side,
            from: Option<(SortPrice, u32)>,
            limit: usize,
        ) -> OrderPage {
            let persisted = self.persisted.lock();
            let mut entries: Vec<(SortPrice, u32)> = persisted
                .values()
                .filter(|order| order.side() == side)
                .map(|order| (order.old_sort_price, order.id))
                .collect();
            entries.sort_by(|a, b| index_cmp(*a, *b, side));
            let ids: Vec<u32> = entries
                .into_iter()
                .filter(|entry| match from {
                    Some(anchor) => index_cmp(*entry, anchor, side) == Ordering::Greater,
                    None => true,
                })
                .map(|(_, id)| id)
                .take(limit)
                .collect();
            let exhausted = ids.len() < limit;
            OrderPage { ids, exhausted }
        }
    }

    #[test]
    fn test_walk_is_price_then_id_ordered() {
        // same price for 2 and 3: the older id wins the tie
        let source = FixtureSource::with(vec![
            sell_order(1, 100, 300),
            sell_order(2, 100, 200),
            sell_order(3, 50, 100),
            sell_order(4, 100, 100),
        ]);
        let mut book = Book::default();

        let walk: Vec<u32> = (0..5)
            .map_while(|i| book.order_sell_by_index(&source, pair(), false, i))
            .map(|order| order.id)
            .collect();
        assert_eq!(walk, vec![1, 2, 3, 4]);
        // exhausted book carries the sentinel
        assert_eq!(book.sell_ids_view(false).last(), Some(&0));
    }

    #[test]
    fn test_pagination_loads_incrementally() {
        let orders: Vec<Order> = (1..=20)
            .map(|id| sell_order(id, 100 + id as u64, 100))
            .collect();
        let source = FixtureSource::with(orders);
        let mut book = Book::default();

        let head = book.order_sell_by_index(&source, pair(), false, 0).unwrap();
        assert_eq!(head.id, 1);
        // only what was needed got faulted in
        assert!(book.sell_ids_view(false).len() < 20);

        let tail = book.order_sell_by_index(&source, pair(), false, 19).unwrap();
        assert_eq!(tail.id, 20);
        assert!(book.order_sell_by_index(&source, pair(), false, 20).is_none());
    }

    #[test]
    fn test_deleted_orders_leave_the_walk() {
        let source = FixtureSource::with(vec![
            sell_order(1, 100, 300),
            sell_order(2, 100, 200),
            sell_order(3, 100, 100),
        ]);
        let mut book = Book::default();
        assert_eq!(
            book.order_sell_by_index(&source, pair(), false, 0).unwrap().id,
            1
        );

        // full fill of the head
        book.update_sell_order(&source, false, 1, U256::from(100), U256::from(300));
        assert!(book.is_deleted(1));

        assert_eq!(
            book.order_sell_by_index(&source, pair(), false, 0).unwrap().id,
            2
        );
        assert_eq!(
            book.order_sell_by_index(&source, pair(), false, 1).unwrap().id,
            3
        );
        assert!(book.order_sell_by_index(&source, pair(), false, 2).is_none());
    }

    #[test]
    fn test_partial_fill_resorts_moved_order() {
        let source = FixtureSource::with(vec![
            sell_order(1, 100, 150),
            sell_order(2, 100, 110),
        ]);
        let mut book = Book::default();
        assert_eq!(
            book.order_sell_by_index(&source, pair(), false, 0).unwrap().id,
            1
        );

        // skewed decrement pushes order 1's ask above order 2's
        book.update_sell_order(&source, false, 1, U256::from(10), U256::from(60));
        let head = book.order_sell_by_index(&source, pair(), false, 0).unwrap();
        assert_eq!(head.id, 2);
        let second = book.order_sell_by_index(&source, pair(), false, 1).unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(second.want_sell, U256::from(90));
    }

    #[test]
    fn test_new_order_is_visible_before_commit() {
        let source = FixtureSource::with(vec![sell_order(1, 100, 200)]);
        let mut book = Book::default();

        let fresh = {
            let mut order = sell_order(2, 300, 100);
            order.old_sort_price = SortPrice::ZERO;
            order
        };
        book.insert_order(fresh.clone());
        book.mark_dirty(&fresh);

        let walk: Vec<u32> = (0..3)
            .map_while(|i| book.order_sell_by_index(&source, pair(), false, i))
            .map(|order| order.id)
            .collect();
        assert_eq!(walk, vec![1, 2]);
    }

    #[test]
    fn test_reversed_view_walks_buy_side() {
        // a canonical buy order is a sell order of the reversed view
        let buy = {
            let mut order = sell_order(5, 300, 100);
            order.is_buy = true;
            order
        };
        let source = FixtureSource::with(vec![buy]);
        let mut book = Book::default();

        assert!(book.order_sell_by_index(&source, pair(), false, 0).is_none());
        let seen = book.order_sell_by_index(&source, pair(), true, 0).unwrap();
        assert_eq!(seen.id, 5);
        // oriented to the reversed view
        assert_eq!(seen.want_buy, U256::from(100));
        assert_eq!(seen.want_sell, U256::from(300));
    }

    #[test]
    fn test_partial_then_full_fill_never_resurfaces() {
        let source = FixtureSource::with(vec![
            sell_order(1, 100, 150),
            sell_order(2, 100, 110),
        ]);
        let mut book = Book::default();
        book.order_sell_by_index(&source, pair(), false, 0);

        // skewed partial fill queues order 1 for re-sorting...
        book.update_sell_order(&source, false, 1, U256::from(10), U256::from(60));
        // ...and a later fill consumes the rest of it
        book.update_sell_order(&source, false, 1, U256::from(90), U256::from(90));
        assert!(book.is_deleted(1));

        let walk: Vec<u32> = (0..3)
            .map_while(|i| book.order_sell_by_index(&source, pair(), false, i))
            .map(|order| order.id)
            .collect();
        assert_eq!(walk, vec![2]);
    }

    #[test]
    fn test_reset_after_commit_drops_consumed_orders() {
        let source = FixtureSource::with(vec![sell_order(1, 100, 200)]);
        let mut book = Book::default();
        book.update_sell_order(&source, false, 1, U256::from(100), U256::from(200));
        assert!(book.is_deleted(1));

        book.reset_after_commit();
        assert!(!book.is_deleted(1));
        assert_eq!(book.order(&source, 1), None);
        assert!(book.dirty.is_empty());
    }
}
