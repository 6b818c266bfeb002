//! Reef shared primitive types.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use core::fmt;

use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, B256, I256, U256, U512};

/// Identifier of a fungible coin registered on the network.
///
/// Coin ids are assigned by the coin subsystem and never reused. The id `0`
/// is reserved for the network's base coin.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CoinId(pub u32);

impl CoinId {
    /// The network's base coin.
    pub const BASE: CoinId = CoinId(0);

    /// Big-endian byte form, used in state tree keys.
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn is_base(self) -> bool {
        self == Self::BASE
    }
}

impl From<u32> for CoinId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<CoinId> for u32 {
    fn from(id: CoinId) -> Self {
        id.0
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
