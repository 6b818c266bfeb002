//! Reef swap subsystem: constant-product pools with a fused limit-order
//! book.
//!
//! Each pool pairs a Uniswap-style curve with a sorted book of maker
//! orders; a single taker swap may walk the book, cross the curve between
//! makers, pay commissions and settle every maker in one atomic step. All
//! state lives in a versioned Merkleised tree (`reef-store`) behind a
//! copy-on-write cache with deferred commit and an atomic snapshot swap.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod book;
pub mod bus;
mod engine;
pub mod error;
pub mod genesis;
pub mod key;
pub mod math;
pub mod order;
pub mod pair;
pub mod source;
pub mod swap;

pub use bus::{CoinChecker, NoopChecker, RecordingChecker};
pub use engine::{FillDetails, OrderPayout};
pub use error::SwapError;
pub use genesis::{OrderGenesis, PoolGenesis, ProviderGenesis, SwapGenesis};
pub use key::{PairKey, Side, SortPrice};
pub use order::Order;
pub use pair::{PairData, PairView, MINIMUM_LIQUIDITY};
pub use source::{OrderPage, StateSource};
pub use swap::{SnapshotCell, Swap};
