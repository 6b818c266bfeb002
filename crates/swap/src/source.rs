//! Read access of pairs and books into the committed state tree.

use reef_primitives::{Address, U256};

use crate::key::{PairKey, Side, SortPrice};
use crate::order::Order;

/// One page of order ids read from the sorted index.
#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    /// Ids in consumption order for the scanned side.
    pub ids: Vec<u32>,
    /// Whether the scan ran out of entries before filling the page.
    pub exhausted: bool,
}

/// Lazy-loading callbacks a pair uses to fault state in from the current
/// snapshot. Implemented by the swap over its snapshot cell, so every pair
/// automatically follows the atomic snapshot swap at end of block.
pub trait StateSource: Send + Sync {
    /// Provider liquidity, if a balance record exists.
    fn load_balance(&self, pair: PairKey, owner: Address) -> Option<U256>;

    /// A persisted order in canonical form, with `old_sort_price` anchored
    /// to the persisted position.
    fn load_order(&self, id: u32) -> Option<Order>;

    /// Up to `limit` order ids of `pair`'s `side`, starting strictly after
    /// `from` (or from the top of the book when `None`).
    fn load_order_page(
        &self,
        pair: PairKey,
        side: Side,
        from: Option<(SortPrice, u32)>,
        limit: usize,
    ) -> OrderPage;
}
