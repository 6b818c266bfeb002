//! Limit orders.
//!
//! An order is a maker-posted promise to exchange `want_sell` of one side of
//! a pair for `want_buy` of the other, at the implied fixed price
//! `want_sell / want_buy`. Orders are stored in the canonical pair
//! orientation; a reversed view sees the same order with the roles of the
//! two volumes swapped.
//!
//! # Lifecycle
//! 1. Created by `add_order` with a fresh monotonic id, landing in the
//!    unsorted set until the sorted list absorbs it.
//! 2. Partially filled by the swap engine: volumes decrement, and when the
//!    implied price leaves its old slot the order is queued for re-sort.
//! 3. Destroyed on full fill or explicit removal: both volumes reach zero
//!    and the record is deleted from the tree at commit.

use alloy_rlp::{RlpDecodable, RlpEncodable};
use reef_primitives::{Address, CoinId, U256};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::key::{PairKey, Side, SortPrice};

/// A limit order, oriented to the pair view it was fetched through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: u32,
    pub pair: PairKey,
    /// Whether this instance buys `coin0` of its orientation. The canonical
    /// form of an order created through a reversed view has this set.
    pub is_buy: bool,
    /// Remaining amount of `coin0` the maker wants to receive.
    pub want_buy: U256,
    /// Remaining amount of `coin1` the maker offers.
    pub want_sell: U256,
    pub owner: Address,
    /// Block height the order was created at.
    pub height: u64,
    /// Canonical sort price at load time; locates the persisted index entry
    /// until the next commit re-anchors it.
    pub old_sort_price: SortPrice,
}

impl Order {
    /// True when fully consumed. An order with exactly one zero volume is
    /// unrepresentable; hitting one means an engine bug, so halt.
    pub fn is_empty(&self) -> bool {
        if self.want_buy.is_zero() && self.want_sell.is_zero() {
            return true;
        }
        assert!(
            !self.want_buy.is_zero() && !self.want_sell.is_zero(),
            "order {} has one zero volume: {}, {}",
            self.id,
            self.want_buy,
            self.want_sell,
        );
        false
    }

    pub fn is_sell(&self) -> bool {
        !self.is_buy
    }

    /// Whether this instance is in the canonical orientation.
    pub fn is_sorted(&self) -> bool {
        self.pair.is_ordered()
    }

    /// The same order seen from the opposite orientation.
    pub fn reversed(&self) -> Order {
        Order {
            id: self.id,
            pair: self.pair.reverted(),
            is_buy: !self.is_buy,
            want_buy: self.want_sell,
            want_sell: self.want_buy,
            owner: self.owner,
            height: self.height,
            old_sort_price: self.old_sort_price,
        }
    }

    /// The canonical form.
    pub fn sorted(&self) -> Order {
        if self.is_sorted() {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// Which side of the canonical book this order lives on.
    pub fn side(&self) -> Side {
        let canonical_buy = if self.is_sorted() {
            self.is_buy
        } else {
            !self.is_buy
        };
        if canonical_buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Current price in the canonical sort encoding.
    pub fn sort_price(&self) -> SortPrice {
        if self.is_sorted() {
            SortPrice::of(self.want_buy, self.want_sell)
        } else {
            SortPrice::of(self.want_sell, self.want_buy)
        }
    }

    /// Whether the order still sits at the price it was loaded with.
    pub fn keeps_rate(&self) -> bool {
        self.sort_price() == self.old_sort_price
    }

    pub(crate) fn to_record(&self) -> OrderRecord {
        let sorted = self.sorted();
        OrderRecord {
            is_buy: sorted.is_buy,
            want_buy: sorted.want_buy,
            want_sell: sorted.want_sell,
            owner: sorted.owner,
            height: sorted.height,
            coin0: sorted.pair.coin0.into(),
            coin1: sorted.pair.coin1.into(),
        }
    }

    pub(crate) fn from_record(id: u32, record: OrderRecord) -> Order {
        let mut order = Order {
            id,
            pair: PairKey::new(CoinId(record.coin0), CoinId(record.coin1)),
            is_buy: record.is_buy,
            want_buy: record.want_buy,
            want_sell: record.want_sell,
            owner: record.owner,
            height: record.height,
            old_sort_price: SortPrice::ZERO,
        };
        order.old_sort_price = order.sort_price();
        order
    }
}

/// Wire form of an order record, always canonical.
#[derive(Debug, Clone, RlpEncodable, RlpDecodable)]
pub(crate) struct OrderRecord {
    pub is_buy: bool,
    pub want_buy: U256,
    pub want_sell: U256,
    pub owner: Address,
    pub height: u64,
    pub coin0: u32,
    pub coin1: u32,
}

impl Serialize for Order {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Order", 4)?;
        state.serialize_field("buy", &self.want_buy.to_string())?;
        state.serialize_field("sell", &self.want_sell.to_string())?;
        state.serialize_field("seller", &self.owner)?;
        state.serialize_field("id", &self.id)?;
        state.end()
    }
}
