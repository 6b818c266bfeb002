//! Pair keys, state tree paths and the order index key codec.
//!
//! Every pair-addressed record is stored in the canonical orientation
//! `coin0 < coin1`. Key layout under the swap prefix:
//!
//! ```text
//! s | coin0(4) | coin1(4)                                  pair record
//! s | coin0(4) | coin1(4) | address(20)                    provider balance
//! s | coin0(4) | coin1(4) | side(1) | bucket(1)
//!                         | mantissa(8) | id BE(4)         order index entry
//! o | id BE(4)                                             order record
//! i                                                        order id high-water mark
//! n                                                        pair id high-water mark
//! ```
//!
//! The index suffix is built so that one ascending range scan per side yields
//! orders in consumption order: the sell side stores the canonical sort price
//! directly (price ascending, id ascending), the buy side stores its bitwise
//! complement (price descending, id ascending).

use reef_primitives::{Address, CoinId, U256, U512};
use serde::{Deserialize, Serialize};

/// Prefix of every pair-addressed record.
pub const SWAP_PREFIX: u8 = b's';
/// Prefix of order records.
pub const ORDER_PREFIX: u8 = b'o';
/// Key of the order id high-water mark.
pub const ORDER_COUNTER_KEY: [u8; 1] = [b'i'];
/// Key of the pair id high-water mark.
pub const PAIR_COUNTER_KEY: [u8; 1] = [b'n'];

/// Byte length of a pair record key.
pub const PAIR_KEY_LEN: usize = 9;
/// Byte length of a provider balance key.
pub const BALANCE_KEY_LEN: usize = PAIR_KEY_LEN + 20;
/// Byte length of an order index key.
pub const INDEX_KEY_LEN: usize = PAIR_KEY_LEN + 1 + 1 + 8 + 4;

/// Order book side, in canonical pair orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

/// A coin pair in a caller-chosen orientation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PairKey {
    pub coin0: CoinId,
    pub coin1: CoinId,
}

impl PairKey {
    pub fn new(coin0: CoinId, coin1: CoinId) -> Self {
        Self { coin0, coin1 }
    }

    /// Whether this orientation is the canonical (stored) one.
    pub fn is_ordered(&self) -> bool {
        self.coin0 < self.coin1
    }

    /// The canonical orientation of this pair.
    pub fn ordered(self) -> Self {
        if self.is_ordered() {
            self
        } else {
            self.reverted()
        }
    }

    pub fn reverted(self) -> Self {
        Self {
            coin0: self.coin1,
            coin1: self.coin0,
        }
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.coin0.to_be_bytes());
        bytes[4..].copy_from_slice(&self.coin1.to_be_bytes());
        bytes
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self {
            coin0: CoinId::from_be_bytes(bytes[..4].try_into().expect("four bytes")),
            coin1: CoinId::from_be_bytes(bytes[4..].try_into().expect("four bytes")),
        }
    }

    /// Path of the pair record. The key must be canonical.
    pub fn path_pair(&self) -> Vec<u8> {
        let mut path = Vec::with_capacity(PAIR_KEY_LEN);
        path.push(SWAP_PREFIX);
        path.extend_from_slice(&self.to_be_bytes());
        path
    }

    /// Path of a provider's balance record. The key must be canonical.
    pub fn path_balance(&self, address: Address) -> Vec<u8> {
        let mut path = self.path_pair();
        path.extend_from_slice(address.as_slice());
        path
    }

    /// Index entry key for an order at `price` on `side`.
    pub fn index_key(&self, side: Side, price: SortPrice, id: u32) -> Vec<u8> {
        let mut key = self.path_pair();
        key.push(side as u8);
        key.extend_from_slice(&price.index_suffix(side, id));
        key
    }

    /// Half-open scan bounds covering the whole `side` of the index.
    pub fn index_bounds(&self, side: Side) -> (Vec<u8>, Vec<u8>) {
        let mut start = self.path_pair();
        let mut end = start.clone();
        start.push(side as u8);
        end.push(side as u8 + 1);
        (start, end)
    }

    /// Scan start strictly after the entry of (`price`, `id`) on `side`.
    pub fn index_start_after(&self, side: Side, price: SortPrice, id: u32) -> Vec<u8> {
        let mut start = self.index_key(side, price, id);
        start.push(0x00);
        start
    }
}

/// Path of an order record.
pub fn path_order(id: u32) -> [u8; 5] {
    let mut path = [0u8; 5];
    path[0] = ORDER_PREFIX;
    path[1..].copy_from_slice(&id.to_be_bytes());
    path
}

/// Decodes the order id from the tail of an index entry key.
pub fn index_key_id(key: &[u8]) -> u32 {
    let tail: [u8; 4] = key[key.len() - 4..].try_into().expect("four byte tail");
    u32::from_be_bytes(tail)
}

/// An order price in canonical orientation, reduced to the fixed-point form
/// the index keys are sorted by.
///
/// `bucket` is the biased binary exponent of the price, `mantissa` its top 64
/// bits. Comparing `(bucket, mantissa)` compares prices; two prices closer
/// together than 1 part in 2^64 collapse into the same slot and fall back to
/// the id tiebreak. Prices beyond `2^±127` saturate into the end buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SortPrice {
    bucket: u8,
    mantissa: u64,
}

impl SortPrice {
    /// The price of an empty or freshly created order; sorts before
    /// everything and never matches a live price.
    pub const ZERO: SortPrice = SortPrice {
        bucket: 0,
        mantissa: 0,
    };

    /// Sort price of an order: `want_buy / want_sell` in canonical
    /// orientation. The sell side is consumed ascending in this price, so
    /// the maker asking the least per unit offered trades first.
    pub fn of(want_buy: U256, want_sell: U256) -> Self {
        if want_buy.is_zero() || want_sell.is_zero() {
            return Self::ZERO;
        }
        // Q256 fixed point of the quotient; at least 1 because the numerator
        // is shifted past any possible denominator
        let q: U512 = (U512::from(want_buy) << 256) / U512::from(want_sell);
        let bits = q.bit_len();
        let exponent = bits as i32 - 257;
        let bucket = (exponent + 128).clamp(0, 255) as u8;
        let mantissa = if bits >= 64 {
            (q >> (bits - 64)).to::<u64>()
        } else {
            (q << (64 - bits)).to::<u64>()
        };
        Self { bucket, mantissa }
    }

    /// Key suffix `bucket | mantissa BE | id BE`, complemented on the buy
    /// side so ascending scans run price-descending there.
    fn index_suffix(self, side: Side, id: u32) -> [u8; 13] {
        let mut suffix = [0u8; 13];
        suffix[0] = self.bucket;
        suffix[1..9].copy_from_slice(&self.mantissa.to_be_bytes());
        suffix[9..].copy_from_slice(&id.to_be_bytes());
        if side == Side::Buy {
            for byte in &mut suffix[..9] {
                *byte = !*byte;
            }
        }
        suffix
    }
}
