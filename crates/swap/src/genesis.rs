//! Genesis export and import of the swap state.
//!
//! The export walks the committed snapshot only, so it must run after a
//! commit; pools come out sorted by `(coin0, coin1)` with providers sorted
//! by address, orders by id — byte-identical JSON on every node.

use alloy_rlp::Decodable;
use reef_primitives::{Address, CoinId, U256};
use serde::{Deserialize, Serialize};

use crate::{
    key::PairKey,
    order::{Order, OrderRecord},
    pair::{BalanceEntry, BalanceRecord, PairRecord},
    swap::{Swap, SwapKeyKind},
};

/// The swap section of the chain's genesis document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapGenesis {
    pub pools: Vec<PoolGenesis>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<OrderGenesis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolGenesis {
    pub coin0: CoinId,
    pub coin1: CoinId,
    pub reserve0: String,
    pub reserve1: String,
    pub total_supply: String,
    pub providers: Vec<ProviderGenesis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderGenesis {
    pub address: Address,
    pub liquidity: String,
}

/// An open order, in the orientation the maker posted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGenesis {
    pub id: u32,
    pub coin_buy: CoinId,
    pub coin_sell: CoinId,
    pub want_buy: String,
    pub want_sell: String,
    pub owner: Address,
    pub height: u64,
}

impl SwapGenesis {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("genesis serialisation cannot fail")
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn parse_amount(value: &str) -> U256 {
    value.parse().expect("invalid genesis amount")
}

impl Swap {
    /// Exports every pool, provider balance and open order from the current
    /// snapshot.
    pub fn export(&self) -> SwapGenesis {
        let snapshot = self.snapshot();
        let mut pools: Vec<PoolGenesis> = Vec::new();

        let (start, end) = Swap::swap_range();
        snapshot.iterate_range(&start, &end, true, |key_bytes, value| {
            match Swap::classify_swap_key(key_bytes) {
                SwapKeyKind::Pair => {
                    let pair_key =
                        PairKey::from_be_bytes(key_bytes[1..9].try_into().expect("pair key"));
                    let record =
                        PairRecord::decode(&mut &value[..]).expect("corrupt pair record");
                    pools.push(PoolGenesis {
                        coin0: pair_key.coin0,
                        coin1: pair_key.coin1,
                        reserve0: record.reserve0.to_string(),
                        reserve1: record.reserve1.to_string(),
                        total_supply: record.total_supply.to_string(),
                        providers: Vec::new(),
                    });
                }
                SwapKeyKind::Balance => {
                    let address = Address::from_slice(&key_bytes[9..29]);
                    let record =
                        BalanceRecord::decode(&mut &value[..]).expect("corrupt balance record");
                    let pool = pools.last_mut().expect("balance record without its pool");
                    pool.providers.push(ProviderGenesis {
                        address,
                        liquidity: record.liquidity.to_string(),
                    });
                }
                SwapKeyKind::Index => {}
            }
            false
        });

        let mut orders: Vec<OrderGenesis> = Vec::new();
        let (start, end) = Swap::order_range();
        snapshot.iterate_range(&start, &end, true, |key_bytes, value| {
            let id = u32::from_be_bytes(key_bytes[1..5].try_into().expect("order id"));
            let record = OrderRecord::decode(&mut &value[..]).expect("corrupt order record");
            let order = Order::from_record(id, record);
            // export as posted: the maker sells coin1 of this orientation
            let posted = if order.is_buy {
                order.reversed()
            } else {
                order
            };
            orders.push(OrderGenesis {
                id,
                coin_buy: posted.pair.coin0,
                coin_sell: posted.pair.coin1,
                want_buy: posted.want_buy.to_string(),
                want_sell: posted.want_sell.to_string(),
                owner: posted.owner,
                height: posted.height,
            });
            false
        });

        SwapGenesis { pools, orders }
    }

    /// Seeds an empty swap from a genesis document. Everything lands dirty
    /// and is persisted by the first commit.
    pub fn import(&self, genesis: &SwapGenesis) {
        for pool in &genesis.pools {
            let view = self.return_pair(pool.coin0, pool.coin1);
            let reserve0 = parse_amount(&pool.reserve0);
            let reserve1 = parse_amount(&pool.reserve1);
            let (canonical0, canonical1) = if view.reversed {
                (reserve1, reserve0)
            } else {
                (reserve0, reserve1)
            };
            {
                let mut data = view.pair.data.write();
                data.reserve0 = canonical0;
                data.reserve1 = canonical1;
                data.total_supply = parse_amount(&pool.total_supply);
                data.dirty = true;
            }
            let mut balances = view.pair.balances.write();
            for provider in &pool.providers {
                balances.insert(
                    provider.address,
                    Some(BalanceEntry {
                        liquidity: parse_amount(&provider.liquidity),
                        dirty: true,
                    }),
                );
            }
        }

        for order in &genesis.orders {
            self.pair_add_order_with_id(
                order.coin_buy,
                order.coin_sell,
                parse_amount(&order.want_buy),
                parse_amount(&order.want_sell),
                order.owner,
                order.id,
                order.height,
            );
        }
    }
}
