//! Property-based invariants of the swap subsystem.

use std::sync::Arc;

use proptest::collection::vec;
use proptest::prelude::*;
use reef_primitives::{Address, CoinId, U256, U512};
use reef_store::{MutableTree, Snapshot};
use reef_swap::{math, RecordingChecker, Swap};

fn provider(tag: u8) -> Address {
    Address::repeat_byte(tag)
}

fn fresh_swap() -> Swap {
    Swap::new(Arc::new(RecordingChecker::new()), Snapshot::empty())
}

fn commit_cycle(swap: &Swap) -> Snapshot {
    let mut tree = MutableTree::from_snapshot(&swap.snapshot());
    swap.commit(&mut tree);
    let snapshot = tree.commit();
    swap.set_snapshot(snapshot.clone());
    snapshot
}

fn k_of(swap: &Swap) -> U512 {
    let (_, r0, r1) = swap.swap_pool(CoinId(1), CoinId(2)).unwrap();
    math::widen(r0) * math::widen(r1)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Selling then buying the result back never costs less than the
    /// original input, beyond the permitted one-unit rounding slack.
    #[test]
    fn prop_quote_round_trip_never_underestimates(
        reserve0 in 10_000u64..1_000_000_000,
        reserve1 in 10_000u64..1_000_000_000,
        amount in 1_000u64..100_000,
    ) {
        let swap = fresh_swap();
        swap.pair_mint(
            provider(0x11),
            CoinId(1),
            CoinId(2),
            U256::from(reserve0),
            U256::from(reserve1),
        );

        let out = swap
            .pair_calculate_buy_for_sell(CoinId(1), CoinId(2), U256::from(amount))
            .unwrap();
        prop_assume!(!out.is_zero());

        let back = swap
            .pair_calculate_sell_for_buy(CoinId(1), CoinId(2), out)
            .unwrap();
        prop_assert!(
            back <= U256::from(amount + 1),
            "sell {amount} -> {out} -> buy back {back}"
        );
    }

    /// The constant product never decreases under curve swaps in either
    /// direction.
    #[test]
    fn prop_k_never_decreases_on_curve(
        reserve0 in 100_000u64..1_000_000_000,
        reserve1 in 100_000u64..1_000_000_000,
        sells in vec(1_000u64..50_000, 1..8),
    ) {
        let swap = fresh_swap();
        swap.pair_mint(
            provider(0x11),
            CoinId(1),
            CoinId(2),
            U256::from(reserve0),
            U256::from(reserve1),
        );

        let mut k = k_of(&swap);
        for (index, amount) in sells.iter().enumerate() {
            // alternate directions to stir both reserves
            let (coin0, coin1) = if index % 2 == 0 {
                (CoinId(1), CoinId(2))
            } else {
                (CoinId(2), CoinId(1))
            };
            let quote = swap
                .pair_calculate_buy_for_sell(coin0, coin1, U256::from(*amount))
                .unwrap();
            if quote.is_zero() {
                continue;
            }
            swap.pair_sell(coin0, coin1, U256::from(*amount), U256::ZERO);

            let next = k_of(&swap);
            prop_assert!(next >= k, "k shrank: {k} -> {next}");
            k = next;
        }
    }

    /// Total supply always equals the sum of every provider balance,
    /// including the permanently locked zero-address share.
    #[test]
    fn prop_supply_equals_sum_of_balances(
        initial in 10_000u64..1_000_000,
        deposits in vec((0u8..3, 1_000u64..100_000), 1..10),
        burn_share in 1u64..100,
    ) {
        let swap = fresh_swap();
        let tags = [0x11u8, 0x22, 0x33];
        swap.pair_mint(
            provider(tags[0]),
            CoinId(1),
            CoinId(2),
            U256::from(initial),
            U256::from(initial),
        );

        for (who, amount) in &deposits {
            let owner = provider(tags[*who as usize]);
            if swap
                .check_mint(CoinId(1), CoinId(2), U256::from(*amount), U256::MAX)
                .is_ok()
            {
                swap.pair_mint(owner, CoinId(1), CoinId(2), U256::from(*amount), U256::MAX);
            }
        }

        // burn part of the first provider's stake when allowed
        let pair = swap.pair(CoinId(1), CoinId(2)).unwrap();
        if let Some(balance) = pair.balance(provider(tags[0])) {
            let liquidity = balance * U256::from(burn_share) / U256::from(100u64);
            if !liquidity.is_zero()
                && swap
                    .check_burn(
                        provider(tags[0]),
                        CoinId(1),
                        CoinId(2),
                        liquidity,
                        U256::ZERO,
                        U256::ZERO,
                    )
                    .is_ok()
            {
                swap.pair_burn(
                    provider(tags[0]),
                    CoinId(1),
                    CoinId(2),
                    liquidity,
                    U256::ZERO,
                    U256::ZERO,
                );
            }
        }

        let pair = swap.pair(CoinId(1), CoinId(2)).unwrap();
        let mut sum = pair.balance(Address::ZERO).unwrap_or_default();
        for tag in tags {
            sum += pair.balance(provider(tag)).unwrap_or_default();
        }
        prop_assert_eq!(pair.total_supply(), sum);
    }

    /// Consuming the book never moves its head to a better price: each
    /// sell leaves the head's sort price at or above where it was.
    #[test]
    fn prop_head_price_is_monotonic_under_sells(
        asks in vec((500u64..5_000, 2u64..5), 2..6),
        sells in vec(500u64..4_000, 1..6),
    ) {
        let swap = fresh_swap();
        swap.pair_mint(
            provider(0x11),
            CoinId(1),
            CoinId(2),
            U256::from(1_000_000),
            U256::from(1_000_000),
        );
        for (want_buy, premium) in &asks {
            // all makers price above the pool so the walk never needs the
            // curve to bridge
            swap.pair_add_order(
                CoinId(1),
                CoinId(2),
                U256::from(*want_buy),
                U256::from(want_buy * premium),
                provider(0x22),
                1,
            );
        }

        let pair = swap.pair(CoinId(1), CoinId(2)).unwrap();
        let mut floor = pair.order_sell_by_index(0).map(|order| order.sort_price());

        for amount in &sells {
            swap.pair_sell_with_orders(CoinId(1), CoinId(2), U256::from(*amount), U256::ZERO);
            let head = pair.order_sell_by_index(0).map(|order| order.sort_price());
            if let (Some(before), Some(after)) = (floor, head) {
                prop_assert!(after >= before, "head price improved: {before:?} -> {after:?}");
            }
            floor = head;
        }
    }

    /// A fully consumed order is gone from the walk and from the tree.
    #[test]
    fn prop_full_fill_leaves_nothing_behind(
        want_buy in 500u64..5_000,
        premium in 2u64..5,
        overshoot in 1_000u64..10_000,
    ) {
        let swap = fresh_swap();
        swap.pair_mint(
            provider(0x11),
            CoinId(1),
            CoinId(2),
            U256::from(1_000_000),
            U256::from(1_000_000),
        );
        let (id, _) = swap.pair_add_order(
            CoinId(1),
            CoinId(2),
            U256::from(want_buy),
            U256::from(want_buy * premium),
            provider(0x22),
            1,
        );
        commit_cycle(&swap);

        swap.pair_sell_with_orders(
            CoinId(1),
            CoinId(2),
            U256::from(want_buy + overshoot),
            U256::ZERO,
        );
        let snapshot = commit_cycle(&swap);

        prop_assert!(swap.get_order(id).is_none());
        let reloaded = Swap::new(Arc::new(RecordingChecker::new()), snapshot);
        prop_assert!(reloaded.get_order(id).is_none());
        let pair = reloaded.pair(CoinId(1), CoinId(2)).unwrap();
        prop_assert!(pair.order_sell_by_index(0).is_none());
    }

    /// The two orientations of a pool expose the same supply and
    /// transposed reserves.
    #[test]
    fn prop_reversed_views_transpose(
        reserve0 in 10_000u64..1_000_000_000,
        reserve1 in 10_000u64..1_000_000_000,
    ) {
        let swap = fresh_swap();
        swap.pair_mint(
            provider(0x11),
            CoinId(1),
            CoinId(2),
            U256::from(reserve0),
            U256::from(reserve1),
        );

        let (supply, r0, r1) = swap.swap_pool(CoinId(1), CoinId(2)).unwrap();
        let (supply_rev, r0_rev, r1_rev) = swap.swap_pool(CoinId(2), CoinId(1)).unwrap();
        prop_assert_eq!(supply, supply_rev);
        prop_assert_eq!((r0, r1), (r1_rev, r0_rev));
    }

    /// Two nodes replaying the same transactions from the same genesis end
    /// at byte-identical roots.
    #[test]
    fn prop_replays_produce_identical_roots(
        initial in 10_000u64..1_000_000,
        asks in vec((500u64..5_000, 2u64..5), 0..5),
        sells in vec(500u64..4_000, 0..5),
    ) {
        let run = || {
            let swap = fresh_swap();
            swap.pair_mint(
                provider(0x11),
                CoinId(1),
                CoinId(2),
                U256::from(initial),
                U256::from(initial),
            );
            for (want_buy, premium) in &asks {
                swap.pair_add_order(
                    CoinId(1),
                    CoinId(2),
                    U256::from(*want_buy),
                    U256::from(want_buy * premium),
                    provider(0x22),
                    1,
                );
            }
            commit_cycle(&swap);
            for amount in &sells {
                let quote = {
                    let pair = swap.pair(CoinId(1), CoinId(2)).unwrap();
                    pair.calculate_buy_for_sell_with_orders(U256::from(*amount))
                };
                if quote.is_zero() {
                    continue;
                }
                swap.pair_sell_with_orders(CoinId(1), CoinId(2), U256::from(*amount), U256::ZERO);
            }
            commit_cycle(&swap).root_hash()
        };
        prop_assert_eq!(run(), run());
    }
}
