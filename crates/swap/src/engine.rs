//! Swap execution against the curve and the order book together.
//!
//! A taker's amount walks the sell side of the book interleaved with curve
//! moves: whenever the pool prices better than the best maker the curve
//! absorbs input until the two prices meet, then the maker is consumed (in
//! full or in part) and the walk continues. Maker and taker each leave a
//! 0.1% cut of their received side in the pool, on top of the 0.3% curve
//! fee baked into the K test.

use std::collections::BTreeMap;
use std::sync::Arc;

use reef_primitives::{Address, I256, U256};
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::{
    book::Book,
    error::SwapError,
    math,
    order::Order,
    pair::{self, PairView},
};

/// Order commission in parts per thousand, split evenly between the maker
/// and taker sides.
const ORDER_COMMISSION: u64 = 2;

/// The cut deducted from a received amount: `⌈x / 1001⌉`.
pub(crate) fn commission_999(amount: U256) -> U256 {
    let divisor = U256::from(1000 + ORDER_COMMISSION / 2);
    let quotient = amount / divisor;
    if (amount % divisor).is_zero() {
        quotient
    } else {
        quotient + U256::from(1)
    }
}

/// The gross-up applied before deduction on the buy walk: `⌈x · 1 / 1000⌉`.
pub(crate) fn commission_001(amount: U256) -> U256 {
    let product = amount * U256::from(ORDER_COMMISSION / 2);
    let divisor = U256::from(1000u64);
    let quotient = product / divisor;
    if (product % divisor).is_zero() {
        quotient
    } else {
        quotient + U256::from(1)
    }
}

/// Local curve evolution used while walking the book. All the pricing here
/// is a pure function of the two reserves, so the walk never has to touch
/// the shared pair until apply.
#[derive(Debug, Clone, Copy)]
struct Curve {
    r0: U256,
    r1: U256,
}

impl Curve {
    fn of(view: &PairView) -> Self {
        let (r0, r1) = view.reserves();
        Self { r0, r1 }
    }

    /// Whether the pool currently prices the output coin better than the
    /// maker does, i.e. `order price < pool price` exactly:
    /// `want_sell·r0 < want_buy·r1`.
    fn prices_above(&self, order: &Order) -> bool {
        math::widen(order.want_sell) * math::widen(self.r0)
            < math::widen(order.want_buy) * math::widen(self.r1)
    }

    fn step(&mut self, amount0_in: I256, amount1_out: I256) {
        self.r0 = pair::apply_delta(self.r0, amount0_in);
        self.r1 = pair::apply_delta(self.r1, -amount1_out);
    }

    /// Apply-path invariant check; a failure after a passed `check_*` is a
    /// consensus bug.
    fn assert_swap(&self, amount0_in: U256, amount1_out: U256) {
        if let Err(err) = pair::check_swap_amounts(
            self.r0,
            self.r1,
            amount0_in,
            U256::ZERO,
            U256::ZERO,
            amount1_out,
        ) {
            panic!("{err}");
        }
    }

    fn buy_for_sell(&self, amount0_in: U256) -> Option<U256> {
        pair::buy_for_sell(self.r0, self.r1, amount0_in)
    }

    fn sell_for_buy(&self, amount1_out: U256) -> Option<U256> {
        pair::sell_for_buy(self.r0, self.r1, amount1_out)
    }

    /// The curve move `(Δr0, Δr1)` that brings the pool price down to the
    /// order's price, solving
    /// `(r0 + (1 − f/2000)·a0)(r1 − a1) = r0·r1` against the target price.
    ///
    /// The only floating-point computation in consensus: fixed operation
    /// order over exactly-rounded f64 ops, truncated, then re-validated by
    /// the exact integer swap check downstream.
    fn amounts_for_price(&self, order: &Order) -> Option<(U256, U256)> {
        if !self.prices_above(order) {
            trace!(order = order.id, "pool already at or past order price");
            return None;
        }
        let r0 = math::u256_to_f64(self.r0);
        let r1 = math::u256_to_f64(self.r1);
        let price = math::u256_to_f64(order.want_sell) / math::u256_to_f64(order.want_buy);
        let fee = pair::POOL_FEE as f64;

        let k = r0 * r1;
        let b = ((2000.0 - fee) / 2.0) * r0;
        let r0_squared = r0 * r0;
        let shortfall = r0_squared - k * (1.0 / price);
        let discriminant = ((2000.0 - fee) * (2000.0 - fee) / 4.0) * r0_squared
            - (2000.0 * (1000.0 - fee) / 2.0) * shortfall;
        if discriminant < 0.0 {
            return None;
        }
        let root = (-b + discriminant.sqrt()) / (1000.0 - fee);

        let amount0 = math::f64_to_u256(root)?;
        if amount0.is_zero() {
            return None;
        }
        let amount1 = self.buy_for_sell(amount0)?;
        Some((amount0, amount1))
    }
}

/// A fill snapshot: the slice of `limit` this execution consumes.
fn fill_snapshot(limit: &Order, amount0: U256, amount1: U256) -> Order {
    let mut snapshot = limit.clone();
    snapshot.want_buy = amount0;
    snapshot.want_sell = amount1;
    snapshot
}

/// Sell walk: how much `amount0_in` buys across the book and the curve,
/// plus the fill snapshots to apply.
pub(crate) fn calculate_buy_for_sell_with_orders(
    view: &PairView,
    book: &mut Book,
    amount0_in: U256,
) -> (U256, Vec<Order>) {
    let source = view.pair.source.clone();
    let pair_key = view.pair.key;
    let reversed = view.reversed;

    let mut amount_in = amount0_in;
    let mut amount_out = U256::ZERO;
    let mut curve = Curve::of(view);
    let mut orders: Vec<Order> = Vec::new();

    for index in 0.. {
        if amount_in.is_zero() {
            return (amount_out, orders);
        }
        let Some(limit) = book.order_sell_by_index(source.as_ref(), pair_key, reversed, index)
        else {
            break;
        };

        if curve.prices_above(&limit) {
            if let Some((reserve0_diff, reserve1_diff)) = curve.amounts_for_price(&limit) {
                if amount_in <= reserve0_diff {
                    // the curve alone absorbs the rest
                    break;
                }
                amount_in -= reserve0_diff;
                amount_out += reserve1_diff;
                curve.assert_swap(reserve0_diff, reserve1_diff);
                curve.step(
                    math::to_signed(reserve0_diff),
                    math::to_signed(reserve1_diff),
                );
            }
        }

        if amount_in <= limit.want_buy {
            // partial fill at the maker's price, clamped to the offer
            let amount0 = amount_in;
            let amount1 = core::cmp::min(
                math::narrow(
                    math::widen(amount0) * math::widen(limit.want_sell)
                        / math::widen(limit.want_buy),
                ),
                limit.want_sell,
            );
            orders.push(fill_snapshot(&limit, amount0, amount1));
            amount_out += amount1 - commission_999(amount1);
            return (amount_out, orders);
        }

        orders.push(fill_snapshot(&limit, limit.want_buy, limit.want_sell));
        let maker_cut = commission_999(limit.want_buy);
        let taker_cut = commission_999(limit.want_sell);
        // both cuts accrue to the pool, re-raising K
        curve.step(math::to_signed(maker_cut), -math::to_signed(taker_cut));
        amount_out += limit.want_sell - taker_cut;
        amount_in -= limit.want_buy;
    }

    if let Some(tail) = curve.buy_for_sell(amount_in) {
        curve.assert_swap(amount_in, tail);
        amount_out += tail;
    }
    (amount_out, orders)
}

/// Buy walk: how much input it takes to receive `amount1_out` across the
/// book and the curve, plus the fill snapshots to apply.
pub(crate) fn calculate_sell_for_buy_with_orders(
    view: &PairView,
    book: &mut Book,
    amount1_out: U256,
) -> (U256, Vec<Order>) {
    let source = view.pair.source.clone();
    let pair_key = view.pair.key;
    let reversed = view.reversed;

    let mut amount_in = U256::ZERO;
    let mut amount_out = amount1_out;
    let mut curve = Curve::of(view);
    let mut orders: Vec<Order> = Vec::new();

    for index in 0.. {
        if amount_out.is_zero() {
            return (amount_in, orders);
        }
        let Some(limit) = book.order_sell_by_index(source.as_ref(), pair_key, reversed, index)
        else {
            break;
        };

        if curve.prices_above(&limit) {
            if let Some((reserve0_diff, reserve1_diff)) = curve.amounts_for_price(&limit) {
                if amount_out <= reserve1_diff {
                    break;
                }
                amount_out -= reserve1_diff;
                amount_in += reserve0_diff;
                curve.assert_swap(reserve0_diff, reserve1_diff);
                curve.step(
                    math::to_signed(reserve0_diff),
                    math::to_signed(reserve1_diff),
                );
            }
        }

        let taker_cut = commission_999(limit.want_sell);
        let net_offer = limit.want_sell - taker_cut;
        if amount_out <= net_offer {
            // gross the target up by the pool's cut, then price it
            let mut amount1 = amount_out + commission_001(amount_out);
            let mut amount0 = math::narrow(
                math::widen(amount1) * math::widen(limit.want_buy) / math::widen(limit.want_sell),
            );
            if amount1 != limit.want_sell && amount0 == limit.want_buy {
                // rounding reached the full maker volume
                amount0 = limit.want_buy;
                amount1 = limit.want_sell;
            }
            orders.push(fill_snapshot(&limit, amount0, amount1));
            amount_in += amount0;
            return (amount_in, orders);
        }

        orders.push(fill_snapshot(&limit, limit.want_buy, limit.want_sell));
        let maker_cut = commission_999(limit.want_buy);
        curve.step(math::to_signed(maker_cut), -math::to_signed(taker_cut));
        amount_out -= net_offer;
        amount_in += limit.want_buy;
    }

    if let Some(tail) = curve.sell_for_buy(amount_out) {
        curve.assert_swap(tail, amount_out);
        amount_in += tail;
    }
    (amount_in, orders)
}

/// Net effect of a list of fill snapshots on the pool.
#[derive(Debug, Clone)]
pub(crate) struct PoolDiff {
    /// Maker-side commission, accrues to reserve0.
    pub commission0: U256,
    /// Taker-side commission, accrues to reserve1.
    pub commission1: U256,
    /// Curve residual on the input side.
    pub amount0: U256,
    /// Curve residual on the output side.
    pub amount1: U256,
    /// Per-maker payouts in coin0, net of the maker cut.
    pub owners: BTreeMap<Address, U256>,
}

/// Splits an execution into the curve residual, the two commission deltas
/// and the maker payout map.
pub(crate) fn calc_diff_pool(amount0_in: U256, amount1_out: U256, orders: &[Order]) -> PoolDiff {
    let mut amount0_orders = U256::ZERO;
    let mut amount1_orders = U256::ZERO;
    let mut commission0 = U256::ZERO;
    let mut commission1 = U256::ZERO;
    let mut owners: BTreeMap<Address, U256> = BTreeMap::new();

    for order in orders {
        amount0_orders += order.want_buy;
        amount1_orders += order.want_sell;

        let maker_cut = commission_999(order.want_buy);
        let taker_cut = commission_999(order.want_sell);
        commission0 += maker_cut;
        commission1 += taker_cut;

        *owners.entry(order.owner).or_default() += order.want_buy - maker_cut;
    }
    amount1_orders -= commission1;

    PoolDiff {
        commission0,
        commission1,
        amount0: amount0_in - amount0_orders,
        amount1: amount1_out - amount1_orders,
        owners,
    }
}

fn as_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Full account of one order-crossing execution, for transaction results.
#[derive(Debug, Clone, Serialize)]
pub struct FillDetails {
    /// Curve residual on the input side.
    #[serde(serialize_with = "as_decimal")]
    pub amount_in: U256,
    /// Curve residual on the output side.
    #[serde(serialize_with = "as_decimal")]
    pub amount_out: U256,
    #[serde(serialize_with = "as_decimal")]
    pub commission_amount_in: U256,
    #[serde(serialize_with = "as_decimal")]
    pub commission_amount_out: U256,
    /// The consumed fill snapshots.
    pub orders: Vec<Order>,
}

/// One maker's payout from an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPayout {
    #[serde(rename = "seller")]
    pub owner: Address,
    #[serde(serialize_with = "as_decimal")]
    pub value: U256,
}

fn payouts(owners: BTreeMap<Address, U256>) -> Vec<OrderPayout> {
    owners
        .into_iter()
        .map(|(owner, value)| OrderPayout { owner, value })
        .collect()
}

impl PairView {
    /// Sells `amount0_in` against the book and the curve atomically.
    ///
    /// Returns the taker's output, the maker payouts (address-ascending)
    /// and the full fill account. Apply path: panics on invariant breach.
    pub fn sell_with_orders(&self, amount0_in: U256) -> (U256, Vec<OrderPayout>, FillDetails) {
        if amount0_in.is_zero() {
            panic!("{}", SwapError::InsufficientInputAmount);
        }
        let mut book = self.pair.book.write();
        let (amount1_out, orders) = calculate_buy_for_sell_with_orders(self, &mut book, amount0_in);
        if amount1_out.is_zero() {
            panic!("{}", SwapError::InsufficientOutputAmount);
        }

        let diff = calc_diff_pool(amount0_in, amount1_out, &orders);
        self.apply_diff(&mut book, &diff, &orders);
        drop(book);

        let details = FillDetails {
            amount_in: diff.amount0,
            amount_out: diff.amount1,
            commission_amount_in: diff.commission0,
            commission_amount_out: diff.commission1,
            orders,
        };
        (amount1_out, payouts(diff.owners), details)
    }

    /// Buys exactly `amount1_out` against the book and the curve atomically.
    ///
    /// Returns the taker's required input, the maker payouts and the fill
    /// account.
    pub fn buy_with_orders(&self, amount1_out: U256) -> (U256, Vec<OrderPayout>, FillDetails) {
        if amount1_out.is_zero() {
            panic!("{}", SwapError::InsufficientInputAmount);
        }
        let mut book = self.pair.book.write();
        let (amount0_in, orders) = calculate_sell_for_buy_with_orders(self, &mut book, amount1_out);
        if amount0_in.is_zero() {
            panic!("{}", SwapError::InsufficientOutputAmount);
        }

        let diff = calc_diff_pool(amount0_in, amount1_out, &orders);
        self.apply_diff(&mut book, &diff, &orders);
        drop(book);

        let details = FillDetails {
            amount_in: diff.amount0,
            amount_out: diff.amount1,
            commission_amount_in: diff.commission0,
            commission_amount_out: diff.commission1,
            orders,
        };
        (amount0_in, payouts(diff.owners), details)
    }

    /// Applies an execution: curve residual, pool commission gain, order
    /// decrements, then a head refresh of the sorted list.
    fn apply_diff(&self, book: &mut Book, diff: &PoolDiff, orders: &[Order]) {
        if !diff.amount0.is_zero() || !diff.amount1.is_zero() {
            self.update_signed(math::to_signed(diff.amount0), -math::to_signed(diff.amount1));
        }
        self.update_signed(
            math::to_signed(diff.commission0),
            math::to_signed(diff.commission1),
        );

        let source = self.pair.source.clone();
        for order in orders {
            book.update_sell_order(
                source.as_ref(),
                self.reversed,
                order.id,
                order.want_buy,
                order.want_sell,
            );
        }
        book.order_sell_by_index(source.as_ref(), self.pair.key, self.reversed, 0);
    }

    /// Quote form of [`Self::sell_with_orders`]: no mutation of pool state.
    pub fn calculate_buy_for_sell_with_orders(&self, amount0_in: U256) -> U256 {
        let mut book = self.pair.book.write();
        calculate_buy_for_sell_with_orders(self, &mut book, amount0_in).0
    }

    /// Quote form of [`Self::buy_with_orders`].
    pub fn calculate_sell_for_buy_with_orders(&self, amount1_out: U256) -> U256 {
        let mut book = self.pair.book.write();
        calculate_sell_for_buy_with_orders(self, &mut book, amount1_out).0
    }

    /// The `index`-th order of this view's sell book.
    pub fn order_sell_by_index(&self, index: usize) -> Option<Order> {
        let source = self.pair.source.clone();
        let mut book = self.pair.book.write();
        book.order_sell_by_index(source.as_ref(), self.pair.key, self.reversed, index)
    }

    /// The first `limit` orders of this view's sell book.
    pub fn orders_sell(&self, limit: u32) -> Vec<Order> {
        let mut result = Vec::new();
        for index in 0..limit as usize {
            match self.order_sell_by_index(index) {
                Some(order) => result.push(order),
                None => break,
            }
        }
        result
    }

    /// The deepest order of this view's sell book and its index.
    pub fn order_sell_last(&self) -> Option<(Order, usize)> {
        let mut last = None;
        for index in 0.. {
            match self.order_sell_by_index(index) {
                Some(order) => last = Some((order, index)),
                None => break,
            }
        }
        last
    }

    /// An order by id, oriented to this view. Does not filter consumed
    /// orders; see [`Self::is_order_used`].
    pub fn order(&self, id: u32) -> Option<Order> {
        let source = self.pair.source.clone();
        let mut book = self.pair.book.write();
        book.oriented_order(source.as_ref(), self.reversed, id)
    }

    pub fn orders(&self, ids: &[u32]) -> Vec<Option<Order>> {
        let source = self.pair.source.clone();
        let mut book = self.pair.book.write();
        ids.iter()
            .map(|&id| book.oriented_order(source.as_ref(), self.reversed, id))
            .collect()
    }

    /// Whether `id` was consumed or cancelled (in this block or earlier).
    pub fn is_order_used(&self, id: u32) -> bool {
        {
            let book = self.pair.book.read();
            if book.is_deleted(id) {
                return true;
            }
        }
        self.order(id).is_none()
    }

    /// Detached what-if evolution through a full order-crossing execution,
    /// for multi-hop estimation. Negative amounts flip the direction.
    pub fn add_last_swap_step_with_orders(
        &self,
        amount0_in: I256,
        amount1_out: I256,
        buy: bool,
    ) -> PairView {
        if amount0_in.is_negative() || amount1_out.is_negative() {
            return self
                .reversed_view()
                .add_last_swap_step_with_orders(-amount1_out, -amount0_in, !buy)
                .reversed_view();
        }
        let amount0 = amount0_in.unsigned_abs();
        let amount1 = amount1_out.unsigned_abs();

        let detached = PairView::new(Arc::new(self.pair.detached_clone()), self.reversed);
        let mut book = detached.pair.book.write();

        let orders = if buy {
            let (calculated, orders) =
                calculate_sell_for_buy_with_orders(&detached, &mut book, amount1);
            if calculated != amount0 {
                trace!(%calculated, expected = %amount0, "buy-side estimation drift");
            }
            orders
        } else {
            let (calculated, orders) =
                calculate_buy_for_sell_with_orders(&detached, &mut book, amount0);
            if calculated != amount1 {
                trace!(%calculated, expected = %amount1, "sell-side estimation drift");
            }
            orders
        };

        let diff = calc_diff_pool(amount0, amount1, &orders);
        detached.apply_diff(&mut book, &diff, &orders);
        drop(book);
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_primitives::CoinId;

    use crate::key::{PairKey, Side, SortPrice};
    use crate::pair::Pair;
    use crate::source::{OrderPage, StateSource};

    #[derive(Debug)]
    struct EmptySource;

    impl StateSource for EmptySource {
        fn load_balance(&self, _pair: PairKey, _owner: Address) -> Option<U256> {
            None
        }
        fn load_order(&self, _id: u32) -> Option<Order> {
            None
        }
        fn load_order_page(
            &self,
            _pair: PairKey,
            _side: Side,
            _from: Option<(SortPrice, u32)>,
            _limit: usize,
        ) -> OrderPage {
            OrderPage {
                ids: Vec::new(),
                exhausted: true,
            }
        }
    }

    fn maker() -> Address {
        Address::repeat_byte(0x22)
    }

    fn funded_view(reserve0: u64, reserve1: u64) -> PairView {
        let key = PairKey::new(CoinId(1), CoinId(2));
        let view = PairView::new(Arc::new(Pair::new(key, 1, Arc::new(EmptySource))), false);
        view.mint(
            Address::repeat_byte(0x11),
            U256::from(reserve0),
            U256::from(reserve1),
        );
        view
    }

    fn place_order(view: &PairView, id: u32, want_buy: u64, want_sell: u64) {
        let order = Order {
            id,
            pair: view.key(),
            is_buy: false,
            want_buy: U256::from(want_buy),
            want_sell: U256::from(want_sell),
            owner: maker(),
            height: 1,
            old_sort_price: SortPrice::ZERO,
        };
        let sorted = order.sorted();
        let mut book = view.pair.book.write();
        book.mark_dirty(&sorted);
        book.insert_order(sorted);
    }

    #[test]
    fn test_commission_999_rounds_up() {
        assert_eq!(commission_999(U256::ZERO), U256::ZERO);
        assert_eq!(commission_999(U256::from(1)), U256::from(1));
        assert_eq!(commission_999(U256::from(1001)), U256::from(1));
        assert_eq!(commission_999(U256::from(1002)), U256::from(2));
        assert_eq!(commission_999(U256::from(1500)), U256::from(2));
        assert_eq!(commission_999(U256::from(500)), U256::from(1));
    }

    #[test]
    fn test_commission_001_rounds_up() {
        assert_eq!(commission_001(U256::ZERO), U256::ZERO);
        assert_eq!(commission_001(U256::from(999)), U256::from(1));
        assert_eq!(commission_001(U256::from(1000)), U256::from(1));
        assert_eq!(commission_001(U256::from(1001)), U256::from(2));
        assert_eq!(commission_001(U256::from(1800)), U256::from(2));
    }

    #[test]
    fn test_sell_consumes_single_maker_in_full() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 500, 1_500);

        let (amount_out, payouts, details) = view.sell_with_orders(U256::from(500));

        // taker: 1500 less the 0.1% cut; maker: 500 less the 0.1% cut
        assert_eq!(amount_out, U256::from(1_498));
        assert_eq!(
            payouts,
            vec![OrderPayout {
                owner: maker(),
                value: U256::from(499),
            }]
        );

        // the two cuts accrued to the reserves
        assert_eq!(view.reserves(), (U256::from(10_001), U256::from(10_002)));
        assert_eq!(details.commission_amount_in, U256::from(1));
        assert_eq!(details.commission_amount_out, U256::from(2));
        assert_eq!(details.amount_in, U256::ZERO);
        assert_eq!(details.amount_out, U256::ZERO);

        // the order is gone from the walk
        assert!(view.order_sell_by_index(0).is_none());
        assert!(view.is_order_used(1));
    }

    #[test]
    fn test_sell_partial_fill_leaves_remainder() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 1_000, 3_000);

        let (amount_out, payouts, _details) = view.sell_with_orders(U256::from(600));

        assert_eq!(amount_out, U256::from(1_798));
        assert_eq!(payouts[0].value, U256::from(599));

        let rest = view.order(1).unwrap();
        assert_eq!(rest.want_buy, U256::from(400));
        assert_eq!(rest.want_sell, U256::from(1_200));
        // still at the head of the book
        assert_eq!(view.order_sell_by_index(0).unwrap().id, 1);
    }

    #[test]
    fn test_sell_crosses_curve_then_order() {
        let view = funded_view(10_000, 10_000);
        // order prices below the pool: the curve must move first
        place_order(&view, 1, 1_000, 500);

        let curve_only = funded_view(10_000, 10_000);
        let (plain, _, _) = curve_only.sell_with_orders(U256::from(6_000));

        let (amount_out, payouts, details) = view.sell_with_orders(U256::from(6_000));

        // the maker at 0.5 prices better than the deep curve tail
        assert!(amount_out > plain, "{amount_out} <= {plain}");
        assert_eq!(details.orders.len(), 1);
        assert_eq!(payouts[0].value, U256::from(999));
        assert!(view.is_order_used(1));

        // curve residual flowed through the reserves both ways
        let (r0, r1) = view.reserves();
        assert!(r0 > U256::from(10_000));
        assert!(r1 < U256::from(10_000));
    }

    #[test]
    fn test_sell_stops_on_curve_when_input_runs_out() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 1_000, 500);

        // small input never reaches the maker's price
        let (amount_out, payouts, details) = view.sell_with_orders(U256::from(1_000));
        assert_eq!(amount_out, U256::from(906));
        assert!(payouts.is_empty());
        assert!(details.orders.is_empty());
        let rest = view.order(1).unwrap();
        assert_eq!(rest.want_buy, U256::from(1_000));
    }

    #[test]
    fn test_buy_with_orders_hits_maker_first() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 500, 1_500);

        // want exactly the maker's net offer
        let (amount_in, payouts, details) = view.buy_with_orders(U256::from(1_498));

        assert_eq!(amount_in, U256::from(500));
        assert_eq!(payouts[0].value, U256::from(499));
        assert_eq!(details.orders.len(), 1);
        assert!(view.is_order_used(1));
        assert_eq!(view.reserves(), (U256::from(10_001), U256::from(10_002)));
    }

    #[test]
    fn test_buy_partial_fill() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 1_000, 3_000);

        let (amount_in, _payouts, _details) = view.buy_with_orders(U256::from(1_798));
        assert_eq!(amount_in, U256::from(600));

        let rest = view.order(1).unwrap();
        assert_eq!(rest.want_buy, U256::from(400));
        assert_eq!(rest.want_sell, U256::from(1_200));
    }

    #[test]
    fn test_sell_and_buy_round_trip_consistency() {
        let quote_view = funded_view(10_000, 10_000);
        place_order(&quote_view, 1, 500, 1_500);
        place_order(&quote_view, 2, 2_000, 4_000);

        let out = quote_view.calculate_buy_for_sell_with_orders(U256::from(2_000));
        let back = quote_view.calculate_sell_for_buy_with_orders(out);
        // buying what a sell produced never costs less than the sell input
        // minus rounding slack
        assert!(back <= U256::from(2_001), "{back}");
    }

    #[test]
    fn test_calc_diff_pool_splits_commissions() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 500, 1_500);
        let snapshot = view.order(1).unwrap();

        let diff = calc_diff_pool(U256::from(700), U256::from(1_698), &[snapshot]);
        assert_eq!(diff.commission0, U256::from(1));
        assert_eq!(diff.commission1, U256::from(2));
        // 700 input: 500 to the order, 200 residual to the curve
        assert_eq!(diff.amount0, U256::from(200));
        // 1698 output: 1498 from the order net of cut, 200 from the curve
        assert_eq!(diff.amount1, U256::from(200));
        assert_eq!(diff.owners[&maker()], U256::from(499));
    }

    #[test]
    fn test_add_last_swap_step_with_orders_is_pure() {
        let view = funded_view(10_000, 10_000);
        place_order(&view, 1, 500, 1_500);

        let out = view.calculate_buy_for_sell_with_orders(U256::from(500));
        let evolved = view.add_last_swap_step_with_orders(
            I256::try_from(500).unwrap(),
            math::to_signed(out),
            false,
        );

        // the evolution consumed the order and moved the reserves
        assert_eq!(evolved.reserves(), (U256::from(10_001), U256::from(10_002)));
        assert!(evolved.order_sell_by_index(0).is_none());

        // the real pool is untouched
        assert_eq!(view.reserves(), (U256::from(10_000), U256::from(10_000)));
        assert_eq!(view.order_sell_by_index(0).unwrap().id, 1);
    }

    #[test]
    fn test_reversed_execution_matches_canonical_bookkeeping() {
        let view = funded_view(10_000, 10_000);
        let reversed = view.reversed_view();
        // maker posted through the reversed orientation
        {
            let order = Order {
                id: 1,
                pair: reversed.key(),
                is_buy: false,
                want_buy: U256::from(500),
                want_sell: U256::from(1_500),
                owner: maker(),
                height: 1,
                old_sort_price: SortPrice::ZERO,
            };
            let sorted = order.sorted();
            let mut book = reversed.pair.book.write();
            book.mark_dirty(&sorted);
            book.insert_order(sorted);
        }

        let (amount_out, payouts, _details) = reversed.sell_with_orders(U256::from(500));
        assert_eq!(amount_out, U256::from(1_498));
        assert_eq!(payouts[0].value, U256::from(499));

        // commissions accrued in canonical orientation: +2 on canonical
        // reserve0 (the taker's received coin), +1 on canonical reserve1
        assert_eq!(view.reserves(), (U256::from(10_002), U256::from(10_001)));
    }
}
