//! Pair state and constant-product pricing.
//!
//! A [`Pair`] holds the canonical record of one pool: reserves, LP supply,
//! provider balances and the order book. Callers never touch it directly;
//! they work through a [`PairView`], a zero-cost orientation wrapper that
//! swaps the roles of the two sides for reversed requests without
//! duplicating any state.

use std::{collections::BTreeMap, sync::Arc};

use alloy_rlp::{RlpDecodable, RlpEncodable};
use parking_lot::RwLock;
use reef_primitives::{Address, CoinId, I256, U256, U512};

use crate::{
    book::Book,
    error::{Result, SwapError},
    key::PairKey,
    math,
    source::StateSource,
};

/// LP units minted to the zero address on first mint and locked forever.
pub const MINIMUM_LIQUIDITY: u64 = 1000;

/// Curve fee, in parts per thousand of the input amount.
pub(crate) const POOL_FEE: u64 = 3;

/// Reserves, LP supply and identity of a pool, in canonical orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairData {
    pub reserve0: U256,
    pub reserve1: U256,
    pub total_supply: U256,
    pub id: u32,
    pub(crate) dirty: bool,
}

/// Wire form of a pair record.
#[derive(Debug, Clone, RlpEncodable, RlpDecodable)]
pub(crate) struct PairRecord {
    pub reserve0: U256,
    pub reserve1: U256,
    pub total_supply: U256,
    pub id: u32,
}

/// Wire form of a provider balance record.
#[derive(Debug, Clone, RlpEncodable, RlpDecodable)]
pub(crate) struct BalanceRecord {
    pub liquidity: U256,
}

#[derive(Debug, Clone)]
pub(crate) struct BalanceEntry {
    pub liquidity: U256,
    pub dirty: bool,
}

/// Canonical state of one pool.
pub struct Pair {
    pub(crate) key: PairKey,
    pub(crate) data: RwLock<PairData>,
    /// `None` caches a confirmed absence in the tree.
    pub(crate) balances: RwLock<BTreeMap<Address, Option<BalanceEntry>>>,
    pub(crate) book: RwLock<Book>,
    pub(crate) source: Arc<dyn StateSource>,
}

impl core::fmt::Debug for Pair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pair")
            .field("key", &self.key)
            .field("data", &*self.data.read())
            .finish_non_exhaustive()
    }
}

impl Pair {
    pub(crate) fn new(key: PairKey, id: u32, source: Arc<dyn StateSource>) -> Self {
        debug_assert!(key.is_ordered());
        Self {
            key,
            data: RwLock::new(PairData {
                reserve0: U256::ZERO,
                reserve1: U256::ZERO,
                total_supply: U256::ZERO,
                id,
                dirty: false,
            }),
            balances: RwLock::new(BTreeMap::new()),
            book: RwLock::new(Book::default()),
            source,
        }
    }

    pub(crate) fn from_record(
        key: PairKey,
        record: PairRecord,
        source: Arc<dyn StateSource>,
    ) -> Self {
        let pair = Self::new(key, record.id, source);
        {
            let mut data = pair.data.write();
            data.reserve0 = record.reserve0;
            data.reserve1 = record.reserve1;
            data.total_supply = record.total_supply;
        }
        pair
    }

    /// Deep copy for what-if evolution: own reserves, own book, no balances.
    /// The clone shares the state source, so lazy loads keep working, but it
    /// is never registered with the swap and can never be committed.
    pub(crate) fn detached_clone(&self) -> Self {
        Self {
            key: self.key,
            data: RwLock::new(self.data.read().clone()),
            balances: RwLock::new(BTreeMap::new()),
            book: RwLock::new(self.book.read().clone()),
            source: self.source.clone(),
        }
    }
}

/// A pool seen in the orientation the caller asked for.
#[derive(Debug, Clone)]
pub struct PairView {
    pub(crate) pair: Arc<Pair>,
    pub(crate) reversed: bool,
}

impl PairView {
    pub(crate) fn new(pair: Arc<Pair>, reversed: bool) -> Self {
        Self { pair, reversed }
    }

    /// The pair key in this view's orientation.
    pub fn key(&self) -> PairKey {
        if self.reversed {
            self.pair.key.reverted()
        } else {
            self.pair.key
        }
    }

    pub fn coin0(&self) -> CoinId {
        self.key().coin0
    }

    pub fn coin1(&self) -> CoinId {
        self.key().coin1
    }

    pub fn id(&self) -> u32 {
        self.pair.data.read().id
    }

    /// The same pool in the opposite orientation.
    pub fn reversed_view(&self) -> PairView {
        Self {
            pair: self.pair.clone(),
            reversed: !self.reversed,
        }
    }

    fn orient<T>(&self, a: T, b: T) -> (T, T) {
        if self.reversed {
            (b, a)
        } else {
            (a, b)
        }
    }

    /// Atomic read of both reserves, oriented.
    pub fn reserves(&self) -> (U256, U256) {
        let data = self.pair.data.read();
        self.orient(data.reserve0, data.reserve1)
    }

    pub fn total_supply(&self) -> U256 {
        self.pair.data.read().total_supply
    }

    /// Provider liquidity, faulting the record in from the tree on first
    /// access.
    pub fn balance(&self, address: Address) -> Option<U256> {
        {
            let balances = self.pair.balances.read();
            if let Some(slot) = balances.get(&address) {
                return slot.as_ref().map(|entry| entry.liquidity);
            }
        }
        let mut balances = self.pair.balances.write();
        if let Some(slot) = balances.get(&address) {
            return slot.as_ref().map(|entry| entry.liquidity);
        }
        let loaded = self.pair.source.load_balance(self.pair.key, address);
        balances.insert(
            address,
            loaded.map(|liquidity| BalanceEntry {
                liquidity,
                dirty: false,
            }),
        );
        loaded
    }

    /// Applies signed reserve deltas, oriented, and marks the pair dirty.
    pub(crate) fn update_signed(&self, amount0: I256, amount1: I256) {
        let (d0, d1) = self.orient(amount0, amount1);
        let mut data = self.pair.data.write();
        data.dirty = true;
        data.reserve0 = apply_delta(data.reserve0, d0);
        data.reserve1 = apply_delta(data.reserve1, d1);
    }

    fn mint_to(&self, address: Address, value: U256) {
        let held = self.balance(address).unwrap_or_default();
        {
            let mut data = self.pair.data.write();
            data.dirty = true;
            data.total_supply += value;
        }
        self.pair.balances.write().insert(
            address,
            Some(BalanceEntry {
                liquidity: held + value,
                dirty: true,
            }),
        );
    }

    fn burn_from(&self, address: Address, value: U256) {
        let held = self.balance(address).unwrap_or_default();
        {
            let mut data = self.pair.data.write();
            data.dirty = true;
            data.total_supply -= value;
        }
        self.pair.balances.write().insert(
            address,
            Some(BalanceEntry {
                liquidity: held - value,
                dirty: true,
            }),
        );
    }

    /// Liquidity quote for adding `amount0` against the current reserves.
    pub fn new_liquidity(&self, amount0: U256) -> (U256, U256, U256) {
        let total = self.total_supply();
        let (r0, r1) = self.reserves();
        let liquidity = math::narrow(math::widen(total) * math::widen(amount0) / math::widen(r0));
        let amount1 = math::narrow(math::widen(liquidity) * math::widen(r1) / math::widen(total));
        (liquidity, amount0, amount1)
    }

    /// Pro-rata share of the reserves for `liquidity` LP units.
    pub fn amounts_of_liquidity(&self, liquidity: U256) -> (U256, U256) {
        let data = self.pair.data.read();
        let (r0, r1) = self.orient(data.reserve0, data.reserve1);
        let amount0 =
            math::narrow(math::widen(liquidity) * math::widen(r0) / math::widen(data.total_supply));
        let amount1 =
            math::narrow(math::widen(liquidity) * math::widen(r1) / math::widen(data.total_supply));
        (amount0, amount1)
    }

    /// Mints liquidity for a deposit of exactly (`amount0`, `amount1`).
    ///
    /// Apply path: preconditions were validated by [`Self::check_mint`], so
    /// violations halt the node.
    pub fn mint(&self, address: Address, amount0: U256, amount1: U256) -> U256 {
        let total = self.total_supply();
        let (liquidity, used0, used1) = if total.is_zero() {
            let supply = math::sqrt_u512(math::widen(amount0) * math::widen(amount1));
            let lock = U256::from(MINIMUM_LIQUIDITY);
            if supply <= lock {
                panic!("{}", SwapError::InsufficientLiquidityMinted);
            }
            self.mint_to(Address::ZERO, lock);
            (supply - lock, amount0, amount1)
        } else {
            self.new_liquidity(amount0)
        };

        if liquidity.is_zero() {
            panic!("{}", SwapError::InsufficientLiquidityMinted);
        }

        self.mint_to(address, liquidity);
        self.update_signed(math::to_signed(used0), math::to_signed(used1));
        liquidity
    }

    /// Pure form of [`Self::mint`]: same outcome, no mutation, typed errors.
    pub fn check_mint(&self, amount0: U256, max_amount1: U256) -> Result<()> {
        let total = self.total_supply();
        let liquidity = if total.is_zero() {
            math::sqrt_u512(math::widen(amount0) * math::widen(max_amount1))
                .saturating_sub(U256::from(MINIMUM_LIQUIDITY))
        } else {
            let (liquidity, _, amount1) = self.new_liquidity(amount0);
            if amount1 > max_amount1 {
                return Err(SwapError::InsufficientInputAmount);
            }
            liquidity
        };
        if liquidity.is_zero() {
            return Err(SwapError::InsufficientLiquidityMinted);
        }
        Ok(())
    }

    /// Burns `liquidity` LP units of `address` and releases the pro-rata
    /// reserves. Both returned amounts must strictly exceed the minima.
    pub fn burn(
        &self,
        address: Address,
        liquidity: U256,
        min_amount0: U256,
        min_amount1: U256,
    ) -> (U256, U256) {
        match self.balance(address) {
            Some(balance) if liquidity <= balance => {}
            _ => panic!("{}", SwapError::InsufficientLiquidityBalance),
        }

        let (amount0, amount1) = self.amounts_of_liquidity(liquidity);
        if amount0 <= min_amount0 || amount1 <= min_amount1 {
            panic!("{}", SwapError::InsufficientLiquidityBurned);
        }

        self.burn_from(address, liquidity);
        self.update_signed(-math::to_signed(amount0), -math::to_signed(amount1));
        (amount0, amount1)
    }

    /// Pure form of [`Self::burn`].
    pub fn check_burn(
        &self,
        address: Address,
        liquidity: U256,
        min_amount0: U256,
        min_amount1: U256,
    ) -> Result<()> {
        match self.balance(address) {
            Some(balance) if liquidity <= balance => {}
            _ => return Err(SwapError::InsufficientLiquidityBalance),
        }
        let (amount0, amount1) = self.amounts_of_liquidity(liquidity);
        if amount0 <= min_amount0 || amount1 <= min_amount1 {
            return Err(SwapError::InsufficientLiquidityBurned);
        }
        Ok(())
    }

    /// Executes a curve swap with the 0.3% fee baked into the K test and
    /// returns the signed reserve deltas. Apply path: panics on violation.
    pub fn swap(
        &self,
        amount0_in: U256,
        amount1_in: U256,
        amount0_out: U256,
        amount1_out: U256,
    ) -> (I256, I256) {
        if amount0_out.is_zero() && amount1_out.is_zero() {
            panic!("{}", SwapError::InsufficientOutputAmount);
        }

        let (r0, r1) = self.reserves();
        if amount0_out > r0 || amount1_out > r1 {
            panic!("{}", SwapError::InsufficientLiquidity);
        }

        let amount0 = math::to_signed(amount0_in) - math::to_signed(amount0_out);
        let amount1 = math::to_signed(amount1_in) - math::to_signed(amount1_out);
        if !amount0.is_positive() && !amount1.is_positive() {
            panic!("{}", SwapError::InsufficientInputAmount);
        }

        if !k_holds(r0, r1, amount0_in, amount1_in, amount0_out, amount1_out) {
            panic!("{}", SwapError::K);
        }

        self.update_signed(amount0, amount1);
        (amount0, amount1)
    }

    /// Pure form of [`Self::swap`].
    pub fn check_swap(
        &self,
        amount0_in: U256,
        amount1_in: U256,
        amount0_out: U256,
        amount1_out: U256,
    ) -> Result<()> {
        let (r0, r1) = self.reserves();
        check_swap_amounts(r0, r1, amount0_in, amount1_in, amount0_out, amount1_out)
    }

    /// Curve output for selling `amount0_in`, or `None` when the input
    /// exceeds the reserve.
    pub fn calculate_buy_for_sell(&self, amount0_in: U256) -> Option<U256> {
        let (r0, r1) = self.reserves();
        buy_for_sell(r0, r1, amount0_in)
    }

    /// Curve input required to buy `amount1_out`, rounded up in the pool's
    /// favour, or `None` when the output is not covered by the reserve.
    pub fn calculate_sell_for_buy(&self, amount1_out: U256) -> Option<U256> {
        let (r0, r1) = self.reserves();
        sell_for_buy(r0, r1, amount1_out)
    }

    /// Detached what-if evolution of the curve by one executed swap step.
    pub fn add_last_swap_step(&self, amount0_in: I256, amount1_out: I256) -> PairView {
        let clone = PairView::new(Arc::new(self.pair.detached_clone()), self.reversed);
        clone.update_signed(amount0_in, -amount1_out);
        clone
    }
}

pub(crate) fn apply_delta(reserve: U256, delta: I256) -> U256 {
    if delta.is_negative() {
        reserve
            .checked_sub(delta.unsigned_abs())
            .expect("reserve underflow")
    } else {
        reserve + delta.unsigned_abs()
    }
}

/// The fee-adjusted constant-product test:
/// `(1000·(r0+a0) − 3·a0_in) · (1000·(r1+a1) − 3·a1_in) ≥ 10^6 · r0·r1`.
pub(crate) fn k_holds(
    r0: U256,
    r1: U256,
    amount0_in: U256,
    amount1_in: U256,
    amount0_out: U256,
    amount1_out: U256,
) -> bool {
    let adj0 = adjusted_balance(r0, amount0_in, amount0_out);
    let adj1 = adjusted_balance(r1, amount1_in, amount1_out);
    let left = adj0.saturating_mul(adj1);
    let right = (math::widen(r0).saturating_mul(math::widen(r1)))
        .saturating_mul(U512::from(1_000_000u64));
    left >= right
}

fn adjusted_balance(reserve: U256, amount_in: U256, amount_out: U256) -> U512 {
    // the caller has already bounded amount_out by the reserve
    let new_reserve = math::widen(reserve) + math::widen(amount_in) - math::widen(amount_out);
    new_reserve * U512::from(1000u64) - math::widen(amount_in) * U512::from(POOL_FEE)
}

/// Swap validation shared by the view and the engine's evolving curve.
pub(crate) fn check_swap_amounts(
    r0: U256,
    r1: U256,
    amount0_in: U256,
    amount1_in: U256,
    amount0_out: U256,
    amount1_out: U256,
) -> Result<()> {
    if amount0_out > r0 || amount1_out > r1 {
        return Err(SwapError::InsufficientLiquidity);
    }
    if amount0_out.is_zero() && amount1_out.is_zero() {
        return Err(SwapError::InsufficientOutputAmount);
    }

    let amount0 = math::to_signed(amount0_in) - math::to_signed(amount0_out);
    let amount1 = math::to_signed(amount1_in) - math::to_signed(amount1_out);
    if !amount0.is_positive() && !amount1.is_positive() {
        return Err(SwapError::InsufficientInputAmount);
    }

    if !k_holds(r0, r1, amount0_in, amount1_in, amount0_out, amount1_out) {
        return Err(SwapError::K);
    }
    Ok(())
}

/// Output of selling `amount0_in` into the curve:
/// `r1 − ⌊10^6·r0·r1 / (((r0+a) ·1000 − 3a) · 1000)⌋ − 1`, floored at zero.
pub(crate) fn buy_for_sell(r0: U256, r1: U256, amount0_in: U256) -> Option<U256> {
    if amount0_in > r0 {
        return None;
    }
    let k_adjusted = math::widen(r0) * math::widen(r1) * U512::from(1_000_000u64);
    let balance0_adjusted = (math::widen(amount0_in) + math::widen(r0)) * U512::from(1000u64)
        - math::widen(amount0_in) * U512::from(POOL_FEE);
    let gross = k_adjusted / (balance0_adjusted * U512::from(1000u64)) + U512::from(1u64);
    Some(math::narrow(math::widen(r1).saturating_sub(gross)))
}

/// Input required to buy `amount1_out` from the curve, rounded up:
/// `⌊(⌊10^6·r0·r1 / (1000·(r1−a))⌋ − 1000·r0) / 997⌋ + 1`.
pub(crate) fn sell_for_buy(r0: U256, r1: U256, amount1_out: U256) -> Option<U256> {
    if amount1_out >= r1 {
        return None;
    }
    let k_adjusted = math::widen(r0) * math::widen(r1) * U512::from(1_000_000u64);
    let balance1_adjusted = (math::widen(r1) - math::widen(amount1_out)) * U512::from(1000u64);
    let amount0_in = (k_adjusted / balance1_adjusted - math::widen(r0) * U512::from(1000u64))
        / U512::from(1000 - POOL_FEE)
        + U512::from(1u64);
    math::narrow_checked(amount0_in)
}
