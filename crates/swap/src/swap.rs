//! The swap subsystem facade.
//!
//! [`Swap`] owns the mutation cache (pairs faulted in or created during the
//! block), the atomic handle to the committed snapshot, the bus checker and
//! the order id counter. Read operations are safe to call concurrently with
//! block execution; mutation is single-threaded by the block pipeline.
//!
//! Transaction validation runs against a [`Swap::fork`] — a CheckState that
//! shares the snapshot but stages its mutations privately, so dropping it
//! rolls everything back.

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use alloy_rlp::Decodable;
use parking_lot::RwLock;
use reef_primitives::{Address, CoinId, U256};
use reef_store::{MutableTree, Snapshot};
use tracing::trace;

use crate::{
    bus::CoinChecker,
    engine::{FillDetails, OrderPayout},
    error::{Result, SwapError},
    key::{
        self, PairKey, SortPrice, BALANCE_KEY_LEN, INDEX_KEY_LEN, ORDER_COUNTER_KEY, ORDER_PREFIX,
        PAIR_COUNTER_KEY, PAIR_KEY_LEN, SWAP_PREFIX,
    },
    math,
    order::{Order, OrderRecord},
    pair::{BalanceRecord, Pair, PairRecord, PairView, MINIMUM_LIQUIDITY},
    source::{OrderPage, StateSource},
};

/// Atomically swappable handle to the committed snapshot.
#[derive(Debug)]
pub struct SnapshotCell(RwLock<Arc<Snapshot>>);

impl SnapshotCell {
    fn new(snapshot: Snapshot) -> Self {
        Self(RwLock::new(Arc::new(snapshot)))
    }

    pub fn load(&self) -> Arc<Snapshot> {
        self.0.read().clone()
    }

    fn store(&self, snapshot: Arc<Snapshot>) {
        *self.0.write() = snapshot;
    }
}

/// [`StateSource`] over the snapshot cell: every lazy load reads whatever
/// snapshot is current at that moment.
#[derive(Debug)]
struct TreeSource {
    snapshot: Arc<SnapshotCell>,
}

impl StateSource for TreeSource {
    fn load_balance(&self, pair: PairKey, owner: Address) -> Option<U256> {
        let snapshot = self.snapshot.load();
        let bytes = snapshot.get(&pair.path_balance(owner))?;
        let record = BalanceRecord::decode(&mut &bytes[..]).expect("corrupt balance record");
        Some(record.liquidity)
    }

    fn load_order(&self, id: u32) -> Option<Order> {
        let snapshot = self.snapshot.load();
        let bytes = snapshot.get(&key::path_order(id))?;
        let record = OrderRecord::decode(&mut &bytes[..]).expect("corrupt order record");
        Some(Order::from_record(id, record))
    }

    fn load_order_page(
        &self,
        pair: PairKey,
        side: key::Side,
        from: Option<(SortPrice, u32)>,
        limit: usize,
    ) -> OrderPage {
        let snapshot = self.snapshot.load();
        let (first, end) = pair.index_bounds(side);
        let start = match from {
            Some((price, id)) => pair.index_start_after(side, price, id),
            None => first,
        };

        let mut ids = Vec::new();
        snapshot.iterate_range(&start, &end, true, |key_bytes, _| {
            // balance records share the key range; only index-shaped keys count
            if key_bytes.len() != INDEX_KEY_LEN {
                return false;
            }
            ids.push(key::index_key_id(key_bytes));
            ids.len() >= limit
        });
        let exhausted = ids.len() < limit;
        OrderPage { ids, exhausted }
    }
}

fn read_counter(snapshot: &Snapshot, counter_key: &[u8]) -> u32 {
    snapshot
        .get(counter_key)
        .map(|bytes| u32::decode(&mut &bytes[..]).expect("corrupt counter record"))
        .unwrap_or(0)
}

/// The AMM + order-book state subsystem.
pub struct Swap {
    /// Pairs touched so far; `None` caches a confirmed absence.
    pairs: RwLock<BTreeMap<PairKey, Option<Arc<Pair>>>>,
    snapshot: Arc<SnapshotCell>,
    source: Arc<TreeSource>,
    checker: Arc<dyn CoinChecker>,
    /// Highest order id ever assigned.
    last_order_id: AtomicU32,
    /// Highest pair id ever assigned.
    last_pair_id: AtomicU32,
}

impl core::fmt::Debug for Swap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Swap")
            .field("pairs", &self.pairs.read().len())
            .field("last_order_id", &self.last_order_id)
            .finish_non_exhaustive()
    }
}

impl Swap {
    pub fn new(checker: Arc<dyn CoinChecker>, snapshot: Snapshot) -> Self {
        let cell = Arc::new(SnapshotCell::new(snapshot));
        let source = Arc::new(TreeSource {
            snapshot: cell.clone(),
        });
        let current = cell.load();
        Self {
            pairs: RwLock::new(BTreeMap::new()),
            snapshot: cell,
            source,
            checker,
            last_order_id: AtomicU32::new(read_counter(&current, &ORDER_COUNTER_KEY)),
            last_pair_id: AtomicU32::new(read_counter(&current, &PAIR_COUNTER_KEY)),
        }
    }

    /// A CheckState over the same snapshot: private mutation cache, own
    /// counters. Dropping the fork discards everything it staged.
    pub fn fork(&self, checker: Arc<dyn CoinChecker>) -> Swap {
        Swap {
            pairs: RwLock::new(BTreeMap::new()),
            snapshot: self.snapshot.clone(),
            source: self.source.clone(),
            checker,
            last_order_id: AtomicU32::new(self.last_order_id.load(Ordering::SeqCst)),
            last_pair_id: AtomicU32::new(self.last_pair_id.load(Ordering::SeqCst)),
        }
    }

    /// The committed snapshot currently backing lazy loads.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load()
    }

    /// Atomically republishes the snapshot after a commit. In-memory caches
    /// stay valid: their keys are still live in the new version.
    pub fn set_snapshot(&self, snapshot: Snapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Resolves a pool in the requested orientation, faulting it in from
    /// the tree on first touch.
    pub fn pair(&self, coin0: CoinId, coin1: CoinId) -> Option<PairView> {
        let requested = PairKey::new(coin0, coin1);
        let canonical = requested.ordered();
        let reversed = !requested.is_ordered();

        let mut pairs = self.pairs.write();
        if let Some(entry) = pairs.get(&canonical) {
            return entry
                .as_ref()
                .map(|pair| PairView::new(pair.clone(), reversed));
        }

        let snapshot = self.snapshot.load();
        let loaded = snapshot.get(&canonical.path_pair()).map(|bytes| {
            let record = PairRecord::decode(&mut &bytes[..]).expect("corrupt pair record");
            let source: Arc<dyn StateSource> = self.source.clone();
            Arc::new(Pair::from_record(canonical, record, source))
        });
        pairs.insert(canonical, loaded.clone());
        loaded.map(|pair| PairView::new(pair, reversed))
    }

    /// Resolves a pool, creating an empty one on first use.
    ///
    /// Identical coins are rejected before validation ever reaches this
    /// point, so hitting them here halts the node.
    pub fn return_pair(&self, coin0: CoinId, coin1: CoinId) -> PairView {
        if coin0 == coin1 {
            panic!("{}", SwapError::IdenticalCoins);
        }
        if let Some(view) = self.pair(coin0, coin1) {
            return view;
        }

        let requested = PairKey::new(coin0, coin1);
        let canonical = requested.ordered();
        let id = self.last_pair_id.fetch_add(1, Ordering::SeqCst) + 1;
        let source: Arc<dyn StateSource> = self.source.clone();
        let pair = Arc::new(Pair::new(canonical, id, source));
        self.pairs.write().insert(canonical, Some(pair.clone()));
        PairView::new(pair, !requested.is_ordered())
    }

    pub fn swap_pool_exists(&self, coin0: CoinId, coin1: CoinId) -> bool {
        self.pair(coin0, coin1).is_some()
    }

    /// `(total_supply, reserve0, reserve1)` of a pool, oriented.
    pub fn swap_pool(&self, coin0: CoinId, coin1: CoinId) -> Option<(U256, U256, U256)> {
        let pair = self.pair(coin0, coin1)?;
        let (reserve0, reserve1) = pair.reserves();
        Some((pair.total_supply(), reserve0, reserve1))
    }

    /// `(balance, amount0, amount1)` of one provider's share, oriented.
    pub fn swap_pool_from_provider(
        &self,
        provider: Address,
        coin0: CoinId,
        coin1: CoinId,
    ) -> Option<(U256, U256, U256)> {
        let pair = self.pair(coin0, coin1)?;
        let balance = pair.balance(provider)?;
        let (amount0, amount1) = pair.amounts_of_liquidity(balance);
        Some((balance, amount0, amount1))
    }

    pub fn check_mint(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0: U256,
        max_amount1: U256,
    ) -> Result<()> {
        if coin0 == coin1 {
            return Err(SwapError::IdenticalCoins);
        }
        match self.pair(coin0, coin1) {
            Some(pair) => pair.check_mint(amount0, max_amount1),
            None => {
                // the pool would be created by this mint
                let liquidity = math::sqrt_u512(math::widen(amount0) * math::widen(max_amount1))
                    .saturating_sub(U256::from(MINIMUM_LIQUIDITY));
                if liquidity.is_zero() {
                    Err(SwapError::InsufficientLiquidityMinted)
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn check_burn(
        &self,
        address: Address,
        coin0: CoinId,
        coin1: CoinId,
        liquidity: U256,
        min_amount0: U256,
        min_amount1: U256,
    ) -> Result<()> {
        if coin0 == coin1 {
            return Err(SwapError::IdenticalCoins);
        }
        let pair = self.pair(coin0, coin1).ok_or(SwapError::PairNotExists)?;
        pair.check_burn(address, liquidity, min_amount0, min_amount1)
    }

    pub fn check_swap(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0_in: U256,
        amount1_out: U256,
    ) -> Result<()> {
        if coin0 == coin1 {
            return Err(SwapError::IdenticalCoins);
        }
        let pair = self.pair(coin0, coin1).ok_or(SwapError::PairNotExists)?;
        pair.check_swap(amount0_in, U256::ZERO, U256::ZERO, amount1_out)
    }

    pub fn pair_calculate_buy_for_sell(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0_in: U256,
    ) -> Result<U256> {
        let pair = self.pair(coin0, coin1).ok_or(SwapError::PairNotExists)?;
        pair.calculate_buy_for_sell(amount0_in)
            .ok_or(SwapError::InsufficientLiquidity)
    }

    pub fn pair_calculate_sell_for_buy(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount1_out: U256,
    ) -> Result<U256> {
        let pair = self.pair(coin0, coin1).ok_or(SwapError::PairNotExists)?;
        pair.calculate_sell_for_buy(amount1_out)
            .ok_or(SwapError::InsufficientLiquidity)
    }

    /// `(liquidity, amount0, amount1)` quote for adding `amount0`.
    pub fn pair_calculate_add_liquidity(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0: U256,
    ) -> Result<(U256, U256, U256)> {
        let pair = self.pair(coin0, coin1).ok_or(SwapError::PairNotExists)?;
        Ok(pair.new_liquidity(amount0))
    }

    pub fn amounts_of_liquidity(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        liquidity: U256,
    ) -> Option<(U256, U256)> {
        let pair = self.pair(coin0, coin1)?;
        Some(pair.amounts_of_liquidity(liquidity))
    }

    /// Applies a mint and reports the deposited amounts through the bus.
    /// Returns `(amount0, amount1, liquidity)`.
    pub fn pair_mint(
        &self,
        address: Address,
        coin0: CoinId,
        coin1: CoinId,
        amount0: U256,
        max_amount1: U256,
    ) -> (U256, U256, U256) {
        let pair = self.return_pair(coin0, coin1);
        let (old0, old1) = pair.reserves();
        let liquidity = pair.mint(address, amount0, max_amount1);
        let (new0, new1) = pair.reserves();

        let balance0 = new0 - old0;
        let balance1 = new1 - old1;
        self.checker.add_coin(coin0, math::to_signed(balance0));
        self.checker.add_coin(coin1, math::to_signed(balance1));

        (balance0, balance1, liquidity)
    }

    /// Applies a burn and reports the withdrawn amounts through the bus.
    pub fn pair_burn(
        &self,
        address: Address,
        coin0: CoinId,
        coin1: CoinId,
        liquidity: U256,
        min_amount0: U256,
        min_amount1: U256,
    ) -> (U256, U256) {
        let pair = self
            .pair(coin0, coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        let (old0, old1) = pair.reserves();
        pair.burn(address, liquidity, min_amount0, min_amount1);
        let (new0, new1) = pair.reserves();

        let balance0 = old0 - new0;
        let balance1 = old1 - new1;
        self.checker.add_coin(coin0, -math::to_signed(balance0));
        self.checker.add_coin(coin1, -math::to_signed(balance1));

        (balance0, balance1)
    }

    /// Curve-only sell. Returns `(amount0_in, amount1_out)`.
    pub fn pair_sell(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0_in: U256,
        min_amount1_out: U256,
    ) -> (U256, U256) {
        let pair = self
            .pair(coin0, coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        let calculated = pair
            .calculate_buy_for_sell(amount0_in)
            .unwrap_or_else(|| panic!("{}", SwapError::InsufficientLiquidity));
        if calculated < min_amount1_out {
            panic!("calculated amount1_out {calculated} less than minimum {min_amount1_out}");
        }
        let (balance0, balance1) = pair.swap(amount0_in, U256::ZERO, U256::ZERO, calculated);
        self.checker.add_coin(coin0, balance0);
        self.checker.add_coin(coin1, balance1);
        (balance0.unsigned_abs(), balance1.unsigned_abs())
    }

    /// Curve-only buy. Returns `(amount0_in, amount1_out)`.
    pub fn pair_buy(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        max_amount0_in: U256,
        amount1_out: U256,
    ) -> (U256, U256) {
        let pair = self
            .pair(coin0, coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        let calculated = pair
            .calculate_sell_for_buy(amount1_out)
            .unwrap_or_else(|| panic!("{}", SwapError::InsufficientLiquidity));
        if calculated > max_amount0_in {
            panic!("calculated amount0_in {calculated} more than maximum {max_amount0_in}");
        }
        let (balance0, balance1) = pair.swap(calculated, U256::ZERO, U256::ZERO, amount1_out);
        self.checker.add_coin(coin0, balance0);
        self.checker.add_coin(coin1, balance1);
        (balance0.unsigned_abs(), balance1.unsigned_abs())
    }

    /// Sells `amount0_in` across the book and the curve, publishing the
    /// taker legs and every maker payout through the bus.
    ///
    /// Returns `(amount0_in, amount1_out, pair_id, details, payouts)`.
    pub fn pair_sell_with_orders(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        amount0_in: U256,
        min_amount1_out: U256,
    ) -> (U256, U256, u32, FillDetails, Vec<OrderPayout>) {
        let pair = self
            .pair(coin0, coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        let (amount1_out, payouts, details) = pair.sell_with_orders(amount0_in);
        if amount1_out < min_amount1_out {
            panic!("calculated amount1_out {amount1_out} less than minimum {min_amount1_out}");
        }

        for payout in &payouts {
            self.checker.add_coin(coin0, -math::to_signed(payout.value));
        }
        self.checker.add_coin(coin0, math::to_signed(amount0_in));
        self.checker.add_coin(coin1, -math::to_signed(amount1_out));

        (amount0_in, amount1_out, pair.id(), details, payouts)
    }

    /// Buys exactly `amount1_out` across the book and the curve.
    ///
    /// Returns `(amount0_in, amount1_out, pair_id, details, payouts)`.
    pub fn pair_buy_with_orders(
        &self,
        coin0: CoinId,
        coin1: CoinId,
        max_amount0_in: U256,
        amount1_out: U256,
    ) -> (U256, U256, u32, FillDetails, Vec<OrderPayout>) {
        let pair = self
            .pair(coin0, coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        let (amount0_in, payouts, details) = pair.buy_with_orders(amount1_out);
        if amount0_in > max_amount0_in {
            panic!("calculated amount0_in {amount0_in} more than maximum {max_amount0_in}");
        }

        for payout in &payouts {
            self.checker.add_coin(coin0, -math::to_signed(payout.value));
        }
        self.checker.add_coin(coin0, math::to_signed(amount0_in));
        self.checker.add_coin(coin1, -math::to_signed(amount1_out));

        (amount0_in, amount1_out, pair.id(), details, payouts)
    }

    fn next_order_id(&self) -> u32 {
        self.last_order_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Places a limit order selling `want_sell` of `coin_want_sell` for
    /// `want_buy` of `coin_want_buy`. Returns `(order_id, pair_id)`.
    pub fn pair_add_order(
        &self,
        coin_want_buy: CoinId,
        coin_want_sell: CoinId,
        want_buy: U256,
        want_sell: U256,
        sender: Address,
        height: u64,
    ) -> (u32, u32) {
        let id = self.next_order_id();
        self.insert_order(
            coin_want_buy,
            coin_want_sell,
            want_buy,
            want_sell,
            sender,
            id,
            height,
        )
    }

    /// Id-preserving insert used by genesis import.
    pub fn pair_add_order_with_id(
        &self,
        coin_want_buy: CoinId,
        coin_want_sell: CoinId,
        want_buy: U256,
        want_sell: U256,
        sender: Address,
        id: u32,
        height: u64,
    ) -> (u32, u32) {
        self.last_order_id.fetch_max(id, Ordering::SeqCst);
        self.insert_order(
            coin_want_buy,
            coin_want_sell,
            want_buy,
            want_sell,
            sender,
            id,
            height,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_order(
        &self,
        coin_want_buy: CoinId,
        coin_want_sell: CoinId,
        want_buy: U256,
        want_sell: U256,
        sender: Address,
        id: u32,
        height: u64,
    ) -> (u32, u32) {
        let pair = self
            .pair(coin_want_buy, coin_want_sell)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));

        let order = Order {
            id,
            pair: pair.key(),
            is_buy: false,
            want_buy,
            want_sell,
            owner: sender,
            height,
            old_sort_price: SortPrice::ZERO,
        };
        let sorted = order.sorted();

        {
            let source = pair.pair.source.clone();
            let mut book = pair.pair.book.write();
            book.mark_dirty(&sorted);
            book.insert_order(sorted);
            book.order_sell_by_index(source.as_ref(), pair.pair.key, pair.reversed, 0);
        }

        self.checker
            .add_coin(coin_want_sell, math::to_signed(want_sell));

        (id, pair.id())
    }

    /// An order by id, canonical form; `None` once consumed or cancelled.
    pub fn get_order(&self, id: u32) -> Option<Order> {
        let order = self.find_order(id)?;
        let pair = self.pair(order.pair.coin0, order.pair.coin1)?;
        {
            let book = pair.pair.book.read();
            if book.is_deleted(id) {
                return None;
            }
        }
        let source = pair.pair.source.clone();
        let mut book = pair.pair.book.write();
        book.order(source.as_ref(), id)
    }

    /// Looks an order up in the cached books first, then in the tree, so
    /// orders placed earlier in the same block resolve too.
    fn find_order(&self, id: u32) -> Option<Order> {
        {
            let pairs = self.pairs.read();
            for pair in pairs.values().flatten() {
                if let Some(Some(order)) = pair.book.read().orders.get(&id) {
                    return Some(order.clone());
                }
            }
        }
        self.source.load_order(id)
    }

    /// Cancels an order, returning `(refund_coin, refund_volume)` and
    /// reporting the escrow release through the bus.
    pub fn pair_remove_limit_order(&self, id: u32) -> (CoinId, U256) {
        let Some(order) = self.get_order(id) else {
            panic!("order not exist");
        };
        // work in the orientation the maker posted: the order sells coin1
        let order = if order.is_sell() {
            order
        } else {
            order.reversed()
        };
        let pair = self
            .pair(order.pair.coin0, order.pair.coin1)
            .unwrap_or_else(|| panic!("{}", SwapError::PairNotExists));
        if pair.is_order_used(id) {
            panic!("order already used");
        }

        let return_volume = order.want_sell;
        self.checker
            .add_coin(order.pair.coin1, -math::to_signed(return_volume));

        let source = pair.pair.source.clone();
        let mut book = pair.pair.book.write();
        book.update_sell_order(
            source.as_ref(),
            pair.reversed,
            id,
            order.want_buy,
            order.want_sell,
        );
        book.order_sell_by_index(source.as_ref(), pair.pair.key, pair.reversed, 0);

        (order.pair.coin1, return_volume)
    }

    /// Writes every dirty pair, balance and order into the builder and
    /// clears the dirty bookkeeping. Call [`Self::set_snapshot`] with the
    /// committed result to publish the new version.
    pub fn commit(&self, tree: &mut MutableTree) {
        let pairs = self.pairs.read();
        for (pair_key, entry) in pairs.iter() {
            let Some(pair) = entry else { continue };

            {
                let mut data = pair.data.write();
                if data.dirty {
                    data.dirty = false;
                    let record = PairRecord {
                        reserve0: data.reserve0,
                        reserve1: data.reserve1,
                        total_supply: data.total_supply,
                        id: data.id,
                    };
                    tree.set(pair_key.path_pair(), alloy_rlp::encode(&record));
                }
            }

            {
                let mut balances = pair.balances.write();
                for (address, slot) in balances.iter_mut() {
                    let Some(balance) = slot else { continue };
                    if !balance.dirty {
                        continue;
                    }
                    let path = pair_key.path_balance(*address);
                    if balance.liquidity.is_zero() {
                        tree.remove(&path);
                        *slot = None;
                    } else {
                        balance.dirty = false;
                        tree.set(
                            path,
                            alloy_rlp::encode(&BalanceRecord {
                                liquidity: balance.liquidity,
                            }),
                        );
                    }
                }
            }

            {
                let mut book = pair.book.write();
                let dirty: Vec<u32> = book.dirty.iter().copied().collect();
                for id in dirty {
                    let deleted =
                        book.deleted_sell.contains(&id) || book.deleted_buy.contains(&id);
                    if deleted {
                        tree.remove(&key::path_order(id));
                        // the persisted index slot is keyed by the price the
                        // order was last written with
                        let anchor = book
                            .orders
                            .get(&id)
                            .cloned()
                            .flatten()
                            .or_else(|| self.source.load_order(id));
                        if let Some(order) = anchor {
                            tree.remove(&pair_key.index_key(
                                order.side(),
                                order.old_sort_price,
                                id,
                            ));
                        }
                    } else {
                        let order = book
                            .orders
                            .get(&id)
                            .cloned()
                            .flatten()
                            .unwrap_or_else(|| panic!("dirty order {id} not cached"));
                        tree.set(
                            key::path_order(id).to_vec(),
                            alloy_rlp::encode(&order.to_record()),
                        );
                        let side = order.side();
                        let price = order.sort_price();
                        if order.old_sort_price != price {
                            tree.remove(&pair_key.index_key(side, order.old_sort_price, id));
                        }
                        tree.set(pair_key.index_key(side, price, id), Vec::new());
                    }
                }
                book.reset_after_commit();
            }
        }
        drop(pairs);

        let last_order = self.last_order_id.load(Ordering::SeqCst);
        if last_order > 0 {
            tree.set(ORDER_COUNTER_KEY.to_vec(), alloy_rlp::encode(last_order));
        }
        let last_pair = self.last_pair_id.load(Ordering::SeqCst);
        if last_pair > 0 {
            tree.set(PAIR_COUNTER_KEY.to_vec(), alloy_rlp::encode(last_pair));
        }
        trace!(last_order, last_pair, "swap state committed");
    }

    /// Scan prefixes used by the genesis exporter.
    pub(crate) fn swap_range() -> ([u8; 1], [u8; 1]) {
        ([SWAP_PREFIX], [SWAP_PREFIX + 1])
    }

    pub(crate) fn order_range() -> ([u8; 1], [u8; 1]) {
        ([ORDER_PREFIX], [ORDER_PREFIX + 1])
    }

    pub(crate) fn classify_swap_key(key_bytes: &[u8]) -> SwapKeyKind {
        match key_bytes.len() {
            PAIR_KEY_LEN => SwapKeyKind::Pair,
            BALANCE_KEY_LEN => SwapKeyKind::Balance,
            _ => SwapKeyKind::Index,
        }
    }
}

/// What a key under the swap prefix addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapKeyKind {
    Pair,
    Balance,
    Index,
}
