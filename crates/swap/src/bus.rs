//! Bus interface to the accounts/coins subsystem.
//!
//! The swap never moves coin balances itself; it reports signed deltas of
//! its own holdings through [`CoinChecker`] and the accounts subsystem
//! reconciles them against user balances at end of block.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use reef_primitives::{CoinId, I256};

/// Consumer side of the coin-accounting bus.
///
/// One call per coin per engine operation.
pub trait CoinChecker: Send + Sync {
    /// Reports a signed change of the subsystem's holdings of `coin`.
    fn add_coin(&self, coin: CoinId, delta: I256);
}

/// Checker that drops every report, for contexts with no accounting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChecker;

impl CoinChecker for NoopChecker {
    fn add_coin(&self, _coin: CoinId, _delta: I256) {}
}

/// Checker that accumulates reports per coin.
///
/// Used by the test suites to assert coin conservation across operations.
#[derive(Debug, Default)]
pub struct RecordingChecker {
    deltas: Mutex<BTreeMap<CoinId, I256>>,
}

impl RecordingChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Net delta reported for `coin` so far.
    pub fn delta(&self, coin: CoinId) -> I256 {
        self.deltas
            .lock()
            .get(&coin)
            .copied()
            .unwrap_or(I256::ZERO)
    }

    pub fn deltas(&self) -> BTreeMap<CoinId, I256> {
        self.deltas.lock().clone()
    }
}

impl CoinChecker for RecordingChecker {
    fn add_coin(&self, coin: CoinId, delta: I256) {
        let mut deltas = self.deltas.lock();
        let entry = deltas.entry(coin).or_insert(I256::ZERO);
        *entry += delta;
    }
}
