//! Swap error surface.
//!
//! Every user-reachable rejection is one of these kinds; the `Display` form
//! is the short uppercase tag that consensus serialises into transaction
//! results, so the strings are part of the protocol and must not change.

use thiserror::Error;

/// Typed failure kinds of the swap subsystem.
///
/// The `check_*` family returns these; the apply family panics with the same
/// tag when a condition that already passed its check fails during apply
/// (that is a consensus bug, and halting beats forking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SwapError {
    /// No pool exists for the requested coin pair.
    #[error("PAIR_NOT_EXISTS")]
    PairNotExists,

    /// Both sides of the pair are the same coin. The tag keeps the
    /// Uniswap-heritage wording the wire format was born with.
    #[error("IDENTICAL_ADDRESSES")]
    IdenticalCoins,

    /// A requested output exceeds the pool reserves.
    #[error("INSUFFICIENT_LIQUIDITY")]
    InsufficientLiquidity,

    /// A mint would create zero or negative liquidity.
    #[error("INSUFFICIENT_LIQUIDITY_MINTED")]
    InsufficientLiquidityMinted,

    /// A burn would return no more than the requested minimum amounts.
    #[error("INSUFFICIENT_LIQUIDITY_BURNED")]
    InsufficientLiquidityBurned,

    /// The provider holds less liquidity than the burn asks for.
    #[error("INSUFFICIENT_LIQUIDITY_BALANCE")]
    InsufficientLiquidityBalance,

    #[error("INSUFFICIENT_INPUT_AMOUNT")]
    InsufficientInputAmount,

    #[error("INSUFFICIENT_OUTPUT_AMOUNT")]
    InsufficientOutputAmount,

    /// The constant-product invariant would shrink.
    #[error("K")]
    K,
}

pub type Result<T, E = SwapError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(SwapError::PairNotExists.to_string(), "PAIR_NOT_EXISTS");
        assert_eq!(SwapError::IdenticalCoins.to_string(), "IDENTICAL_ADDRESSES");
        assert_eq!(
            SwapError::InsufficientLiquidityMinted.to_string(),
            "INSUFFICIENT_LIQUIDITY_MINTED"
        );
        assert_eq!(SwapError::K.to_string(), "K");
    }
}
