//! Integer helpers and the f64 bridge used by the price-inversion solver.

use alloy_primitives::Sign;
use reef_primitives::{I256, U256, U512};

/// Widens into the 512-bit space the K products are computed in.
pub fn widen(x: U256) -> U512 {
    let limbs = x.as_limbs();
    U512::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3], 0, 0, 0, 0])
}

/// Narrows a value known to fit 256 bits; anything wider is a math bug.
pub fn narrow(x: U512) -> U256 {
    narrow_checked(x).expect("value exceeds 256 bits")
}

pub fn narrow_checked(x: U512) -> Option<U256> {
    if x.bit_len() > 256 {
        return None;
    }
    let limbs = x.as_limbs();
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// A non-negative amount as a signed delta.
pub fn to_signed(x: U256) -> I256 {
    I256::checked_from_sign_and_abs(Sign::Positive, x).expect("amount exceeds I256")
}

/// Integer square root, Babylonian method.
pub fn sqrt(x: U256) -> U256 {
    if x.is_zero() {
        return U256::ZERO;
    }
    let mut z = (x + U256::from(1)) >> 1;
    let mut y = x;
    while z < y {
        y = z;
        z = (x / z + z) >> 1;
    }
    y
}

/// Integer square root of a 512-bit value; the result always fits 256 bits.
pub fn sqrt_u512(x: U512) -> U256 {
    if x.is_zero() {
        return U256::ZERO;
    }
    let mut z = (x + U512::from(1)) >> 1;
    let mut y = x;
    while z < y {
        y = z;
        z = (x / z + z) >> 1;
    }
    U256::from(y)
}

/// Lossy conversion for the f64 solver. Fixed limb order keeps the rounding
/// identical on every node.
pub fn u256_to_f64(x: U256) -> f64 {
    let limbs = x.as_limbs();
    let mut value = 0.0f64;
    for (i, limb) in limbs.iter().enumerate() {
        value += (*limb as f64) * 2f64.powi(64 * i as i32);
    }
    value
}

/// Truncating conversion back from the solver. `None` for non-finite or
/// negative values and for values that do not fit 256 bits.
pub fn f64_to_u256(x: f64) -> Option<U256> {
    if !x.is_finite() || x < 0.0 {
        return None;
    }
    let x = x.trunc();
    if x >= 2f64.powi(256) {
        return None;
    }
    // an f64 carries at most 53 significant bits, so extracting whole limbs
    // from the top down is exact
    let mut result = U256::ZERO;
    let mut rest = x;
    for shift in [192i32, 128, 64, 0] {
        let scale = 2f64.powi(shift);
        let limb = (rest / scale).trunc();
        rest -= limb * scale;
        result |= U256::from(limb as u64) << shift as usize;
    }
    Some(result)
}
