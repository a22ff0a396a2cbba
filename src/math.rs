//! Widening integer math
//!
//! 256-bit intermediates for products that can overflow a plain u128
//! multiply. Schoolbook halves, no external bignum.

/// 128x128 -> 256-bit multiply in two u128 halves
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & u64::MAX as u128);
    let (b_hi, b_lo) = (b >> 64, b & u64::MAX as u128);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & u64::MAX as u128) + (hl & u64::MAX as u128);
    let lo = (mid << 64) | (ll & u64::MAX as u128);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// Divide the 256-bit value (hi, lo) by `d`. Requires `hi < d` so the
/// quotient fits in a u128.
fn div_wide(hi: u128, lo: u128, d: u128) -> u128 {
    debug_assert!(d != 0 && hi < d);
    let mut rem = hi;
    let mut quot = 0u128;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quot |= 1 << i;
        }
    }
    quot
}

/// `a * b / d` without intermediate overflow, saturating at `u128::MAX`
/// when the quotient itself does not fit.
pub(crate) fn mul_div(a: u128, b: u128, d: u128) -> u128 {
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        lo / d
    } else if hi >= d {
        u128::MAX
    } else {
        div_wide(hi, lo, d)
    }
}
