//! Time-weighted oracle math: mean tick, harmonic-mean liquidity, TWAP
//! quoting and band-depth measurement.
//!
//! Mean tick and harmonic-mean liquidity follow the canonical oracle-library
//! derivation from cumulative observations; the seconds-per-liquidity
//! cumulative (not instantaneous liquidity) is what resists single-block
//! manipulation.

use alloy_primitives::U256;

use uniswap_v3_math::full_math::mul_div;
use uniswap_v3_math::sqrt_price_math::{_get_amount_0_delta, _get_amount_1_delta};
use uniswap_v3_math::tick_math::{MAX_TICK, MIN_TICK, get_sqrt_ratio_at_tick};

use crate::errors::{EngineError, Result};
use crate::models::Observation;

/// Arithmetic-mean tick over the window, rounding toward negative infinity.
pub fn mean_tick(obs: &Observation, window_secs: u32) -> Result<i32> {
    if window_secs == 0 {
        return Err(EngineError::Config("twap window must be non-zero".into()));
    }
    let delta = obs.tick_cumulatives[1] - obs.tick_cumulatives[0];
    let window = window_secs as i64;
    let mut tick = (delta / window) as i32;
    if delta < 0 && delta % window != 0 {
        tick -= 1;
    }
    Ok(tick)
}

/// Harmonic-mean active liquidity over the window, derived from the
/// seconds-per-liquidity cumulative: `(window << 128) / Δspl`.
pub fn harmonic_mean_liquidity(obs: &Observation, window_secs: u32) -> Result<u128> {
    if window_secs == 0 {
        return Err(EngineError::Config("twap window must be non-zero".into()));
    }
    // The cumulative is a wrapping counter on-chain.
    let delta = obs.seconds_per_liquidity_x128[1].wrapping_sub(obs.seconds_per_liquidity_x128[0]);
    if delta.is_zero() {
        return Err(EngineError::Other(
            "seconds-per-liquidity delta is zero over the window".into(),
        ));
    }
    let avg = (U256::from(window_secs) << 128usize) / delta;
    Ok(avg.min(U256::from(u128::MAX)).to::<u128>())
}

/// Convert `base_amount` of one pool token into the other at the price
/// implied by `tick`.
///
/// Two-branch form keeps the squared ratio inside 256 bits for extreme
/// ticks.
pub fn quote_at_tick(tick: i32, base_amount: U256, base_is_token0: bool) -> Result<U256> {
    let sqrt_ratio_x96 = get_sqrt_ratio_at_tick(tick)?;
    let quote = if sqrt_ratio_x96 <= U256::from(u128::MAX) {
        let ratio_x192 = sqrt_ratio_x96 * sqrt_ratio_x96;
        if base_is_token0 {
            mul_div(base_amount, ratio_x192, U256::from(1u8) << 192)?
        } else {
            mul_div(base_amount, U256::from(1u8) << 192, ratio_x192)?
        }
    } else {
        let ratio_x128 = mul_div(sqrt_ratio_x96, sqrt_ratio_x96, U256::from(1u8) << 64)?;
        if base_is_token0 {
            mul_div(base_amount, ratio_x128, U256::from(1u8) << 128)?
        } else {
            mul_div(base_amount, U256::from(1u8) << 128, ratio_x128)?
        }
    };
    Ok(quote)
}

/// Active depth on each side of a symmetric band around `center_tick`:
/// the token0 amount consumed moving price from the center to the band's
/// upper bound, and the token1 amount from the lower bound to the center,
/// both at `liquidity`. The band is clamped to the global tick bounds.
pub fn band_depths(center_tick: i32, halfwidth: i32, liquidity: u128) -> Result<(U256, U256)> {
    let lower = center_tick.saturating_sub(halfwidth).max(MIN_TICK);
    let upper = center_tick.saturating_add(halfwidth).min(MAX_TICK);
    let sqrt_center = get_sqrt_ratio_at_tick(center_tick)?;
    let sqrt_lower = get_sqrt_ratio_at_tick(lower)?;
    let sqrt_upper = get_sqrt_ratio_at_tick(upper)?;
    let amount0 = _get_amount_0_delta(sqrt_center, sqrt_upper, liquidity, false)?;
    let amount1 = _get_amount_1_delta(sqrt_lower, sqrt_center, liquidity, false)?;
    Ok((amount0, amount1))
}
