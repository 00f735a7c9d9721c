//! Exact constant-liquidity swap-step simulation and fixed-point valuation
//! helpers for the solver loop.
//!
//! All price math stays in the AMM's native Q96 sqrt-price representation;
//! every multiply-divide goes through full-precision `mul_div`.

use alloy_primitives::{I256, U256};

use uniswap_v3_math::full_math::mul_div;
use uniswap_v3_math::sqrt_price_math::{_get_amount_0_delta, _get_amount_1_delta};
use uniswap_v3_math::swap_math::compute_swap_step;

use crate::errors::{EngineError, Result};

/// 2^96, the fixed-point scale of sqrt prices.
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Unit liquidity used for per-unit range capacities, scaled by Q96 so the
/// amount deltas stay in integer range.
pub const UNIT_LIQUIDITY: u128 = 1 << 96;

/// Direction of one simulated swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// token0 in, token1 out; sqrt price decreases.
    Token0ToToken1,
    /// token1 in, token0 out; sqrt price increases.
    Token1ToToken0,
}

/// Result of simulating one damped step against the pool.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    pub next_sqrt_price_x96: U256,
    /// Input actually consumed, fee included.
    pub consumed: U256,
    pub amount_out: U256,
    /// The step was clamped at the range boundary in its direction.
    pub boundary_hit: bool,
}

/// Value a token0 amount in token1 units at the given sqrt price.
pub fn value0_in_token1(amount0: U256, sqrt_price_x96: U256) -> Result<U256> {
    let scaled = mul_div(amount0, sqrt_price_x96, Q96)?;
    Ok(mul_div(scaled, sqrt_price_x96, Q96)?)
}

/// Value a token1 amount in token0 units at the given sqrt price.
pub fn value1_in_token0(amount1: U256, sqrt_price_x96: U256) -> Result<U256> {
    if sqrt_price_x96.is_zero() {
        return Err(EngineError::Other("zero sqrt price".into()));
    }
    let scaled = mul_div(amount1, Q96, sqrt_price_x96)?;
    Ok(mul_div(scaled, Q96, sqrt_price_x96)?)
}

/// Per-unit-liquidity capacities of the range at sqrt price `p` (clamped
/// into the range): the token0 amount consumed moving price from `p` to the
/// upper bound and the token1 amount from the lower bound to `p`, both at
/// [`UNIT_LIQUIDITY`].
pub fn unit_capacities(
    sqrt_price_x96: U256,
    sqrt_lower_x96: U256,
    sqrt_upper_x96: U256,
) -> Result<(U256, U256)> {
    let p = sqrt_price_x96.clamp(sqrt_lower_x96, sqrt_upper_x96);
    let cap0 = _get_amount_0_delta(p, sqrt_upper_x96, UNIT_LIQUIDITY, false)?;
    let cap1 = _get_amount_1_delta(sqrt_lower_x96, p, UNIT_LIQUIDITY, false)?;
    Ok((cap0, cap1))
}

/// Simulate swapping `amount_in` against the pool at constant liquidity,
/// clamped at the range boundary lying in the step's direction.
///
/// Fee-adjusted input, next sqrt price from input, output from the price
/// delta; never an external quote.
pub fn simulate_step(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: U256,
    direction: SwapDirection,
    fee_pips: u32,
    sqrt_lower_x96: U256,
    sqrt_upper_x96: U256,
) -> Result<StepOutcome> {
    if amount_in > U256::MAX >> 1 {
        return Err(EngineError::Other("step amount exceeds I256 range".into()));
    }
    let target = match direction {
        SwapDirection::Token0ToToken1 => sqrt_lower_x96,
        SwapDirection::Token1ToToken0 => sqrt_upper_x96,
    };
    let (next_sqrt, amount_in_net, amount_out, fee_amount) = compute_swap_step(
        sqrt_price_x96,
        target,
        liquidity,
        I256::from_raw(amount_in),
        fee_pips,
    )?;
    let consumed = amount_in_net + fee_amount;
    Ok(StepOutcome {
        next_sqrt_price_x96: next_sqrt,
        consumed,
        amount_out,
        boundary_hit: next_sqrt == target && consumed < amount_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uniswap_v3_math::tick_math::get_sqrt_ratio_at_tick;

    fn u256_to_f64(v: U256) -> f64 {
        v.to_string().parse::<f64>().unwrap_or(0.0)
    }

    #[test]
    fn q96_constant_is_two_pow_96() {
        assert_eq!(Q96, U256::from(1u8) << 96);
        assert_eq!(U256::from(UNIT_LIQUIDITY), Q96);
    }

    #[test]
    fn valuation_round_trip_at_unit_price() {
        let amount = U256::from(1_000_000u64);
        assert_eq!(value0_in_token1(amount, Q96).unwrap(), amount);
        assert_eq!(value1_in_token0(amount, Q96).unwrap(), amount);
    }

    #[test]
    fn valuation_tracks_price() {
        // tick 6932 ~ price 2: one token0 is worth ~two token1.
        let sqrt = get_sqrt_ratio_at_tick(6932).unwrap();
        let v = u256_to_f64(value0_in_token1(U256::from(10u64).pow(U256::from(18u8)), sqrt).unwrap());
        assert!((v - 2e18).abs() / 2e18 < 1e-3);
    }

    #[test]
    fn capacities_vanish_at_their_boundary() {
        let lower = get_sqrt_ratio_at_tick(-600).unwrap();
        let upper = get_sqrt_ratio_at_tick(600).unwrap();
        let (cap0_at_upper, cap1_at_upper) = unit_capacities(upper, lower, upper).unwrap();
        assert!(cap0_at_upper.is_zero());
        assert!(!cap1_at_upper.is_zero());

        let (cap0_at_lower, cap1_at_lower) = unit_capacities(lower, lower, upper).unwrap();
        assert!(!cap0_at_lower.is_zero());
        assert!(cap1_at_lower.is_zero());
    }

    #[test]
    fn step_consumes_at_most_requested() {
        let lower = get_sqrt_ratio_at_tick(-600).unwrap();
        let upper = get_sqrt_ratio_at_tick(600).unwrap();
        let amount = U256::from(10u64).pow(U256::from(18u8));
        let out = simulate_step(
            Q96,
            1_000_000_000_000_000_000_000u128,
            amount,
            SwapDirection::Token1ToToken0,
            3000,
            lower,
            upper,
        )
        .unwrap();
        assert!(out.consumed <= amount);
        assert!(out.next_sqrt_price_x96 > Q96);
        assert!(out.next_sqrt_price_x96 <= upper);
        assert!(!out.amount_out.is_zero());
    }

    #[test]
    fn step_clamps_at_range_boundary() {
        let lower = get_sqrt_ratio_at_tick(-600).unwrap();
        let upper = get_sqrt_ratio_at_tick(600).unwrap();
        // Tiny liquidity, huge input: the step must stop exactly at the
        // boundary and report the clamp.
        let amount = U256::from(10u64).pow(U256::from(24u8));
        let out = simulate_step(
            Q96,
            1_000_000u128,
            amount,
            SwapDirection::Token0ToToken1,
            3000,
            lower,
            upper,
        )
        .unwrap();
        assert!(out.boundary_hit);
        assert_eq!(out.next_sqrt_price_x96, lower);
        assert!(out.consumed < amount);
    }
}
