//! Rebalance solver.
//!
//! Given a two-token bundle and a target tick range on a specific pool,
//! computes the single swap that leaves the bundle in the ratio the range
//! would consume, via damped Newton-Raphson over exact constant-liquidity
//! swap math.

use std::sync::{Arc, RwLock};

use alloy_primitives::U256;
use ethers::types::Address;
use tracing::debug;

use uniswap_v3_math::full_math::mul_div;
use uniswap_v3_math::tick_math::get_sqrt_ratio_at_tick;

use crate::config::SolverConfig;
use crate::errors::{EngineError, Result};
use crate::models::{PoolSnapshot, RebalancePlan, TickRange, TokenBundle};
use crate::pool::PoolReader;
use crate::registry::{ConnectorProvider, PoolRegistry};
use crate::router::QuoteValuer;

pub mod sim;

pub use sim::SwapDirection;

use sim::{Q96, simulate_step, unit_capacities, value0_in_token1, value1_in_token0};

/// Plan plus solver diagnostics for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    pub plan: RebalancePlan,
    pub iterations: u32,
    pub direction_flips: u32,
    pub converged: bool,
}

/// Iteration-local virtual bundle and price; a plain value threaded through
/// the loop, never stored.
#[derive(Debug, Clone, Copy)]
struct IterState {
    amount0: U256,
    amount1: U256,
    sqrt_price_x96: U256,
}

pub struct RebalanceSolver<P, R, C> {
    pools: P,
    registry: R,
    connectors: C,
    config: RwLock<SolverConfig>,
    /// Valuation cache used for the absolute dust floor; the floor check is
    /// skipped when absent.
    valuer: Option<Arc<dyn QuoteValuer>>,
}

impl<P, R, C> RebalanceSolver<P, R, C>
where
    P: PoolReader,
    R: PoolRegistry,
    C: ConnectorProvider,
{
    pub fn new(
        pools: P,
        registry: R,
        connectors: C,
        config: SolverConfig,
        valuer: Option<Arc<dyn QuoteValuer>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pools,
            registry,
            connectors,
            config: RwLock::new(config),
            valuer,
        })
    }

    pub fn set_config(&self, config: SolverConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().expect("config lock poisoned") = config;
        Ok(())
    }

    pub fn config(&self) -> SolverConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Compute the one swap minimizing leftover after providing the bundle
    /// as liquidity into `range` on `pool`.
    pub async fn solve(
        &self,
        pool: Address,
        bundle: TokenBundle,
        range: TickRange,
    ) -> Result<RebalancePlan> {
        Ok(self.solve_report(pool, bundle, range).await?.plan)
    }

    /// Like [`solve`](Self::solve), with iteration diagnostics.
    pub async fn solve_report(
        &self,
        pool: Address,
        bundle: TokenBundle,
        range: TickRange,
    ) -> Result<SolveReport> {
        let cfg = self.config();
        cfg.validate()?;

        if pool.is_zero() || bundle.token_a.is_zero() || bundle.token_b.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if !self.registry.is_allowlisted(pool).await? {
            return Err(EngineError::PoolNotAllowlisted(pool));
        }

        let snapshot = self.snapshot(pool, range).await?;

        // The pool must touch the canonical pricing graph.
        let connectors = self.connectors.connector_set().await?;
        if !connectors.contains(snapshot.token0) && !connectors.contains(snapshot.token1) {
            return Err(EngineError::UnsupportedPool(pool));
        }

        // The pool's native token ordering is authoritative: accept the
        // caller's pair in either order, run all math in native order and
        // report in native order.
        let (amount0, amount1) = if (bundle.token_a, bundle.token_b)
            == (snapshot.token0, snapshot.token1)
        {
            (bundle.amount_a, bundle.amount_b)
        } else if (bundle.token_a, bundle.token_b) == (snapshot.token1, snapshot.token0) {
            (bundle.amount_b, bundle.amount_a)
        } else {
            return Err(EngineError::TokenMismatch {
                pool,
                token_a: bundle.token_a,
                token_b: bundle.token_b,
            });
        };

        // Below the range the position consumes only token0, above it only
        // token1: the other balance is converted outright.
        if snapshot.sqrt_price_x96 <= snapshot.sqrt_lower_x96 {
            return Ok(SolveReport {
                plan: RebalancePlan {
                    amount0_for_1: U256::ZERO,
                    amount1_for_0: amount1,
                },
                iterations: 0,
                direction_flips: 0,
                converged: true,
            });
        }
        if snapshot.sqrt_price_x96 >= snapshot.sqrt_upper_x96 {
            return Ok(SolveReport {
                plan: RebalancePlan {
                    amount0_for_1: amount0,
                    amount1_for_0: U256::ZERO,
                },
                iterations: 0,
                direction_flips: 0,
                converged: true,
            });
        }

        self.iterate(&cfg, &snapshot, amount0, amount1).await
    }

    async fn snapshot(&self, pool: Address, range: TickRange) -> Result<PoolSnapshot> {
        let (token0, token1) = self.pools.tokens(pool).await?;
        let fee_pips = self.pools.fee(pool).await?;
        let tick_spacing = self.pools.tick_spacing(pool).await?;
        range.validate(tick_spacing)?;
        let slot0 = self.pools.slot0(pool).await?;
        let liquidity = self.pools.liquidity(pool).await?;
        Ok(PoolSnapshot {
            pool,
            token0,
            token1,
            fee_pips,
            tick_spacing,
            sqrt_price_x96: slot0.sqrt_price_x96,
            tick: slot0.tick,
            liquidity,
            sqrt_lower_x96: get_sqrt_ratio_at_tick(range.lower)?,
            sqrt_upper_x96: get_sqrt_ratio_at_tick(range.upper)?,
        })
    }

    async fn iterate(
        &self,
        cfg: &SolverConfig,
        snapshot: &PoolSnapshot,
        amount0: U256,
        amount1: U256,
    ) -> Result<SolveReport> {
        let factory = self.pools.factory(snapshot.pool).await?;
        let pool_liquidity = U256::from(snapshot.liquidity);

        let mut state = IterState {
            amount0,
            amount1,
            sqrt_price_x96: snapshot.sqrt_price_x96,
        };
        let mut total = U256::ZERO;
        let mut total_direction: Option<SwapDirection> = None;
        let mut flips = 0u32;
        let mut converged = false;
        let mut iterations = 0u32;

        for iteration in 0..cfg.max_iterations {
            iterations = iteration + 1;
            let p = state
                .sqrt_price_x96
                .clamp(snapshot.sqrt_lower_x96, snapshot.sqrt_upper_x96);

            // Capacity of each side per unit of range liquidity, and the
            // liquidity level the whole bundle could ideally fund.
            let (cap0, cap1) =
                unit_capacities(p, snapshot.sqrt_lower_x96, snapshot.sqrt_upper_x96)?;
            let bundle_value1 = state.amount1.saturating_add(value0_in_token1(state.amount0, p)?);
            let cap_value1 = cap1.saturating_add(value0_in_token1(cap0, p)?);
            if cap_value1.is_zero() || bundle_value1.is_zero() {
                converged = true;
                break;
            }
            let ideal_liquidity = mul_div(bundle_value1, Q96, cap_value1)?;
            let target0 = mul_div(ideal_liquidity, cap0, Q96)?;
            let target1 = mul_div(ideal_liquidity, cap1, Q96)?;

            // Raw Newton step: the gap between held and target balance.
            let (direction, raw_step, step_value1) = if state.amount1 > target1 {
                let step = state.amount1 - target1;
                (SwapDirection::Token1ToToken0, step, step)
            } else {
                let step = state.amount0.saturating_sub(target0);
                (
                    SwapDirection::Token0ToToken1,
                    step,
                    value0_in_token1(step, p)?,
                )
            };
            if raw_step.is_zero() {
                converged = true;
                break;
            }

            let relative_floor = mul_div(
                bundle_value1,
                U256::from(cfg.early_stop_bps),
                U256::from(100_000u32),
            )?;
            if step_value1 <= relative_floor {
                match &self.valuer {
                    None => {
                        converged = true;
                        break;
                    }
                    Some(valuer) => {
                        let step_quote = valuer
                            .value_in_quote(factory, snapshot.token1, step_value1)
                            .await?;
                        if step_quote <= cfg.dust_floor_quote {
                            converged = true;
                            break;
                        }
                    }
                }
            }

            // Newton-derivative damping: the trade itself shifts the pool's
            // liquidity-weighted price, so scale the step by
            // poolL / (poolL + idealL).
            let damped = mul_div(
                raw_step,
                pool_liquidity,
                pool_liquidity.saturating_add(ideal_liquidity),
            )?;
            if damped.is_zero() {
                converged = true;
                break;
            }

            let outcome = simulate_step(
                state.sqrt_price_x96,
                snapshot.liquidity,
                damped,
                direction,
                snapshot.fee_pips,
                snapshot.sqrt_lower_x96,
                snapshot.sqrt_upper_x96,
            )?;
            if outcome.consumed.is_zero() {
                converged = true;
                break;
            }

            match direction {
                SwapDirection::Token0ToToken1 => {
                    state.amount0 = state.amount0.saturating_sub(outcome.consumed);
                    state.amount1 = state.amount1.saturating_add(outcome.amount_out);
                }
                SwapDirection::Token1ToToken0 => {
                    state.amount1 = state.amount1.saturating_sub(outcome.consumed);
                    state.amount0 = state.amount0.saturating_add(outcome.amount_out);
                }
            }
            state.sqrt_price_x96 = outcome.next_sqrt_price_x96;

            match total_direction {
                None => {
                    total_direction = Some(direction);
                    total = outcome.consumed;
                }
                Some(running) if running == direction => {
                    total = total.saturating_add(outcome.consumed);
                }
                Some(_) => {
                    // Sign flip: an artifact of stepping past the
                    // equalization point at a liquidity cliff. Shock
                    // absorber: shrink the running total by half the
                    // smaller of the two, valued in its token.
                    flips += 1;
                    let reverse_in_running_units = match direction {
                        SwapDirection::Token0ToToken1 => value0_in_token1(outcome.consumed, p)?,
                        SwapDirection::Token1ToToken0 => value1_in_token0(outcome.consumed, p)?,
                    };
                    let adjust = reverse_in_running_units.min(total) / U256::from(2u8);
                    total = total.saturating_sub(adjust);
                }
            }

            debug!(
                iteration,
                ?direction,
                raw_step = %raw_step,
                damped = %damped,
                consumed = %outcome.consumed,
                boundary_hit = outcome.boundary_hit,
                "[SOLVER] step"
            );
        }

        // Rounding guard: never plan to sell more than was supplied.
        let plan = match total_direction {
            None => RebalancePlan::default(),
            Some(SwapDirection::Token0ToToken1) => RebalancePlan {
                amount0_for_1: total.min(amount0),
                amount1_for_0: U256::ZERO,
            },
            Some(SwapDirection::Token1ToToken0) => RebalancePlan {
                amount0_for_1: U256::ZERO,
                amount1_for_0: total.min(amount1),
            },
        };
        Ok(SolveReport {
            plan,
            iterations,
            direction_flips: flips,
            converged,
        })
    }
}
