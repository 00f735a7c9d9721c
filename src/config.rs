//! Owner-tunable engine parameters.
//!
//! Each subsystem owns its config behind an `RwLock`: an admin can mutate
//! settings at runtime and every subsequent read sees the current value.

use alloy_primitives::U256;

use crate::errors::{EngineError, Result};

/// Settings for the routing/valuation cache.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// TWAP lookback window in seconds.
    pub twap_window_secs: u32,
    /// Half-width of the depth-scoring band around the mean tick, in ticks.
    pub band_halfwidth_ticks: i32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            twap_window_secs: 60,
            band_halfwidth_ticks: 50,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.twap_window_secs == 0 {
            return Err(EngineError::Config(
                "twap_window_secs must be non-zero".into(),
            ));
        }
        if self.band_halfwidth_ticks <= 0 {
            return Err(EngineError::Config(
                "band_halfwidth_ticks must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for the rebalance solver.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Hard cap on Newton iterations.
    pub max_iterations: u32,
    /// Relative early-stop threshold, in units of 1/100_000 of portfolio
    /// value (1 = 0.001%).
    pub early_stop_bps: u32,
    /// Absolute early-stop floor in raw quote-currency units
    /// (e.g. 1_000 = $0.001 for a 6-decimal quote). Only applied when the
    /// solver was built with a valuer.
    pub dust_floor_quote: U256,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 16,
            early_stop_bps: 1,
            dust_floor_quote: U256::from(1_000u64),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(EngineError::Config("max_iterations must be non-zero".into()));
        }
        if self.early_stop_bps == 0 || self.early_stop_bps > 100_000 {
            return Err(EngineError::Config(
                "early_stop_bps must be in 1..=100_000".into(),
            ));
        }
        Ok(())
    }
}
