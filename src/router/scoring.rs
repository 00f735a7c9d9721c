//! Candidate-pool scoring for the routing cache.
//!
//! A candidate's score is the bottleneck of its two one-sided band depths,
//! valued in quote-currency units through TWAP prices only. Any failure
//! disqualifies the single candidate and is reported; it never aborts the
//! surrounding refresh.

use alloy_primitives::U256;
use ethers::types::Address;
use serde::Serialize;

use uniswap_v3_math::tick_math::{MAX_TICK, MIN_TICK};

use crate::config::RouterConfig;
use crate::models::Observation;
use crate::pool::{PoolReader, twap};

/// Why one candidate pool was disqualified during refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    PoolRead(String),
    Observation(String),
    MeanTickOutOfRange(i32),
    ZeroAverageLiquidity,
    MissingAnchor(Address),
    ZeroValueConversion,
    UnknownFactory(Address),
    Math(String),
}

/// One disqualified candidate, kept for the caller's diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    pub pool: Address,
    pub token: Address,
    pub connector: Address,
    pub reason: SkipReason,
}

/// Outcome of one refresh run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// Exchange contexts that contributed tracked pools.
    pub contexts: usize,
    /// Edges written into the cache.
    pub edges_written: usize,
    /// Per-candidate failures, individually isolated.
    pub skipped: Vec<SkippedCandidate>,
}

/// A successfully scored candidate, carrying the TWAP context needed to use
/// the winning pool as a conversion anchor within the same refresh pass.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate {
    pub pool: Address,
    pub score: U256,
    pub mean_tick: i32,
    pub token_is_token0: bool,
}

/// Conversion context of a bridge connector's anchor pool (connector→quote).
#[derive(Debug, Clone, Copy)]
pub struct AnchorEdge {
    pub pool: Address,
    pub mean_tick: i32,
    pub connector_is_token0: bool,
}

impl AnchorEdge {
    /// Value a connector-denominated amount in quote units via this anchor's
    /// TWAP.
    pub fn to_quote(&self, amount: U256) -> Result<U256, SkipReason> {
        twap::quote_at_tick(self.mean_tick, amount, self.connector_is_token0)
            .map_err(|e| SkipReason::Math(e.to_string()))
    }
}

/// Score one candidate pool for the `(token, connector)` edge.
///
/// `anchor` must be supplied when `connector != quote`; a missing anchor
/// disqualifies only this pair (lazy, per-evaluation).
pub async fn score_candidate<P: PoolReader>(
    pools: &P,
    cfg: &RouterConfig,
    pool: Address,
    token: Address,
    connector: Address,
    quote: Address,
    anchor: Option<&AnchorEdge>,
) -> Result<ScoredCandidate, SkipReason> {
    let (token0, token1) = pools
        .tokens(pool)
        .await
        .map_err(|e| SkipReason::PoolRead(e.to_string()))?;
    let token_is_token0 = if token == token0 && connector == token1 {
        true
    } else if token == token1 && connector == token0 {
        false
    } else {
        return Err(SkipReason::PoolRead(format!(
            "pool pair ({token0:?}, {token1:?}) does not match ({token:?}, {connector:?})"
        )));
    };

    let obs = pools
        .observe(pool, cfg.twap_window_secs)
        .await
        .map_err(|e| SkipReason::Observation(e.to_string()))?;
    let (center, avg_liquidity) = derive_twap(&obs, cfg.twap_window_secs)?;

    let (amount0, amount1) = twap::band_depths(center, cfg.band_halfwidth_ticks, avg_liquidity)
        .map_err(|e| SkipReason::Math(e.to_string()))?;
    let (token_depth, connector_depth) = if token_is_token0 {
        (amount0, amount1)
    } else {
        (amount1, amount0)
    };

    // Connector-side depth in quote units.
    let connector_value = if connector == quote {
        connector_depth
    } else {
        let anchor = anchor.ok_or(SkipReason::MissingAnchor(connector))?;
        anchor.to_quote(connector_depth)?
    };

    // Token-side depth: through this pool's TWAP, then the anchor's.
    let token_in_connector = twap::quote_at_tick(center, token_depth, token_is_token0)
        .map_err(|e| SkipReason::Math(e.to_string()))?;
    let token_value = if connector == quote {
        token_in_connector
    } else {
        let anchor = anchor.ok_or(SkipReason::MissingAnchor(connector))?;
        anchor.to_quote(token_in_connector)?
    };

    if token_value.is_zero() || connector_value.is_zero() {
        return Err(SkipReason::ZeroValueConversion);
    }

    // Bottleneck principle: a route is only as deep as its shallowest side.
    Ok(ScoredCandidate {
        pool,
        score: token_value.min(connector_value),
        mean_tick: center,
        token_is_token0,
    })
}

fn derive_twap(obs: &Observation, window_secs: u32) -> Result<(i32, u128), SkipReason> {
    let center =
        twap::mean_tick(obs, window_secs).map_err(|e| SkipReason::Observation(e.to_string()))?;
    if !(MIN_TICK..=MAX_TICK).contains(&center) {
        return Err(SkipReason::MeanTickOutOfRange(center));
    }
    let avg_liquidity = twap::harmonic_mean_liquidity(obs, window_secs)
        .map_err(|e| SkipReason::Observation(e.to_string()))?;
    if avg_liquidity == 0 {
        return Err(SkipReason::ZeroAverageLiquidity);
    }
    Ok((center, avg_liquidity))
}
