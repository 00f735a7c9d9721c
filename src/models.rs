//! Shared data structures for the routing cache and the rebalance solver.

use alloy_primitives::U256;
use ethers::types::Address;
use serde::Serialize;

use crate::errors::{EngineError, Result};

/// Maximum number of bridge tokens next to the quote currency.
pub const MAX_BRIDGE_CONNECTORS: usize = 3;

/// Tier enumeration variant of an exchange family.
///
/// Uniswap-style factories key pools by fee tier; Slipstream-style factories
/// key them by tick spacing. One scoring routine serves both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierSet {
    FeeTiered(Vec<u32>),
    SpacingTiered(Vec<i32>),
}

/// A single tier within a [`TierSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fee(u32),
    Spacing(i32),
}

impl TierSet {
    /// Iterate the tiers of this family as uniform [`Tier`] values.
    pub fn tiers(&self) -> Vec<Tier> {
        match self {
            TierSet::FeeTiered(fees) => fees.iter().copied().map(Tier::Fee).collect(),
            TierSet::SpacingTiered(spacings) => {
                spacings.iter().copied().map(Tier::Spacing).collect()
            }
        }
    }
}

/// Quote currency plus up to three approved bridge tokens.
///
/// Owned by an external collaborator; membership is fixed for the duration
/// of a single refresh or query call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSet {
    quote: Address,
    bridges: Vec<Address>,
}

impl ConnectorSet {
    pub fn new(quote: Address, bridges: Vec<Address>) -> Result<Self> {
        if quote.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if bridges.len() > MAX_BRIDGE_CONNECTORS {
            return Err(EngineError::Config(format!(
                "at most {MAX_BRIDGE_CONNECTORS} bridge connectors allowed, got {}",
                bridges.len()
            )));
        }
        for (i, b) in bridges.iter().enumerate() {
            if b.is_zero() {
                return Err(EngineError::ZeroAddress);
            }
            if *b == quote || bridges[..i].contains(b) {
                return Err(EngineError::Config(format!(
                    "duplicate connector {b:?} in connector set"
                )));
            }
        }
        Ok(Self { quote, bridges })
    }

    pub fn quote(&self) -> Address {
        self.quote
    }

    pub fn bridges(&self) -> &[Address] {
        &self.bridges
    }

    pub fn contains(&self, token: Address) -> bool {
        token == self.quote || self.bridges.contains(&token)
    }

    /// All connectors, quote first.
    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        std::iter::once(self.quote).chain(self.bridges.iter().copied())
    }
}

/// Cache key of one routing edge: a non-connector token (or a bridge, for
/// anchor edges) paired with a connector within one exchange context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub factory: Address,
    pub token: Address,
    pub connector: Address,
}

/// The best pool found for an [`EdgeKey`], with its bottleneck depth score
/// in raw quote-currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolEdge {
    pub pool: Address,
    pub score: U256,
}

/// Result of a route lookup: one direct hop, or two hops through exactly one
/// connector. Paths longer than two hops are never constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Route {
    Direct(PoolEdge),
    ViaConnector {
        connector: Address,
        first: PoolEdge,
        second: PoolEdge,
    },
}

impl Route {
    /// Aggregate bottleneck score: the minimum of the hop scores.
    pub fn score(&self) -> U256 {
        match self {
            Route::Direct(edge) => edge.score,
            Route::ViaConnector { first, second, .. } => first.score.min(second.score),
        }
    }

    pub fn pools(&self) -> Vec<Address> {
        match self {
            Route::Direct(edge) => vec![edge.pool],
            Route::ViaConnector { first, second, .. } => vec![first.pool, second.pool],
        }
    }
}

/// Current pool-level observation: sqrt price and tick from the pool's slot0.
#[derive(Debug, Clone, Copy)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
}

/// Raw cumulative oracle readings at `[window ago, now]`.
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub tick_cumulatives: [i64; 2],
    pub seconds_per_liquidity_x128: [U256; 2],
}

/// Live snapshot of the target pool for one solver invocation, in the pool's
/// native token order. Read fresh on every call; never cached.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_pips: u32,
    pub tick_spacing: i32,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
    pub sqrt_lower_x96: U256,
    pub sqrt_upper_x96: U256,
}

/// Target tick range for a liquidity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    /// Validate ordering, spacing alignment and global tick bounds.
    pub fn validate(&self, spacing: i32) -> Result<()> {
        let valid = spacing > 0
            && self.lower < self.upper
            && self.lower % spacing == 0
            && self.upper % spacing == 0
            && self.lower >= uniswap_v3_math::tick_math::MIN_TICK
            && self.upper <= uniswap_v3_math::tick_math::MAX_TICK;
        if valid {
            Ok(())
        } else {
            Err(EngineError::InvalidTickRange {
                lower: self.lower,
                upper: self.upper,
                spacing,
            })
        }
    }
}

/// Two-token bundle in the caller's token order.
#[derive(Debug, Clone, Copy)]
pub struct TokenBundle {
    pub token_a: Address,
    pub amount_a: U256,
    pub token_b: Address,
    pub amount_b: U256,
}

/// Single swap instruction produced by the solver, reported in the pool's
/// native token order. At most one direction is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebalancePlan {
    /// Amount of token0 to sell for token1.
    pub amount0_for_1: U256,
    /// Amount of token1 to sell for token0.
    pub amount1_for_0: U256,
}
