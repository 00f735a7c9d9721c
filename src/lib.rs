//! Core engine for managing concentrated-liquidity positions across
//! multiple AMM-style exchanges, with canonical accounting in a stable
//! quote currency.
//!
//! Two subsystems: a TWAP-depth-scored routing/valuation cache
//! ([`router::RouteCache`]) and a damped Newton-Raphson rebalance solver
//! ([`solver::RebalanceSolver`]). Everything else (custody, allowlist
//! administration, orchestration) lives with external collaborators behind
//! the traits in [`pool`], [`exchange`] and [`registry`].

pub mod config;
pub mod errors;
pub mod exchange;
pub mod models;
pub mod pool;
pub mod registry;
pub mod router;
pub mod solver;
pub mod utils;

#[cfg(test)]
pub(crate) mod testkit;

pub use config::{RouterConfig, SolverConfig};
pub use errors::{EngineError, Result};
pub use models::{
    ConnectorSet, EdgeKey, PoolEdge, RebalancePlan, Route, TickRange, Tier, TierSet, TokenBundle,
};
pub use router::{QuoteValuer, RefreshReport, RouteCache, SkipReason, SkippedCandidate};
pub use solver::{RebalanceSolver, SolveReport};
