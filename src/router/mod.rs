//! Routing/valuation cache.
//!
//! Per exchange context the cache holds, for every (token, connector) pair,
//! the single best pool by time-weighted depth score. It serves valuation
//! queries (token amount → quote-currency value) and route lookups, both
//! strictly TWAP-priced with no spot fallback.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use alloy_primitives::U256;
use async_trait::async_trait;
use ethers::types::Address;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::errors::{EngineError, Result};
use crate::exchange::ExchangeAdapter;
use crate::models::{ConnectorSet, EdgeKey, PoolEdge, Route};
use crate::pool::{PoolReader, twap};
use crate::registry::{ConnectorProvider, PoolRegistry};

pub mod scoring;

pub use scoring::{RefreshReport, SkipReason, SkippedCandidate};

use scoring::{AnchorEdge, ScoredCandidate, score_candidate};

/// Valuation seam consumed by the rebalance solver for its dust floor.
#[async_trait]
pub trait QuoteValuer: Send + Sync {
    /// Value `amount` of `token` in raw quote-currency units within the
    /// given exchange context.
    async fn value_in_quote(&self, factory: Address, token: Address, amount: U256) -> Result<U256>;
}

/// The routing/valuation cache. The only mutating entry point is
/// [`RouteCache::refresh`]; hosts are expected to serialize refresh runs.
pub struct RouteCache<P, R, C> {
    pools: P,
    registry: R,
    connectors: C,
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    config: RwLock<RouterConfig>,
    edges: RwLock<HashMap<EdgeKey, PoolEdge>>,
}

impl<P, R, C> RouteCache<P, R, C>
where
    P: PoolReader,
    R: PoolRegistry,
    C: ConnectorProvider,
{
    pub fn new(
        pools: P,
        registry: R,
        connectors: C,
        adapters: Vec<Arc<dyn ExchangeAdapter>>,
        config: RouterConfig,
    ) -> Result<Self> {
        config.validate()?;
        if adapters.is_empty() {
            return Err(EngineError::Config(
                "at least one exchange adapter is required".into(),
            ));
        }
        Ok(Self {
            pools,
            registry,
            connectors,
            adapters,
            config: RwLock::new(config),
            edges: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the tunable parameters; readers see the new values on their
    /// next call.
    pub fn set_config(&self, config: RouterConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().expect("config lock poisoned") = config;
        Ok(())
    }

    pub fn config(&self) -> RouterConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Current cached edge for `(factory, token, connector)`, if any.
    /// Absence means "unknown", never zero.
    pub fn edge(&self, factory: Address, token: Address, connector: Address) -> Option<PoolEdge> {
        self.edges
            .read()
            .expect("edge lock poisoned")
            .get(&EdgeKey {
                factory,
                token,
                connector,
            })
            .copied()
    }

    /// An edge usable as one hop between `a` and `b`, regardless of which
    /// side is the connector (anchor edges are keyed bridge→quote).
    fn hop_edge(&self, factory: Address, a: Address, b: Address) -> Option<PoolEdge> {
        self.edge(factory, a, b).or_else(|| self.edge(factory, b, a))
    }

    /// Snapshot of the full edge map (diagnostics and tests).
    pub fn edges_snapshot(&self) -> HashMap<EdgeKey, PoolEdge> {
        self.edges.read().expect("edge lock poisoned").clone()
    }

    /// Rebuild the edge cache from the externally allowlisted pool set.
    ///
    /// Best-effort batch operation: each candidate is evaluated
    /// independently and one candidate's failure never aborts the others.
    /// The edge map is replaced wholesale at the end.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let cfg = self.config();
        cfg.validate()?;
        let connectors = self.connectors.connector_set().await?;
        let quote = connectors.quote();

        let mut report = RefreshReport::default();

        // Group tracked pools by exchange context and collect the
        // non-connector tokens appearing in each. The per-pool metadata
        // reads are independent, so fetch them concurrently.
        let tracked = self.registry.tracked_pools().await?;
        let metadata = join_all(tracked.iter().map(|&pool| async move {
            let factory = self.pools.factory(pool).await?;
            let tokens = self.pools.tokens(pool).await?;
            Ok::<_, EngineError>((factory, tokens))
        }))
        .await;

        let mut context_tokens: HashMap<Address, BTreeSet<Address>> = HashMap::new();
        for (pool, meta) in tracked.into_iter().zip(metadata) {
            let (factory, (token0, token1)) = match meta {
                Ok(meta) => meta,
                Err(e) => {
                    report.skipped.push(SkippedCandidate {
                        pool,
                        token: Address::zero(),
                        connector: Address::zero(),
                        reason: SkipReason::PoolRead(e.to_string()),
                    });
                    continue;
                }
            };
            if !self.adapters.iter().any(|a| a.factory() == factory) {
                report.skipped.push(SkippedCandidate {
                    pool,
                    token: Address::zero(),
                    connector: Address::zero(),
                    reason: SkipReason::UnknownFactory(factory),
                });
                continue;
            }
            let entry = context_tokens.entry(factory).or_default();
            for token in [token0, token1] {
                if !connectors.contains(token) {
                    entry.insert(token);
                }
            }
        }
        report.contexts = context_tokens.len();

        let mut new_edges: HashMap<EdgeKey, PoolEdge> = HashMap::new();
        for adapter in &self.adapters {
            let factory = adapter.factory();

            // Anchor edges first: each bridge connector needs a path to the
            // quote before any depth on its side can be denominated.
            let mut anchors: HashMap<Address, AnchorEdge> = HashMap::new();
            for bridge in connectors.bridges() {
                if let Some(best) = self
                    .best_candidate(adapter.as_ref(), &cfg, *bridge, quote, quote, None, &mut report)
                    .await?
                {
                    new_edges.insert(
                        EdgeKey {
                            factory,
                            token: *bridge,
                            connector: quote,
                        },
                        PoolEdge {
                            pool: best.pool,
                            score: best.score,
                        },
                    );
                    anchors.insert(
                        *bridge,
                        AnchorEdge {
                            pool: best.pool,
                            mean_tick: best.mean_tick,
                            connector_is_token0: best.token_is_token0,
                        },
                    );
                }
            }

            let Some(tokens) = context_tokens.get(&factory) else {
                continue;
            };
            for token in tokens {
                for connector in connectors.iter() {
                    let anchor = if connector == quote {
                        None
                    } else {
                        // A bridge without its own anchor disqualifies only
                        // the pairs that need it, inside score_candidate.
                        anchors.get(&connector).copied()
                    };
                    if let Some(best) = self
                        .best_candidate(
                            adapter.as_ref(),
                            &cfg,
                            *token,
                            connector,
                            quote,
                            anchor.as_ref(),
                            &mut report,
                        )
                        .await?
                    {
                        new_edges.insert(
                            EdgeKey {
                                factory,
                                token: *token,
                                connector,
                            },
                            PoolEdge {
                                pool: best.pool,
                                score: best.score,
                            },
                        );
                    }
                }
            }
        }

        report.edges_written = new_edges.len();
        *self.edges.write().expect("edge lock poisoned") = new_edges;
        info!(
            contexts = report.contexts,
            edges = report.edges_written,
            skipped = report.skipped.len(),
            "[REFRESH] route cache rebuilt"
        );
        Ok(report)
    }

    /// Enumerate this context's candidate pools for `(token, connector)` and
    /// keep the highest-scoring one.
    async fn best_candidate(
        &self,
        adapter: &dyn ExchangeAdapter,
        cfg: &RouterConfig,
        token: Address,
        connector: Address,
        quote: Address,
        anchor: Option<&AnchorEdge>,
        report: &mut RefreshReport,
    ) -> Result<Option<ScoredCandidate>> {
        let mut best: Option<ScoredCandidate> = None;
        for tier in adapter.tier_set().tiers() {
            let pool = match adapter.pool_for(token, connector, tier).await {
                Ok(Some(pool)) => pool,
                Ok(None) => continue,
                Err(e) => {
                    report.skipped.push(SkippedCandidate {
                        pool: Address::zero(),
                        token,
                        connector,
                        reason: SkipReason::PoolRead(e.to_string()),
                    });
                    continue;
                }
            };
            // Only externally allowlisted pools qualify as candidates.
            if !self.registry.is_allowlisted(pool).await? {
                continue;
            }
            match score_candidate(&self.pools, cfg, pool, token, connector, quote, anchor).await {
                Ok(candidate) => {
                    if best.is_none_or(|b| candidate.score > b.score) {
                        best = Some(candidate);
                    }
                }
                Err(reason) => {
                    debug!(?pool, ?token, ?connector, ?reason, "[REFRESH] candidate skipped");
                    report.skipped.push(SkippedCandidate {
                        pool,
                        token,
                        connector,
                        reason,
                    });
                }
            }
        }
        Ok(best)
    }

    /// Value `amount` of `token` in quote units. Identity for the quote
    /// itself; otherwise TWAP conversion applied sequentially along the best
    /// route. No route means a hard failure, never a spot fallback.
    pub async fn value(&self, factory: Address, token: Address, amount: U256) -> Result<U256> {
        if token.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        let connectors = self.connectors.connector_set().await?;
        let quote = connectors.quote();
        if token == quote {
            return Ok(amount);
        }
        let cfg = self.config();
        let route = self.best_route_inner(factory, token, quote, &connectors).await?;

        let mut current_token = token;
        let mut current_amount = amount;
        for pool in route.pools() {
            let (next_token, next_amount) = self
                .convert_via(pool, current_token, current_amount, &cfg)
                .await?;
            current_token = next_token;
            current_amount = next_amount;
        }
        // A legitimately tiny input may value to zero here.
        Ok(current_amount)
    }

    /// Best currently cached route between two tokens, re-validated against
    /// the allowlist at call time.
    pub async fn best_route(
        &self,
        factory: Address,
        token_in: Address,
        token_out: Address,
    ) -> Result<Route> {
        let connectors = self.connectors.connector_set().await?;
        self.best_route_inner(factory, token_in, token_out, &connectors)
            .await
    }

    async fn best_route_inner(
        &self,
        factory: Address,
        token_in: Address,
        token_out: Address,
        connectors: &ConnectorSet,
    ) -> Result<Route> {
        if token_in.is_zero() || token_out.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        if token_in == token_out {
            return Err(EngineError::Other(
                "route endpoints must be distinct tokens".into(),
            ));
        }

        // Direct hop when either endpoint is a connector.
        let direct = if connectors.contains(token_in) || connectors.contains(token_out) {
            self.hop_edge(factory, token_in, token_out)
        } else {
            None
        };
        if let Some(edge) = direct {
            if self.registry.is_allowlisted(edge.pool).await? {
                return Ok(Route::Direct(edge));
            }
            warn!(pool = ?edge.pool, "[ROUTE] cached direct edge no longer allowlisted");
        }

        // Otherwise the best two-hop path through exactly one connector.
        let mut candidates: Vec<Route> = Vec::new();
        for connector in connectors.iter() {
            if connector == token_in || connector == token_out {
                continue;
            }
            let (Some(first), Some(second)) = (
                self.hop_edge(factory, token_in, connector),
                self.hop_edge(factory, token_out, connector),
            ) else {
                continue;
            };
            candidates.push(Route::ViaConnector {
                connector,
                first,
                second,
            });
        }
        candidates.sort_by(|a, b| b.score().cmp(&a.score()));

        for route in candidates {
            let mut valid = true;
            for pool in route.pools() {
                if !self.registry.is_allowlisted(pool).await? {
                    warn!(?pool, "[ROUTE] cached edge no longer allowlisted");
                    valid = false;
                    break;
                }
            }
            if valid {
                return Ok(route);
            }
        }
        Err(EngineError::RouteNotFound { token_in, token_out })
    }

    /// Convert an amount across one pool at its current TWAP price.
    async fn convert_via(
        &self,
        pool: Address,
        token_in: Address,
        amount: U256,
        cfg: &RouterConfig,
    ) -> Result<(Address, U256)> {
        let (token0, token1) = self.pools.tokens(pool).await?;
        let base_is_token0 = if token_in == token0 {
            true
        } else if token_in == token1 {
            false
        } else {
            return Err(EngineError::Other(format!(
                "pool {pool:?} does not hold hop token {token_in:?}"
            )));
        };
        let obs = self.pools.observe(pool, cfg.twap_window_secs).await?;
        let tick = twap::mean_tick(&obs, cfg.twap_window_secs)?;
        let out = twap::quote_at_tick(tick, amount, base_is_token0)?;
        Ok((if base_is_token0 { token1 } else { token0 }, out))
    }
}

#[async_trait]
impl<P, R, C> QuoteValuer for RouteCache<P, R, C>
where
    P: PoolReader,
    R: PoolRegistry,
    C: ConnectorProvider,
{
    async fn value_in_quote(&self, factory: Address, token: Address, amount: U256) -> Result<U256> {
        self.value(factory, token, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Tier, TierSet};
    use crate::registry::{StaticConnectors, StaticRegistry};
    use crate::router::scoring::score_candidate;
    use crate::testkit::{MockExchangeAdapter, MockPool, MockPoolReader, addr};

    const ONE: u64 = 1_000_000_000_000_000_000;

    fn factory() -> Address {
        addr(200)
    }
    fn quote() -> Address {
        addr(100)
    }
    fn bridge() -> Address {
        addr(101)
    }
    fn token() -> Address {
        addr(1)
    }

    struct World {
        pools: MockPoolReader,
        registry: Arc<StaticRegistry>,
        cache: RouteCache<MockPoolReader, Arc<StaticRegistry>, StaticConnectors>,
    }

    /// Pools: 10/11 = token/quote at fee 500/3000 (3000 deeper),
    /// 12 = quote/bridge anchor, 13 = token/bridge.
    fn world(pool_ids: &[u64]) -> World {
        let pools = MockPoolReader::default();
        let adapter = Arc::new(MockExchangeAdapter::new(
            factory(),
            TierSet::FeeTiered(vec![500, 3000]),
        ));
        for id in pool_ids {
            let (pool, tier_fee) = match id {
                10 => (
                    MockPool::balanced(factory(), token(), quote(), 500, ONE as u128),
                    500,
                ),
                11 => (
                    MockPool::balanced(factory(), token(), quote(), 3000, 2 * ONE as u128),
                    3000,
                ),
                12 => (
                    MockPool::balanced(factory(), quote(), bridge(), 500, ONE as u128),
                    500,
                ),
                13 => (
                    MockPool::balanced(factory(), token(), bridge(), 500, ONE as u128),
                    500,
                ),
                other => panic!("unknown fixture pool {other}"),
            };
            adapter.register(pool.token0, pool.token1, Tier::Fee(tier_fee), addr(*id));
            pools.insert(addr(*id), pool);
        }
        let registry = Arc::new(StaticRegistry::new(pool_ids.iter().map(|id| addr(*id))));
        let connectors = StaticConnectors::new(
            ConnectorSet::new(quote(), vec![bridge()]).expect("valid connector set"),
        );
        let cache = RouteCache::new(
            pools.clone(),
            registry.clone(),
            connectors,
            vec![adapter],
            RouterConfig::default(),
        )
        .expect("valid cache");
        World {
            pools,
            registry,
            cache,
        }
    }

    #[tokio::test]
    async fn refresh_builds_expected_edges() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        let report = w.cache.refresh().await?;
        assert_eq!(report.contexts, 1);
        assert_eq!(report.edges_written, 3);
        assert!(report.skipped.is_empty());

        assert_eq!(w.cache.edge(factory(), token(), quote()).unwrap().pool, addr(11));
        assert_eq!(w.cache.edge(factory(), bridge(), quote()).unwrap().pool, addr(12));
        assert_eq!(w.cache.edge(factory(), token(), bridge()).unwrap().pool, addr(13));
        // Edges never connect two non-connector tokens.
        assert!(w.cache.edge(factory(), token(), token()).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn deeper_liquidity_scores_higher() -> anyhow::Result<()> {
        let w = world(&[10, 11]);
        let cfg = w.cache.config();
        let shallow = score_candidate(&w.pools, &cfg, addr(10), token(), quote(), quote(), None)
            .await
            .expect("scored");
        let deep = score_candidate(&w.pools, &cfg, addr(11), token(), quote(), quote(), None)
            .await
            .expect("scored");
        assert!(deep.score >= shallow.score);

        w.cache.refresh().await?;
        assert_eq!(w.cache.edge(factory(), token(), quote()).unwrap().pool, addr(11));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_is_idempotent() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        let first = w.cache.refresh().await?;
        let snapshot_one = w.cache.edges_snapshot();
        let second = w.cache.refresh().await?;
        let snapshot_two = w.cache.edges_snapshot();
        assert_eq!(first.edges_written, second.edges_written);
        assert_eq!(snapshot_one, snapshot_two);
        Ok(())
    }

    #[tokio::test]
    async fn quote_values_to_itself() -> anyhow::Result<()> {
        let w = world(&[10]);
        // Identity holds with or without a refresh.
        let amount = U256::from(123_456u64);
        assert_eq!(w.cache.value(factory(), quote(), amount).await?, amount);
        Ok(())
    }

    #[tokio::test]
    async fn value_along_direct_route_at_par() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        w.cache.refresh().await?;
        // All fixture pools sit at tick 0, so conversion is exact 1:1.
        let amount = U256::from(ONE);
        assert_eq!(w.cache.value(factory(), token(), amount).await?, amount);
        assert_eq!(w.cache.value(factory(), bridge(), amount).await?, amount);
        Ok(())
    }

    #[tokio::test]
    async fn value_via_two_hops_chains_twap_prices() -> anyhow::Result<()> {
        // No direct token/quote pool: route goes token→bridge→quote.
        let w = world(&[12, 13]);
        // 1.0001^6932 ~= 2: one token is worth ~2 bridge units.
        w.pools.update(addr(13), |p| p.twap_tick = 6932);
        w.cache.refresh().await?;

        let route = w.cache.best_route(factory(), token(), quote()).await?;
        match &route {
            Route::ViaConnector {
                connector,
                first,
                second,
            } => {
                assert_eq!(*connector, bridge());
                assert_eq!(first.pool, addr(13));
                assert_eq!(second.pool, addr(12));
                assert_eq!(route.score(), first.score.min(second.score));
            }
            other => panic!("expected two-hop route, got {other:?}"),
        }

        let valued = w.cache.value(factory(), token(), U256::from(ONE)).await?;
        let valued_f = valued.to_string().parse::<f64>().unwrap();
        assert!((valued_f - 2e18).abs() / 2e18 < 2e-3, "valued={valued_f}");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_fails_with_route_not_found() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        w.cache.refresh().await?;
        let stranger = addr(2);
        let err = w
            .cache
            .value(factory(), stranger, U256::from(ONE))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RouteNotFound { .. }));
        let err = w
            .cache
            .best_route(factory(), stranger, quote())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RouteNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn routes_revalidate_allowlist_at_lookup() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        w.cache.refresh().await?;

        // Delisting the direct pool after refresh forces the two-hop path.
        w.registry.remove(addr(11));
        let route = w.cache.best_route(factory(), token(), quote()).await?;
        assert!(matches!(route, Route::ViaConnector { .. }));

        // Delisting the first hop as well leaves nothing.
        w.registry.remove(addr(13));
        let err = w
            .cache
            .best_route(factory(), token(), quote())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RouteNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn candidate_failures_are_isolated() -> anyhow::Result<()> {
        let w = world(&[10, 11, 12, 13]);
        w.pools.update(addr(10), |p| p.fail_observation = true);
        let report = w.cache.refresh().await?;

        assert!(report.skipped.iter().any(|s| s.pool == addr(10)
            && matches!(s.reason, SkipReason::Observation(_))));
        // The failing candidate did not stop its pair from resolving.
        assert_eq!(w.cache.edge(factory(), token(), quote()).unwrap().pool, addr(11));
        Ok(())
    }

    #[tokio::test]
    async fn missing_anchor_disqualifies_only_dependent_pairs() -> anyhow::Result<()> {
        // No bridge/quote pool: the bridge has no anchor.
        let w = world(&[10, 11, 13]);
        let report = w.cache.refresh().await?;

        assert!(w.cache.edge(factory(), token(), quote()).is_some());
        assert!(w.cache.edge(factory(), token(), bridge()).is_none());
        assert!(report.skipped.iter().any(|s| {
            s.pool == addr(13) && s.reason == SkipReason::MissingAnchor(bridge())
        }));
        Ok(())
    }
}
