//! Exchange-context abstraction.
//!
//! One adapter per exchange family: it knows the family's factory, whether
//! pools are enumerated by fee tier or by tick spacing, and how to resolve a
//! token pair plus tier to a pool address.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Provider},
    types::Address,
};

use crate::errors::{EngineError, Result};
use crate::models::{Tier, TierSet};

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Pool-factory reference identifying this exchange context.
    fn factory(&self) -> Address;

    /// The family's enumerable tiers (fee-tiered or spacing-tiered).
    fn tier_set(&self) -> &TierSet;

    /// Resolve `(token_a, token_b, tier)` to a pool, if one was deployed.
    async fn pool_for(&self, token_a: Address, token_b: Address, tier: Tier)
    -> Result<Option<Address>>;
}

abigen!(
    FeeTieredFactory,
    r"[
        function getPool(address tokenA, address tokenB, uint24 fee) view returns (address pool)
    ]",
);

abigen!(
    SpacingTieredFactory,
    r"[
        function getPool(address tokenA, address tokenB, int24 tickSpacing) view returns (address pool)
    ]",
);

/// RPC-backed [`ExchangeAdapter`] covering both factory families.
#[derive(Clone)]
pub struct RpcExchangeAdapter {
    factory: Address,
    tiers: TierSet,
    provider: Arc<Provider<Http>>,
}

impl RpcExchangeAdapter {
    pub fn new(factory: Address, tiers: TierSet, provider: Arc<Provider<Http>>) -> Result<Self> {
        if factory.is_zero() {
            return Err(EngineError::ZeroAddress);
        }
        let empty = match &tiers {
            TierSet::FeeTiered(fees) => fees.is_empty(),
            TierSet::SpacingTiered(spacings) => spacings.is_empty(),
        };
        if empty {
            return Err(EngineError::Config(format!(
                "exchange context {factory:?} has an empty tier set"
            )));
        }
        Ok(Self {
            factory,
            tiers,
            provider,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for RpcExchangeAdapter {
    fn factory(&self) -> Address {
        self.factory
    }

    fn tier_set(&self) -> &TierSet {
        &self.tiers
    }

    async fn pool_for(
        &self,
        token_a: Address,
        token_b: Address,
        tier: Tier,
    ) -> Result<Option<Address>> {
        let pool = match (&self.tiers, tier) {
            (TierSet::FeeTiered(_), Tier::Fee(fee)) => {
                FeeTieredFactory::new(self.factory, self.provider.clone())
                    .get_pool(token_a, token_b, fee)
                    .call()
                    .await?
            }
            (TierSet::SpacingTiered(_), Tier::Spacing(spacing)) => {
                SpacingTieredFactory::new(self.factory, self.provider.clone())
                    .get_pool(token_a, token_b, spacing)
                    .call()
                    .await?
            }
            _ => {
                return Err(EngineError::Config(format!(
                    "tier {tier:?} does not match the variant of factory {:?}",
                    self.factory
                )));
            }
        };
        Ok((!pool.is_zero()).then_some(pool))
    }
}
