//! RPC-backed pool reads via `abigen` bindings.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    providers::{Http, Provider},
    types::Address,
};

use crate::errors::{EngineError, Result};
use crate::models::{Observation, Slot0};
use crate::pool::PoolReader;
use crate::utils::to_alloy_u256;

abigen!(
    ConcentratedPool,
    r"[
        function factory() view returns (address)
        function token0() view returns (address)
        function token1() view returns (address)
        function fee() view returns (uint24)
        function tickSpacing() view returns (int24)
        function slot0() view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked)
        function liquidity() view returns (uint128)
        function observe(uint32[] secondsAgos) view returns (int56[] tickCumulatives, uint160[] secondsPerLiquidityCumulativeX128s)
    ]",
);

/// [`PoolReader`] over an Ethereum-compatible JSON-RPC node.
#[derive(Clone)]
pub struct RpcPoolReader {
    provider: Arc<Provider<Http>>,
}

impl RpcPoolReader {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| EngineError::Config(format!("invalid rpc url: {e}")))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    pub fn from_provider(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }

    fn binding(&self, pool: Address) -> ConcentratedPool<Provider<Http>> {
        ConcentratedPool::new(pool, self.provider.clone())
    }
}

#[async_trait]
impl PoolReader for RpcPoolReader {
    async fn factory(&self, pool: Address) -> Result<Address> {
        Ok(self.binding(pool).factory().call().await?)
    }

    async fn tokens(&self, pool: Address) -> Result<(Address, Address)> {
        let binding = self.binding(pool);
        let token0 = binding.token_0().call().await?;
        let token1 = binding.token_1().call().await?;
        Ok((token0, token1))
    }

    async fn fee(&self, pool: Address) -> Result<u32> {
        Ok(self.binding(pool).fee().call().await?)
    }

    async fn tick_spacing(&self, pool: Address) -> Result<i32> {
        Ok(self.binding(pool).tick_spacing().call().await?)
    }

    async fn slot0(&self, pool: Address) -> Result<Slot0> {
        let (sqrt_price_x96, tick, _, _, _, _, _) = self.binding(pool).slot_0().call().await?;
        Ok(Slot0 {
            sqrt_price_x96: to_alloy_u256(sqrt_price_x96),
            tick,
        })
    }

    async fn liquidity(&self, pool: Address) -> Result<u128> {
        Ok(self.binding(pool).liquidity().call().await?)
    }

    async fn observe(&self, pool: Address, window_secs: u32) -> Result<Observation> {
        let (tick_cumulatives, spl_cumulatives) = self
            .binding(pool)
            .observe(vec![window_secs, 0])
            .call()
            .await
            .map_err(|e| EngineError::Observation {
                pool,
                reason: e.to_string(),
            })?;
        if tick_cumulatives.len() != 2 || spl_cumulatives.len() != 2 {
            return Err(EngineError::Observation {
                pool,
                reason: format!(
                    "expected 2 observations, got {}/{}",
                    tick_cumulatives.len(),
                    spl_cumulatives.len()
                ),
            });
        }
        Ok(Observation {
            tick_cumulatives: [tick_cumulatives[0], tick_cumulatives[1]],
            seconds_per_liquidity_x128: [
                to_alloy_u256(spl_cumulatives[0]),
                to_alloy_u256(spl_cumulatives[1]),
            ],
        })
    }
}
