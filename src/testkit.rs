//! In-memory collaborators driving deterministic synthetic pools in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use async_trait::async_trait;
use ethers::types::Address;

use uniswap_v3_math::tick_math::get_sqrt_ratio_at_tick;

use crate::errors::{EngineError, Result};
use crate::exchange::ExchangeAdapter;
use crate::models::{Observation, Slot0, Tier, TierSet};
use crate::pool::PoolReader;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// Synthetic pool state, including the TWAP the mock oracle will report.
#[derive(Debug, Clone)]
pub struct MockPool {
    pub factory: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_pips: u32,
    pub tick_spacing: i32,
    pub tick: i32,
    pub liquidity: u128,
    pub twap_tick: i32,
    pub twap_liquidity: u128,
    pub fail_observation: bool,
}

impl MockPool {
    /// A pool sitting at tick 0 with matching TWAP state.
    pub fn balanced(
        factory: Address,
        token0: Address,
        token1: Address,
        fee_pips: u32,
        liquidity: u128,
    ) -> Self {
        Self {
            factory,
            token0,
            token1,
            fee_pips,
            tick_spacing: 60,
            tick: 0,
            liquidity,
            twap_tick: 0,
            twap_liquidity: liquidity,
            fail_observation: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockPoolReader {
    pools: Arc<Mutex<HashMap<Address, MockPool>>>,
}

impl MockPoolReader {
    pub fn insert(&self, address: Address, pool: MockPool) {
        self.pools.lock().expect("mock lock").insert(address, pool);
    }

    pub fn update(&self, address: Address, mutate: impl FnOnce(&mut MockPool)) {
        let mut pools = self.pools.lock().expect("mock lock");
        mutate(pools.get_mut(&address).expect("unknown mock pool"));
    }

    fn get(&self, address: Address) -> Result<MockPool> {
        self.pools
            .lock()
            .expect("mock lock")
            .get(&address)
            .cloned()
            .ok_or_else(|| EngineError::Other(format!("unknown pool {address:?}")))
    }
}

#[async_trait]
impl PoolReader for MockPoolReader {
    async fn factory(&self, pool: Address) -> Result<Address> {
        Ok(self.get(pool)?.factory)
    }

    async fn tokens(&self, pool: Address) -> Result<(Address, Address)> {
        let p = self.get(pool)?;
        Ok((p.token0, p.token1))
    }

    async fn fee(&self, pool: Address) -> Result<u32> {
        Ok(self.get(pool)?.fee_pips)
    }

    async fn tick_spacing(&self, pool: Address) -> Result<i32> {
        Ok(self.get(pool)?.tick_spacing)
    }

    async fn slot0(&self, pool: Address) -> Result<Slot0> {
        let p = self.get(pool)?;
        Ok(Slot0 {
            sqrt_price_x96: get_sqrt_ratio_at_tick(p.tick)?,
            tick: p.tick,
        })
    }

    async fn liquidity(&self, pool: Address) -> Result<u128> {
        Ok(self.get(pool)?.liquidity)
    }

    async fn observe(&self, pool: Address, window_secs: u32) -> Result<Observation> {
        let p = self.get(pool)?;
        if p.fail_observation {
            return Err(EngineError::Observation {
                pool,
                reason: "mock observation failure".into(),
            });
        }
        let tick_delta = p.twap_tick as i64 * window_secs as i64;
        let spl_delta = if p.twap_liquidity == 0 {
            U256::ZERO
        } else {
            (U256::from(window_secs) << 128usize) / U256::from(p.twap_liquidity)
        };
        Ok(Observation {
            tick_cumulatives: [0, tick_delta],
            seconds_per_liquidity_x128: [U256::ZERO, spl_delta],
        })
    }
}

/// Exchange adapter backed by an explicit `(pair, tier) → pool` table.
pub struct MockExchangeAdapter {
    factory: Address,
    tiers: TierSet,
    pools: Mutex<HashMap<(Address, Address, Tier), Address>>,
}

impl MockExchangeAdapter {
    pub fn new(factory: Address, tiers: TierSet) -> Self {
        Self {
            factory,
            tiers,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, token_a: Address, token_b: Address, tier: Tier, pool: Address) {
        let key = Self::key(token_a, token_b, tier);
        self.pools.lock().expect("mock lock").insert(key, pool);
    }

    fn key(token_a: Address, token_b: Address, tier: Tier) -> (Address, Address, Tier) {
        if token_a <= token_b {
            (token_a, token_b, tier)
        } else {
            (token_b, token_a, tier)
        }
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchangeAdapter {
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
        Ok(self
            .pools
            .lock()
            .expect("mock lock")
            .get(&Self::key(token_a, token_b, tier))
            .copied())
    }
}
