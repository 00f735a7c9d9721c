//! Read-only access to AMM pools.
//!
//! The engine never caches pool state; every call goes back to the source so
//! results reflect exactly the state visible at call time.

use async_trait::async_trait;
use ethers::types::Address;

use crate::errors::Result;
use crate::models::{Observation, Slot0};

pub mod rpc;
pub mod twap;

pub use rpc::RpcPoolReader;

/// Read-only view over concentrated-liquidity pools.
///
/// Implemented over RPC by [`RpcPoolReader`]; tests supply an in-memory
/// implementation.
#[async_trait]
pub trait PoolReader: Send + Sync {
    /// Factory that deployed the pool (identifies its exchange context).
    async fn factory(&self, pool: Address) -> Result<Address>;

    /// Ordered `(token0, token1)` pair.
    async fn tokens(&self, pool: Address) -> Result<(Address, Address)>;

    /// Swap fee in pips (1e-6), e.g. 3000 = 0.3%.
    async fn fee(&self, pool: Address) -> Result<u32>;

    async fn tick_spacing(&self, pool: Address) -> Result<i32>;

    async fn slot0(&self, pool: Address) -> Result<Slot0>;

    /// Currently active in-range liquidity.
    async fn liquidity(&self, pool: Address) -> Result<u128>;

    /// Cumulative tick and seconds-per-liquidity observations at
    /// `[window_secs ago, now]`.
    async fn observe(&self, pool: Address, window_secs: u32) -> Result<Observation>;
}

#[async_trait]
impl<T: PoolReader + ?Sized> PoolReader for std::sync::Arc<T> {
    async fn factory(&self, pool: Address) -> Result<Address> {
        (**self).factory(pool).await
    }

    async fn tokens(&self, pool: Address) -> Result<(Address, Address)> {
        (**self).tokens(pool).await
    }

    async fn fee(&self, pool: Address) -> Result<u32> {
        (**self).fee(pool).await
    }

    async fn tick_spacing(&self, pool: Address) -> Result<i32> {
        (**self).tick_spacing(pool).await
    }

    async fn slot0(&self, pool: Address) -> Result<Slot0> {
        (**self).slot0(pool).await
    }

    async fn liquidity(&self, pool: Address) -> Result<u128> {
        (**self).liquidity(pool).await
    }

    async fn observe(&self, pool: Address, window_secs: u32) -> Result<Observation> {
        (**self).observe(pool, window_secs).await
    }
}
