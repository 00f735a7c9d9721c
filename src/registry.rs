//! External collaborator seams: the allowlisted-pool registry and the
//! connector configuration. Both are owned outside this crate; the engine
//! only reads them.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use ethers::types::Address;

use crate::errors::{EngineError, Result};
use crate::models::ConnectorSet;

/// Allowlist-membership predicate plus enumeration of tracked pools.
///
/// Consulted at refresh, at route lookup (the cache can be stale relative to
/// allowlist changes) and by the solver for target-pool validation.
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    async fn is_allowlisted(&self, pool: Address) -> Result<bool>;

    async fn tracked_pools(&self) -> Result<Vec<Address>>;
}

/// Externally managed quote currency + bridge tokens.
#[async_trait]
pub trait ConnectorProvider: Send + Sync {
    async fn connector_set(&self) -> Result<ConnectorSet>;
}

#[async_trait]
impl<T: PoolRegistry + ?Sized> PoolRegistry for std::sync::Arc<T> {
    async fn is_allowlisted(&self, pool: Address) -> Result<bool> {
        (**self).is_allowlisted(pool).await
    }

    async fn tracked_pools(&self) -> Result<Vec<Address>> {
        (**self).tracked_pools().await
    }
}

#[async_trait]
impl<T: ConnectorProvider + ?Sized> ConnectorProvider for std::sync::Arc<T> {
    async fn connector_set(&self) -> Result<ConnectorSet> {
        (**self).connector_set().await
    }
}

/// In-memory registry, for hosts that manage the allowlist locally and for
/// tests.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    pools: RwLock<HashSet<Address>>,
}

impl StaticRegistry {
    pub fn new(pools: impl IntoIterator<Item = Address>) -> Self {
        Self {
            pools: RwLock::new(pools.into_iter().collect()),
        }
    }

    pub fn insert(&self, pool: Address) {
        self.pools.write().expect("registry lock poisoned").insert(pool);
    }

    pub fn remove(&self, pool: Address) {
        self.pools.write().expect("registry lock poisoned").remove(&pool);
    }
}

#[async_trait]
impl PoolRegistry for StaticRegistry {
    async fn is_allowlisted(&self, pool: Address) -> Result<bool> {
        Ok(self
            .pools
            .read()
            .map_err(|_| EngineError::Other("registry lock poisoned".into()))?
            .contains(&pool))
    }

    async fn tracked_pools(&self) -> Result<Vec<Address>> {
        let mut pools: Vec<Address> = self
            .pools
            .read()
            .map_err(|_| EngineError::Other("registry lock poisoned".into()))?
            .iter()
            .copied()
            .collect();
        pools.sort();
        Ok(pools)
    }
}

/// Fixed connector configuration.
#[derive(Debug, Clone)]
pub struct StaticConnectors {
    set: ConnectorSet,
}

impl StaticConnectors {
    pub fn new(set: ConnectorSet) -> Self {
        Self { set }
    }
}

#[async_trait]
impl ConnectorProvider for StaticConnectors {
    async fn connector_set(&self) -> Result<ConnectorSet> {
        Ok(self.set.clone())
    }
}
