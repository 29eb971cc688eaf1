use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::client::{DynToolTransport, ServerSetKey, ServerSpec};
use crate::error::{ArchFlowError, Result};

use super::{PoolSettings, PoolStats, ToolClientPool};

/// External configuration source for server specs.
#[async_trait]
pub trait SpecLookup: Send + Sync {
    async fn resolve(&self, server: &str) -> Result<Option<ServerSpec>>;
}

/// In-memory spec table, loadable from a JSON map of name to spec.
#[derive(Debug, Default)]
pub struct StaticSpecLookup {
    specs: HashMap<String, ServerSpec>,
}

impl StaticSpecLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: ServerSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn from_specs<I>(specs: I) -> Self
    where
        I: IntoIterator<Item = ServerSpec>,
    {
        let mut lookup = Self::new();
        for spec in specs {
            lookup.insert(spec);
        }
        lookup
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArchFlowError::Context(format!("cannot read spec table {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let table: HashMap<String, ServerSpec> = serde_json::from_str(raw)
            .map_err(|e| ArchFlowError::Context(format!("invalid spec table: {e}")))?;
        let mut lookup = Self::new();
        for (name, mut spec) in table {
            // The map key wins over any name embedded in the value.
            spec.name = name;
            lookup.insert(spec);
        }
        Ok(lookup)
    }
}

#[async_trait]
impl SpecLookup for StaticSpecLookup {
    async fn resolve(&self, server: &str) -> Result<Option<ServerSpec>> {
        Ok(self.specs.get(server).cloned())
    }
}

/// One lazily-created pool per unique server-set key.
///
/// An explicit instance rather than a process global, so independent
/// registries can coexist (and tests never share state). Creation is
/// serialized: two concurrent first-requests for the same key get the same
/// pool.
pub struct PoolRegistry {
    transport: DynToolTransport,
    settings: PoolSettings,
    pools: Mutex<HashMap<ServerSetKey, Arc<ToolClientPool>>>,
}

impl PoolRegistry {
    pub fn new(transport: DynToolTransport, settings: PoolSettings) -> Self {
        Self {
            transport,
            settings,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve-or-create the pool for `key`. The first request resolves
    /// every member spec and fails fast with `SpecNotFound` if any member
    /// is missing; later requests return the same pool instance.
    pub async fn get(
        &self,
        key: &ServerSetKey,
        lookup: &dyn SpecLookup,
    ) -> Result<Arc<ToolClientPool>> {
        if key.is_empty() {
            return Err(ArchFlowError::Context(
                "server set has no members".to_string(),
            ));
        }

        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(key) {
            return Ok(Arc::clone(pool));
        }

        let mut specs = Vec::new();
        for name in key.names() {
            let spec = lookup
                .resolve(name)
                .await?
                .ok_or_else(|| ArchFlowError::SpecNotFound(name.to_string()))?;
            specs.push(spec);
        }

        let pool = ToolClientPool::new(
            key.clone(),
            specs,
            Arc::clone(&self.transport),
            self.settings.clone(),
        );
        info!(
            server_set = %key,
            capacity = self.settings.capacity,
            "created tool client pool"
        );
        pools.insert(key.clone(), Arc::clone(&pool));
        Ok(pool)
    }

    pub async fn stats_all(&self) -> Vec<PoolStats> {
        let pools = self.pools.lock().await;
        pools.values().map(|pool| pool.stats()).collect()
    }

    /// Shut down every pool and forget them all.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<ToolClientPool>> = {
            let mut pools = self.pools.lock().await;
            pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in drained {
            pool.shutdown().await;
        }
    }
}
