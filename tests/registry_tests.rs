use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result as AnyResult;
use archflow::{
    ArchFlowError, Capability, PoolRegistry, PoolSettings, ServerSetKey, ServerSpec, SpecLookup,
    StaticSpecLookup, ToolConnection, ToolTransport,
};
use async_trait::async_trait;
use futures::future;

struct NullTransport;

#[async_trait]
impl ToolTransport for NullTransport {
    async fn connect(&self, _spec: &ServerSpec) -> archflow::Result<Box<dyn ToolConnection>> {
        Ok(Box::new(NullConnection { alive: true }))
    }
}

struct NullConnection {
    alive: bool,
}

#[async_trait]
impl ToolConnection for NullConnection {
    async fn list_capabilities(&mut self) -> archflow::Result<Vec<Capability>> {
        Ok(Vec::new())
    }

    async fn disconnect(&mut self) -> archflow::Result<()> {
        self.alive = false;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

fn lookup_with(names: &[&str]) -> StaticSpecLookup {
    StaticSpecLookup::from_specs(
        names
            .iter()
            .map(|name| ServerSpec::new(*name, "mock-server")),
    )
}

fn registry() -> PoolRegistry {
    PoolRegistry::new(Arc::new(NullTransport), PoolSettings::default())
}

#[tokio::test]
async fn same_key_returns_same_pool_instance() -> AnyResult<()> {
    let registry = registry();
    let lookup = lookup_with(&["knowledge", "cost"]);

    let a = registry
        .get(&ServerSetKey::new(["knowledge", "cost"]), &lookup)
        .await?;
    let b = registry
        .get(&ServerSetKey::new(["cost", "knowledge"]), &lookup)
        .await?;
    assert!(Arc::ptr_eq(&a, &b));
    Ok(())
}

#[tokio::test]
async fn distinct_sets_get_distinct_pools() -> AnyResult<()> {
    let registry = registry();
    let lookup = lookup_with(&["knowledge", "cost"]);

    let a = registry.get(&ServerSetKey::new(["knowledge"]), &lookup).await?;
    let b = registry
        .get(&ServerSetKey::new(["knowledge", "cost"]), &lookup)
        .await?;
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.stats_all().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unresolvable_member_fails_fast() {
    let registry = registry();
    let lookup = lookup_with(&["knowledge"]);

    let err = registry
        .get(&ServerSetKey::new(["knowledge", "missing"]), &lookup)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchFlowError::SpecNotFound(name) if name == "missing"));
}

#[tokio::test]
async fn empty_server_set_is_rejected() {
    let registry = registry();
    let lookup = lookup_with(&[]);

    let err = registry
        .get(&ServerSetKey::new(Vec::<String>::new()), &lookup)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchFlowError::Context(_)));
}

#[tokio::test]
async fn concurrent_first_requests_build_one_pool() -> AnyResult<()> {
    struct CountingLookup {
        inner: StaticSpecLookup,
        resolves: AtomicUsize,
    }

    #[async_trait]
    impl SpecLookup for CountingLookup {
        async fn resolve(&self, server: &str) -> archflow::Result<Option<ServerSpec>> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.resolve(server).await
        }
    }

    let registry = Arc::new(registry());
    let lookup = Arc::new(CountingLookup {
        inner: lookup_with(&["knowledge"]),
        resolves: AtomicUsize::new(0),
    });

    let pools = future::join_all((0..8).map(|_| {
        let registry = Arc::clone(&registry);
        let lookup = Arc::clone(&lookup);
        async move {
            registry
                .get(&ServerSetKey::new(["knowledge"]), lookup.as_ref())
                .await
        }
    }))
    .await;

    let first = pools[0].as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
    for pool in &pools {
        let pool = pool.as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
        assert!(Arc::ptr_eq(first, pool));
    }
    // Only the request that actually built the pool resolved specs.
    assert_eq!(lookup.resolves.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn spec_table_loads_from_file() -> AnyResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("servers.json");
    std::fs::write(
        &path,
        r#"{ "knowledge": { "name": "", "command": "run-knowledge" } }"#,
    )?;

    let lookup = StaticSpecLookup::from_json_file(&path)?;
    assert!(lookup.resolve("knowledge").await?.is_some());

    let err = StaticSpecLookup::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ArchFlowError::Context(_)));
    Ok(())
}

#[tokio::test]
async fn spec_table_loads_from_json() -> AnyResult<()> {
    let raw = r#"{
        "knowledge": { "name": "", "command": "run-knowledge", "args": ["--stdio"] },
        "cost": { "name": "", "command": "run-cost" }
    }"#;
    let lookup = StaticSpecLookup::from_json_str(raw)?;
    let spec = lookup.resolve("knowledge").await?.expect("spec present");
    assert_eq!(spec.name, "knowledge");
    assert_eq!(spec.command, "run-knowledge");
    assert!(lookup.resolve("unknown").await?.is_none());
    Ok(())
}
