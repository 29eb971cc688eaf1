pub mod registry;

use std::collections::{HashSet, VecDeque};
use std::env;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{
    DynToolTransport, HandleId, ServerSetKey, ServerSpec, ToolClientFactory, ToolClientHandle,
};
use crate::error::{ArchFlowError, Result};

pub use registry::{PoolRegistry, SpecLookup, StaticSpecLookup};

/// Tuning knobs for one pool.
///
/// `reuse_on_success` keeps the underlying process connections open across
/// borrows; turning it off trades throughput for per-borrow isolation.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    pub capacity: usize,
    pub max_wait: Duration,
    pub reuse_on_success: bool,
    pub backoff_initial: Duration,
    pub backoff_ceiling: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_wait: Duration::from_secs(30),
            reuse_on_success: true,
            backoff_initial: Duration::from_millis(10),
            backoff_ceiling: Duration::from_millis(250),
        }
    }
}

impl PoolSettings {
    /// Defaults overridden by `ARCHFLOW_POOL_SIZE` and
    /// `ARCHFLOW_POOL_MAX_WAIT` (seconds) where set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(raw) = env::var("ARCHFLOW_POOL_SIZE") {
            match raw.parse::<usize>() {
                Ok(size) if size > 0 => settings.capacity = size,
                _ => warn!(value = %raw, "ignoring invalid ARCHFLOW_POOL_SIZE"),
            }
        }
        if let Ok(raw) = env::var("ARCHFLOW_POOL_MAX_WAIT") {
            match raw.parse::<f64>() {
                Ok(secs) if secs >= 0.0 => settings.max_wait = Duration::from_secs_f64(secs),
                _ => warn!(value = %raw, "ignoring invalid ARCHFLOW_POOL_MAX_WAIT"),
            }
        }
        settings
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_reuse_on_success(mut self, reuse: bool) -> Self {
        self.reuse_on_success = reuse;
        self
    }
}

/// Read-only snapshot for observability.
#[derive(Clone, Debug, Serialize)]
pub struct PoolStats {
    pub server_set: String,
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
    pub created: usize,
    pub reused: u64,
    pub total_requests: u64,
    pub reuse_rate: f64,
}

#[derive(Default)]
struct PoolState {
    available: VecDeque<ToolClientHandle>,
    in_use: HashSet<HandleId>,
    created: usize,
    reused: u64,
    total_requests: u64,
}

enum AcquirePlan {
    Reuse(ToolClientHandle),
    Build,
    Wait,
}

/// Bounded cache of connected handles for one fixed server-set.
///
/// Handle startup (process spawn + handshake) dominates the cost of a
/// borrow, so released handles keep their connections open and go back on
/// the shelf. Total live handles never exceed `capacity`; callers that
/// cannot be served within their deadline get `PoolExhausted` instead of
/// queuing without bound.
pub struct ToolClientPool {
    key: ServerSetKey,
    specs: Vec<ServerSpec>,
    transport: DynToolTransport,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    // Lets `acquire(&self)` hand an owning reference to the guard.
    this: Weak<ToolClientPool>,
}

impl std::fmt::Debug for ToolClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolClientPool")
            .field("key", &self.key)
            .field("specs", &self.specs)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ToolClientPool {
    pub fn new(
        key: ServerSetKey,
        specs: Vec<ServerSpec>,
        transport: DynToolTransport,
        settings: PoolSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key,
            specs,
            transport,
            settings,
            state: Mutex::new(PoolState::default()),
            this: this.clone(),
        })
    }

    fn strong(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| ArchFlowError::Context("pool is being torn down".to_string()))
    }

    pub fn key(&self) -> &ServerSetKey {
        &self.key
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Borrow a handle, waiting up to `timeout` (pool default when `None`)
    /// for capacity. The deadline is hard: it is measured from the first
    /// wait attempt and is never reset by intervening retries.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<PooledHandle> {
        let this = self.strong()?;
        let timeout = timeout.unwrap_or(self.settings.max_wait);
        self.state.lock().total_requests += 1;

        let mut deadline: Option<Instant> = None;
        let mut backoff = self.settings.backoff_initial;

        loop {
            let plan = {
                let mut state = self.state.lock();
                if let Some(handle) = state.available.pop_front() {
                    state.in_use.insert(handle.id());
                    state.reused += 1;
                    debug!(
                        pool = %self.key,
                        handle = %handle.id(),
                        available = state.available.len(),
                        in_use = state.in_use.len(),
                        "reusing pooled client"
                    );
                    AcquirePlan::Reuse(handle)
                } else if state.created < self.settings.capacity {
                    // Reserve the slot now; construction happens outside the
                    // lock so a slow connect cannot stall other acquirers.
                    state.created += 1;
                    AcquirePlan::Build
                } else {
                    AcquirePlan::Wait
                }
            };

            match plan {
                AcquirePlan::Reuse(handle) => {
                    return Ok(PooledHandle::new(this, handle))
                }
                AcquirePlan::Build => match self.build_handle().await {
                    Ok(handle) => {
                        let mut state = self.state.lock();
                        state.in_use.insert(handle.id());
                        info!(
                            pool = %self.key,
                            handle = %handle.id(),
                            created = state.created,
                            capacity = self.settings.capacity,
                            "created pooled client"
                        );
                        return Ok(PooledHandle::new(this, handle));
                    }
                    Err(e) => {
                        self.state.lock().created -= 1;
                        return Err(e);
                    }
                },
                AcquirePlan::Wait => {
                    let deadline = *deadline.get_or_insert_with(|| Instant::now() + timeout);
                    let now = Instant::now();
                    if now >= deadline {
                        let state = self.state.lock();
                        return Err(ArchFlowError::PoolExhausted {
                            server_set: self.key.to_string(),
                            waited: timeout,
                            capacity: self.settings.capacity,
                            in_use: state.in_use.len(),
                        });
                    }
                    tokio::time::sleep(backoff.min(deadline - now)).await;
                    backoff = (backoff * 2).min(self.settings.backoff_ceiling);
                }
            }
        }
    }

    async fn build_handle(&self) -> Result<ToolClientHandle> {
        let mut handle = ToolClientFactory::create_handle(&self.specs)?;
        handle.connect(self.transport.as_ref()).await?;
        Ok(handle)
    }

    /// Return a borrowed handle. With `force_discard` (the borrower saw an
    /// error while holding it) the handle is disconnected and its slot is
    /// freed, so a later acquire builds a fresh replacement instead of
    /// permanently shrinking the pool.
    pub async fn release(&self, mut handle: ToolClientHandle, force_discard: bool) {
        let id = handle.id();
        {
            let mut state = self.state.lock();
            if !state.in_use.remove(&id) {
                warn!(pool = %self.key, handle = %id, "released handle was not in use");
                return;
            }
        }

        let reusable = !force_discard && self.settings.reuse_on_success && handle.is_usable();
        if reusable {
            let mut state = self.state.lock();
            state.available.push_back(handle);
            debug!(
                pool = %self.key,
                handle = %id,
                available = state.available.len(),
                in_use = state.in_use.len(),
                "returned client to pool"
            );
        } else {
            handle.disconnect().await;
            let mut state = self.state.lock();
            state.created = state.created.saturating_sub(1);
            debug!(
                pool = %self.key,
                handle = %id,
                force_discard,
                created = state.created,
                "discarded client"
            );
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let reuse_rate = if state.total_requests > 0 {
            state.reused as f64 / state.total_requests as f64
        } else {
            0.0
        };
        PoolStats {
            server_set: self.key.to_string(),
            capacity: self.settings.capacity,
            available: state.available.len(),
            in_use: state.in_use.len(),
            created: state.created,
            reused: state.reused,
            total_requests: state.total_requests,
            reuse_rate,
        }
    }

    /// Disconnect and drop every idle handle. Borrowed handles are
    /// discarded when their borrowers release them.
    pub async fn shutdown(&self) {
        let drained: Vec<ToolClientHandle> = {
            let mut state = self.state.lock();
            let drained: Vec<_> = state.available.drain(..).collect();
            state.created = state.created.saturating_sub(drained.len());
            drained
        };
        for mut handle in drained {
            handle.disconnect().await;
        }
        info!(pool = %self.key, "pool shut down");
    }
}

/// A borrowed handle with release-exactly-once semantics.
///
/// The normal path is an explicit `release(force_discard).await`. If the
/// borrower unwinds or its task is cancelled first, `Drop` hands the handle
/// back through a spawned task, so no exit path leaks the borrow.
pub struct PooledHandle {
    pool: Arc<ToolClientPool>,
    handle: Option<ToolClientHandle>,
    discard: bool,
}

impl PooledHandle {
    fn new(pool: Arc<ToolClientPool>, handle: ToolClientHandle) -> Self {
        Self {
            pool,
            handle: Some(handle),
            discard: false,
        }
    }

    pub fn id(&self) -> Option<HandleId> {
        self.handle.as_ref().map(ToolClientHandle::id)
    }

    /// Flag the handle so that any release path discards it.
    pub fn mark_corrupted(&mut self) {
        self.discard = true;
    }

    pub async fn capabilities(&mut self) -> Result<Vec<crate::client::Capability>> {
        match self.handle.as_mut() {
            Some(handle) => handle.capabilities().await,
            None => Err(ArchFlowError::Context(
                "handle already released".to_string(),
            )),
        }
    }

    pub async fn release(mut self, force_discard: bool) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle, force_discard || self.discard).await;
        }
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let pool = Arc::clone(&self.pool);
            let discard = self.discard;
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    pool.release(handle, discard).await;
                });
            }
            // Without a runtime the process is exiting; child processes are
            // reaped via kill_on_drop.
        }
    }
}
