use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future;
use serde::Serialize;
use tracing::debug;

use crate::error::{ArchFlowError, Result};

use super::spec::ServerSpec;
use super::transport::{Capability, DynToolConnection, ToolTransport};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity for a pooled handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One spec plus, once connected, a live connection to its process.
pub struct ToolClient {
    spec: ServerSpec,
    connection: Option<DynToolConnection>,
}

impl fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolClient")
            .field("spec", &self.spec)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ToolClient {
    pub(crate) fn new(spec: ServerSpec) -> Self {
        Self {
            spec,
            connection: None,
        }
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.is_alive())
            .unwrap_or(false)
    }

    pub async fn connect(&mut self, transport: &dyn ToolTransport) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connection = Some(transport.connect(&self.spec).await?);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect().await?;
        }
        Ok(())
    }

    pub async fn list_capabilities(&mut self) -> Result<Vec<Capability>> {
        match self.connection.as_mut() {
            Some(connection) => connection.list_capabilities().await,
            None => Err(ArchFlowError::Transport(format!(
                "server `{}` is not connected",
                self.spec.name
            ))),
        }
    }
}

/// An exclusively-owned bundle of clients, one per member server of a set.
///
/// Owned by the pool that created it; borrowed by exactly one caller between
/// acquire and release.
pub struct ToolClientHandle {
    id: HandleId,
    clients: Vec<ToolClient>,
    capabilities: Option<Vec<Capability>>,
}

impl ToolClientHandle {
    pub(crate) fn new(clients: Vec<ToolClient>) -> Self {
        Self {
            id: HandleId::next(),
            clients,
            capabilities: None,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Usable means every member connection is still live.
    pub fn is_usable(&self) -> bool {
        !self.clients.is_empty() && self.clients.iter().all(ToolClient::is_connected)
    }

    pub async fn connect(&mut self, transport: &dyn ToolTransport) -> Result<()> {
        future::try_join_all(self.clients.iter_mut().map(|c| c.connect(transport))).await?;
        Ok(())
    }

    /// Union of the capabilities exposed by every member server, cached
    /// after the first enumeration.
    pub async fn capabilities(&mut self) -> Result<Vec<Capability>> {
        if let Some(capabilities) = &self.capabilities {
            return Ok(capabilities.clone());
        }
        let mut union: Vec<Capability> = Vec::new();
        for client in &mut self.clients {
            for capability in client.list_capabilities().await? {
                if !union.iter().any(|c| c.name == capability.name) {
                    union.push(capability);
                }
            }
        }
        self.capabilities = Some(union.clone());
        Ok(union)
    }

    /// Best-effort teardown of every member connection.
    pub async fn disconnect(&mut self) {
        for client in &mut self.clients {
            if let Err(e) = client.disconnect().await {
                debug!(handle = %self.id, server = %client.spec().name, error = %e,
                    "error disconnecting client");
            }
        }
        self.capabilities = None;
    }
}
