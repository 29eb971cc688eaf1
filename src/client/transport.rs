use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::spec::ServerSpec;

/// One invocable tool exposed by a connected server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A live connection to one tool-server process.
///
/// Connections are exclusively owned by a single handle at any time, so
/// operations take `&mut self` rather than hiding a lock inside.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    async fn list_capabilities(&mut self) -> Result<Vec<Capability>>;
    async fn disconnect(&mut self) -> Result<()>;
    fn is_alive(&self) -> bool;
}

pub type DynToolConnection = Box<dyn ToolConnection>;

/// The single adapter boundary between the pool and whatever the
/// tool-server process actually speaks.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn connect(&self, spec: &ServerSpec) -> Result<DynToolConnection>;
}

pub type DynToolTransport = Arc<dyn ToolTransport>;
