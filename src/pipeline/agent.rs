use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Capability;
use crate::error::Result;

/// Opaque call into the model/agent external to this subsystem.
///
/// `context` carries the digests of prior steps; `prompt` is the step's own
/// instruction.
#[async_trait]
pub trait AgentCaller: Send + Sync {
    async fn invoke(
        &self,
        capabilities: &[Capability],
        context: &str,
        prompt: &str,
    ) -> Result<String>;
}

pub type DynAgentCaller = Arc<dyn AgentCaller>;

/// Offline stand-in used by tests and the demo binary.
#[derive(Default, Clone)]
pub struct LocalEchoAgent;

#[async_trait]
impl AgentCaller for LocalEchoAgent {
    async fn invoke(
        &self,
        capabilities: &[Capability],
        context: &str,
        prompt: &str,
    ) -> Result<String> {
        Ok(format!(
            "[Echo] {} tools available\n{context}\n{prompt}",
            capabilities.len()
        ))
    }
}
