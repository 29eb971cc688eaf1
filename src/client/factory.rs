use crate::error::{ArchFlowError, Result};

use super::handle::{ToolClient, ToolClientHandle};
use super::spec::ServerSpec;

/// Stateless factory for unconnected clients.
///
/// A `SpecInvalid` from here is a configuration defect, never retried.
pub struct ToolClientFactory;

impl ToolClientFactory {
    pub fn create(spec: &ServerSpec) -> Result<ToolClient> {
        Self::validate(spec)?;
        Ok(ToolClient::new(spec.clone()))
    }

    /// One unconnected client per member server, bundled under a fresh
    /// handle identity.
    pub fn create_handle(specs: &[ServerSpec]) -> Result<ToolClientHandle> {
        if specs.is_empty() {
            return Err(ArchFlowError::SpecInvalid {
                server: String::new(),
                reason: "server set is empty".to_string(),
            });
        }
        let clients = specs
            .iter()
            .map(Self::create)
            .collect::<Result<Vec<_>>>()?;
        Ok(ToolClientHandle::new(clients))
    }

    fn validate(spec: &ServerSpec) -> Result<()> {
        if spec.name.trim().is_empty() {
            return Err(ArchFlowError::SpecInvalid {
                server: spec.name.clone(),
                reason: "server name is empty".to_string(),
            });
        }
        if spec.command.trim().is_empty() {
            return Err(ArchFlowError::SpecInvalid {
                server: spec.name.clone(),
                reason: "launch command is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_command() {
        let spec = ServerSpec::new("knowledge", "");
        let err = ToolClientFactory::create(&spec).unwrap_err();
        assert!(matches!(err, ArchFlowError::SpecInvalid { .. }));
    }

    #[test]
    fn handles_get_distinct_ids() {
        let specs = vec![ServerSpec::new("knowledge", "echo")];
        let a = ToolClientFactory::create_handle(&specs).unwrap();
        let b = ToolClientFactory::create_handle(&specs).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
