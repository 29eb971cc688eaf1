use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::client::ServerSetKey;
use crate::pool::{PoolRegistry, SpecLookup};

use super::agent::DynAgentCaller;
use super::digest::{StepDigester, StructuralDigester};
use super::step::{PipelinePlan, StepKind, StepResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    AcquiringHandle,
    Running { step: usize },
    Complete,
    Aborted,
}

/// One execution of the ordered step pipeline, owning exactly one borrowed
/// handle for its whole lifetime.
#[derive(Debug, Serialize)]
pub struct PipelineRun {
    pub requirement: String,
    pub state: RunState,
    pub results: Vec<StepResult>,
}

/// Drives the fixed step sequence over one pooled handle, feeding each
/// step the digests of the successful steps before it.
///
/// Only two failures abort a whole run: not getting a handle, and not being
/// able to enumerate its capabilities. Everything after that degrades
/// per-step: a failed step is recorded and later steps run with whatever
/// digests exist.
pub struct PipelineOrchestrator {
    registry: Arc<PoolRegistry>,
    agent: DynAgentCaller,
    digester: Arc<dyn StepDigester>,
    acquire_timeout: Option<Duration>,
}

impl PipelineOrchestrator {
    pub fn new(registry: Arc<PoolRegistry>, agent: DynAgentCaller) -> Self {
        Self {
            registry,
            agent,
            digester: Arc::new(StructuralDigester::default()),
            acquire_timeout: None,
        }
    }

    pub fn with_digester(mut self, digester: Arc<dyn StepDigester>) -> Self {
        self.digester = digester;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub async fn run(
        &self,
        requirement: &str,
        servers: &[String],
        lookup: &dyn SpecLookup,
        plan: &PipelinePlan,
    ) -> Result<PipelineRun> {
        let key = ServerSetKey::new(servers);
        let mut run = PipelineRun {
            requirement: requirement.to_string(),
            state: RunState::NotStarted,
            results: Vec::new(),
        };

        run.state = RunState::AcquiringHandle;
        let pool = self.registry.get(&key, lookup).await?;
        let mut pooled = match pool.acquire(self.acquire_timeout).await {
            Ok(pooled) => pooled,
            Err(e) => {
                warn!(server_set = %key, error = %e, "run aborted: no handle");
                run.state = RunState::Aborted;
                return Err(e);
            }
        };

        let capabilities = match pooled.capabilities().await {
            Ok(capabilities) => capabilities,
            Err(e) => {
                warn!(server_set = %key, error = %e, "run aborted: capability enumeration failed");
                pooled.release(true).await;
                run.state = RunState::Aborted;
                return Err(e);
            }
        };
        info!(
            server_set = %key,
            handle = ?pooled.id(),
            tools = capabilities.len(),
            "starting pipeline run"
        );

        let mut digests: Vec<(StepKind, String)> = Vec::new();
        let mut corrupted = false;

        for (position, step) in plan.steps().iter().enumerate() {
            run.state = RunState::Running { step: position };

            if !step.enabled {
                debug!(step = step.kind.name(), "step disabled, skipping");
                run.results.push(StepResult::skipped(step.kind));
                continue;
            }

            let context = build_context(requirement, &digests);
            match self.agent.invoke(&capabilities, &context, &step.prompt).await {
                Ok(content) => {
                    let digest = self.digester.digest(&content, step.kind);
                    info!(
                        step = step.kind.name(),
                        output_len = content.len(),
                        digest_len = digest.len(),
                        "step completed"
                    );
                    digests.push((step.kind, digest.clone()));
                    run.results.push(StepResult::success(step.kind, content, digest));
                }
                Err(e) => {
                    if e.is_transport() {
                        corrupted = true;
                        pooled.mark_corrupted();
                    }
                    warn!(
                        step = step.kind.name(),
                        error = %e,
                        "step failed, later steps continue with reduced context"
                    );
                    run.results.push(StepResult::failure(step.kind, e.to_string()));
                }
            }
        }

        pooled.release(corrupted).await;
        run.state = RunState::Complete;
        Ok(run)
    }
}

fn build_context(requirement: &str, digests: &[(StepKind, String)]) -> String {
    let mut context = format!("REQUIREMENT:\n{requirement}\n");
    for (kind, digest) in digests {
        context.push_str(&format!(
            "\nPREVIOUS STEP ({}) SUMMARY:\n{digest}\n",
            kind.name()
        ));
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_includes_only_available_digests() {
        let digests = vec![(StepKind::Template, "Resources: A, B".to_string())];
        let context = build_context("a web app", &digests);
        assert!(context.contains("REQUIREMENT:"));
        assert!(context.contains("PREVIOUS STEP (template)"));
        assert!(!context.contains("PREVIOUS STEP (diagram)"));
    }
}
