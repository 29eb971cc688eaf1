pub mod agent;
pub mod digest;
pub mod orchestrator;
pub mod step;

pub use agent::{AgentCaller, DynAgentCaller, LocalEchoAgent};
pub use digest::{StepDigester, StructuralDigester};
pub use orchestrator::{PipelineOrchestrator, PipelineRun, RunState};
pub use step::{PipelinePlan, PipelineStep, StepKind, StepResult};
