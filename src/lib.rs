pub mod client;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod utils;

pub use client::{
    Capability, HandleId, ProcessTransport, ServerSetKey, ServerSpec, ToolClient,
    ToolClientFactory, ToolClientHandle, ToolConnection, ToolTransport,
};
pub use error::{ArchFlowError, Result};
pub use pipeline::{
    AgentCaller, DynAgentCaller, LocalEchoAgent, PipelineOrchestrator, PipelinePlan, PipelineRun,
    PipelineStep, RunState, StepDigester, StepKind, StepResult, StructuralDigester,
};
pub use pool::{
    PoolRegistry, PoolSettings, PoolStats, PooledHandle, SpecLookup, StaticSpecLookup,
    ToolClientPool,
};
pub use utils::LoggingConfig;
