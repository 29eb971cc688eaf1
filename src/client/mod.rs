pub mod factory;
pub mod handle;
pub mod process;
pub mod spec;
pub mod transport;

pub use factory::ToolClientFactory;
pub use handle::{HandleId, ToolClient, ToolClientHandle};
pub use process::ProcessTransport;
pub use spec::{ServerSetKey, ServerSpec};
pub use transport::{Capability, DynToolConnection, DynToolTransport, ToolConnection, ToolTransport};
