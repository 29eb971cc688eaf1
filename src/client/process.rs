use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{ArchFlowError, Result};

use super::spec::ServerSpec;
use super::transport::{Capability, DynToolConnection, ToolConnection, ToolTransport};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Spawns the spec'd command and speaks line-delimited JSON-RPC over its
/// stdin/stdout. Startup and handshake dominate the cost of a connection,
/// which is exactly what the pool exists to amortize.
#[derive(Default)]
pub struct ProcessTransport;

impl ProcessTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolTransport for ProcessTransport {
    async fn connect(&self, spec: &ServerSpec) -> Result<DynToolConnection> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ArchFlowError::Transport(format!(
                    "failed to spawn `{}` for server `{}`: {e}",
                    spec.command, spec.name
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ArchFlowError::Transport(format!("no stdin pipe for server `{}`", spec.name))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ArchFlowError::Transport(format!("no stdout pipe for server `{}`", spec.name))
        })?;

        let mut connection = ProcessConnection {
            server: spec.name.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
            alive: true,
        };

        let result = connection
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": { "name": "archflow", "version": env!("CARGO_PKG_VERSION") },
                    "capabilities": {},
                }),
            )
            .await?;
        debug!(server = %spec.name, response = %result, "tool server initialized");

        Ok(Box::new(connection))
    }
}

pub struct ProcessConnection {
    server: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
    alive: bool,
}

impl ProcessConnection {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut line = payload.to_string();
        line.push('\n');
        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            return Err(self.broken(format!("write failed: {e}")));
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(self.broken(format!("flush failed: {e}")));
        }

        // Skip notifications until the matching response id arrives.
        loop {
            let mut buf = String::new();
            let read = match self.stdout.read_line(&mut buf).await {
                Ok(read) => read,
                Err(e) => return Err(self.broken(format!("read failed: {e}"))),
            };
            if read == 0 {
                return Err(self.broken("server closed its stdout".to_string()));
            }
            let message: Value = match serde_json::from_str(buf.trim()) {
                Ok(value) => value,
                Err(e) => {
                    debug!(server = %self.server, error = %e, "discarding unparsable line");
                    continue;
                }
            };
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = message.get("error") {
                return Err(ArchFlowError::Transport(format!(
                    "server `{}` rejected `{method}`: {error}",
                    self.server
                )));
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    fn broken(&mut self, detail: String) -> ArchFlowError {
        self.alive = false;
        ArchFlowError::Transport(format!("server `{}`: {detail}", self.server))
    }
}

#[async_trait]
impl ToolConnection for ProcessConnection {
    async fn list_capabilities(&mut self) -> Result<Vec<Capability>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut capabilities = Vec::with_capacity(tools.len());
        for tool in tools {
            let Some(name) = tool.get("name").and_then(Value::as_str) else {
                continue;
            };
            let mut capability = Capability::new(name);
            if let Some(description) = tool.get("description").and_then(Value::as_str) {
                capability = capability.with_description(description);
            }
            capabilities.push(capability);
        }
        Ok(capabilities)
    }

    async fn disconnect(&mut self) -> Result<()> {
        if !self.alive {
            return Ok(());
        }
        self.alive = false;

        // Best-effort shutdown notification before the hard kill.
        let notice = json!({ "jsonrpc": "2.0", "method": "shutdown" });
        let mut line = notice.to_string();
        line.push('\n');
        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            debug!(server = %self.server, error = %e, "shutdown notice not delivered");
        }

        if let Err(e) = self.child.kill().await {
            warn!(server = %self.server, error = %e, "failed to kill tool server process");
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
