//! Tool Server Client (§4.3): supervises one external tool server child
//! process and speaks to it over stdin/stdout using a line-framed JSON
//! request/response protocol. The wire framing is hand-rolled over
//! `tokio::process::Command` + `tokio::io::{BufReader, AsyncWriteExt}`, in
//! the idiom `crates/pawan`'s `BashTool` uses for subprocess supervision —
//! no crate in the example pack exercises a concrete stdio JSON-RPC client,
//! so this is a deliberate hand-roll rather than a fabricated dependency.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::cache::{compute_key, Cache};
use crate::types::{OrchestratorError, Result, ToolDescriptor, ToolOrigin};

const DISCOVERY_TTL_SECS: u64 = 30 * 60;
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// `tools/list` returns an array of `{name, description, inputSchema}`.
#[derive(Debug, Clone, Deserialize)]
struct RemoteToolDescriptor {
    name: String,
    description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}

/// `tools/call` response shape: `{content:[{type,"text":…}]}`. Text
/// contents are concatenated with newlines for the orchestrator's
/// consumption.
#[derive(Debug, Clone, Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Category-specific invocation TTLs (§4.3).
fn ttl_for_category(category: &str) -> u64 {
    let lower = category.to_ascii_lowercase();
    if lower.contains("filesystem") || lower.contains("file") {
        120
    } else if lower.contains("git") || lower.contains("version") {
        60
    } else if lower.contains("fetch") || lower.contains("network") || lower.contains("web") {
        300
    } else {
        60
    }
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

/// Supervises one tool server subprocess, reachable by `name`/`category`.
pub struct ToolServerClient {
    name: String,
    category: String,
    command: String,
    args: Vec<String>,
    conn: Mutex<Option<Connection>>,
    cache: Arc<dyn Cache>,
}

impl ToolServerClient {
    pub fn new(name: impl Into<String>, category: impl Into<String>, command: impl Into<String>, args: Vec<String>, cache: Arc<dyn Cache>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            command: command.into(),
            args,
            conn: Mutex::new(None),
            cache,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Spawns the subprocess and performs an initialization handshake.
    /// Idempotent: a live connection is reused.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let conn = self.spawn().await?;
        *guard = Some(conn);
        drop(guard);
        self.call_once("initialize", Value::Null).await?;
        Ok(())
    }

    async fn spawn(&self) -> Result<Connection> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OrchestratorError::ToolCrash(format!("failed to spawn tool server '{}': {e}", self.name)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OrchestratorError::ToolCrash(format!("no stdin for tool server '{}'", self.name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::ToolCrash(format!("no stdout for tool server '{}'", self.name)))?;

        Ok(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 0,
        })
    }

    /// Idempotent; guarantees the child is terminated on all exit paths.
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            let _ = conn.child.start_kill();
            let _ = conn.child.wait().await;
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.connect().await?;
        match self.call_once(method, params.clone()).await {
            Ok(value) => Ok(value),
            Err(OrchestratorError::ToolCrash(_)) => {
                // Reconnect transparently at most once per operation.
                self.close().await;
                self.connect().await?;
                self.call_once(method, params).await
            }
            Err(e) => Err(e),
        }
    }

    async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| OrchestratorError::ToolCrash(format!("tool server '{}' not connected", self.name)))?;

        let id = conn.next_id;
        conn.next_id += 1;

        let request = Request { id, method, params };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| OrchestratorError::ToolProtocol(format!("failed to encode request: {e}")))?;
        line.push('\n');

        let write_result = timeout(CALL_TIMEOUT, conn.stdin.write_all(line.as_bytes())).await;
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(OrchestratorError::ToolCrash(format!("write to tool server '{}' failed: {e}", self.name))),
            Err(_) => return Err(OrchestratorError::ToolTimeout(format!("write to tool server '{}' timed out", self.name))),
        }

        let mut response_line = String::new();
        let read_result = timeout(CALL_TIMEOUT, conn.stdout.read_line(&mut response_line)).await;
        let bytes_read = match read_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(OrchestratorError::ToolCrash(format!("read from tool server '{}' failed: {e}", self.name))),
            Err(_) => return Err(OrchestratorError::ToolTimeout(format!("call to tool server '{}' timed out", self.name))),
        };
        if bytes_read == 0 {
            return Err(OrchestratorError::ToolCrash(format!("tool server '{}' closed its output", self.name)));
        }

        let response: Response = serde_json::from_str(response_line.trim())
            .map_err(|e| OrchestratorError::ToolProtocol(format!("malformed frame from '{}': {e}", self.name)))?;

        if response.id != id {
            return Err(OrchestratorError::ToolProtocol(format!(
                "response id mismatch from '{}': expected {id}, got {}",
                self.name, response.id
            )));
        }
        if let Some(error) = response.error {
            return Err(OrchestratorError::ToolError(error));
        }
        response
            .result
            .ok_or_else(|| OrchestratorError::ToolProtocol(format!("response from '{}' had neither result nor error", self.name)))
    }

    /// Returns the tool descriptors, caching under a key scoped by this
    /// source's name with a 30-minute TTL.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let cache_key = compute_key(&["tool-discovery", &self.name]);
        if let Ok(Some(cached)) = self.cache.get::<Vec<RemoteToolDescriptor>>(&cache_key) {
            return Ok(cached.into_iter().map(|t| self.to_descriptor(t)).collect());
        }

        let result = self.call("tools/list", Value::Null).await?;
        let tools: Vec<RemoteToolDescriptor> = serde_json::from_value(result)
            .map_err(|e| OrchestratorError::ToolProtocol(format!("invalid tools/list response from '{}': {e}", self.name)))?;

        let _ = self.cache.set(&cache_key, &tools, DISCOVERY_TTL_SECS);
        Ok(tools.into_iter().map(|t| self.to_descriptor(t)).collect())
    }

    fn to_descriptor(&self, remote: RemoteToolDescriptor) -> ToolDescriptor {
        ToolDescriptor {
            name: remote.name,
            description: remote.description,
            schema: remote.input_schema,
            origin: ToolOrigin::RemoteServer(self.name.clone()),
        }
    }

    /// Invokes a tool, returning its concatenated text result. Cached under
    /// `(source, name, canonical-arguments-hash)` with a category-specific
    /// TTL.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let canonical = canonicalize(&arguments);
        let cache_key = compute_key(&["tool-call", &self.name, name, &canonical]);
        if let Ok(Some(cached)) = self.cache.get::<String>(&cache_key) {
            return Ok(cached);
        }

        let result = self
            .call("tools/call", serde_json::json!({"name": name, "arguments": arguments}))
            .await?;
        let parsed: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| OrchestratorError::ToolProtocol(format!("invalid tools/call response from '{}': {e}", self.name)))?;
        let text = parsed
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let ttl = ttl_for_category(&self.category);
        let _ = self.cache.set(&cache_key, &text, ttl);
        Ok(text)
    }
}

/// Serializes arguments in canonical (key-sorted) form so equivalent
/// invocations hit the same cache entry.
fn canonicalize(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
                for (k, v) in map {
                    sorted.insert(k.clone(), sort(v));
                }
                serde_json::to_value(sorted).unwrap_or(Value::Null)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    #[test]
    fn ttl_by_category() {
        assert_eq!(ttl_for_category("FILESYSTEM"), 120);
        assert_eq!(ttl_for_category("GIT"), 60);
        assert_eq!(ttl_for_category("WEB_FETCH"), 300);
        assert_eq!(ttl_for_category("GENERAL"), 60);
    }
}
