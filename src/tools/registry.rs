//! Tool Registry (§4.2): the union of local tools and tools discovered from
//! remote tool servers, queryable by category and by keyword relevance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::tools::server_client::ToolServerClient;
use crate::types::{OrchestratorError, Result, ToolDescriptor, ToolOrigin, GENERAL_INTENT};

/// A tool defined in-process, with a direct execution function.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Keywords used by `FilterForQuery` to additively pull in tools from other
/// categories when the query seems to reference them (§4.2).
const RELEVANCE_KEYWORDS: &[&str] = &["read", "write", "search", "fetch", "list", "download", "upload"];

struct RemoteSource {
    category: String,
    client: Arc<ToolServerClient>,
    tools: Vec<ToolDescriptor>,
}

pub struct ToolRegistry {
    locals: HashMap<String, Arc<dyn LocalTool>>,
    remotes: RwLock<Vec<RemoteSource>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            locals: HashMap::new(),
            remotes: RwLock::new(Vec::new()),
        }
    }

    /// Registers the registry's two default local tools (§4.2 Supplemented).
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry
            .register(Arc::new(crate::tools::calculator::Calculator))
            .expect("calculator registers exactly once");
        registry
            .register(Arc::new(crate::tools::filesystem::ListDirectory))
            .expect("list_directory registers exactly once");
        registry
    }

    /// Rejects duplicate names.
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.locals.contains_key(&name) {
            return Err(OrchestratorError::InvalidRequest(format!("tool '{name}' already registered")));
        }
        self.locals.insert(name, tool);
        Ok(())
    }

    /// Adds a remote tool server under `category`. Does not contact it yet;
    /// call `refresh` to populate its tool list.
    pub fn register_remote_source(&self, category: &str, client: Arc<ToolServerClient>) {
        self.remotes.write().push(RemoteSource {
            category: category.to_ascii_uppercase(),
            client,
            tools: Vec::new(),
        });
    }

    /// Asks every remote source for its tool list, replacing the remote
    /// cache atomically per source. Logs but does not fail on per-source
    /// errors.
    pub async fn refresh(&self) {
        let sources: Vec<(usize, Arc<ToolServerClient>)> = {
            let remotes = self.remotes.read();
            remotes.iter().enumerate().map(|(i, r)| (i, r.client.clone())).collect()
        };

        for (idx, client) in sources {
            match client.list_tools().await {
                Ok(tools) => {
                    let mut remotes = self.remotes.write();
                    if let Some(source) = remotes.get_mut(idx) {
                        source.tools = tools;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to refresh remote tool source");
                }
            }
        }
    }

    /// Local-first lookup.
    pub fn resolve(&self, name: &str) -> Result<ToolDescriptor> {
        if let Some(tool) = self.locals.get(name) {
            return Ok(ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                schema: tool.parameters_schema(),
                origin: ToolOrigin::Local,
            });
        }
        let remotes = self.remotes.read();
        for source in remotes.iter() {
            if let Some(descriptor) = source.tools.iter().find(|t| t.name == name) {
                return Ok(descriptor.clone());
            }
        }
        Err(OrchestratorError::ToolUnknown(name.to_string()))
    }

    /// Executes a tool by name, local-first.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        if let Some(tool) = self.locals.get(name) {
            return tool.execute(args).await;
        }
        let client = {
            let remotes = self.remotes.read();
            remotes
                .iter()
                .find(|source| source.tools.iter().any(|t| t.name == name))
                .map(|source| source.client.clone())
        };
        match client {
            Some(client) => {
                let text = client.call_tool(name, args).await?;
                Ok(serde_json::Value::String(text))
            }
            None => Err(OrchestratorError::ToolUnknown(name.to_string())),
        }
    }

    /// `"GENERAL"` plus one category per remote source, upper-cased.
    pub fn categories(&self) -> Vec<String> {
        let mut categories = vec![GENERAL_INTENT.to_string()];
        let remotes = self.remotes.read();
        for source in remotes.iter() {
            if !categories.contains(&source.category) {
                categories.push(source.category.clone());
            }
        }
        categories
    }

    /// `GENERAL`'s locals when asked for `GENERAL`, otherwise all remote
    /// tools whose source's category matches.
    pub fn by_category(&self, category: &str) -> Vec<ToolDescriptor> {
        if category.eq_ignore_ascii_case(GENERAL_INTENT) {
            return self
                .locals
                .values()
                .map(|tool| ToolDescriptor {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    schema: tool.parameters_schema(),
                    origin: ToolOrigin::Local,
                })
                .collect();
        }
        let remotes = self.remotes.read();
        remotes
            .iter()
            .filter(|source| source.category.eq_ignore_ascii_case(category))
            .flat_map(|source| source.tools.clone())
            .collect()
    }

    /// Deterministic selection per §4.2: intent category first, then
    /// additively include tools whose category or a distinctive keyword
    /// appears in the lowercased query, deduplicated, truncated to `max`.
    pub fn filter_for_query(&self, intent: &str, query: &str, max: usize) -> Vec<ToolDescriptor> {
        let query_lower = query.to_ascii_lowercase();
        let mut seen = std::collections::HashSet::new();
        let mut selected = Vec::new();

        for descriptor in self.by_category(intent) {
            if seen.insert(descriptor.name.clone()) {
                selected.push(descriptor);
            }
        }

        for category in self.categories() {
            if category.eq_ignore_ascii_case(intent) {
                continue;
            }
            let category_lower = category.to_ascii_lowercase();
            let keyword_hit = query_lower.contains(&category_lower)
                || RELEVANCE_KEYWORDS.iter().any(|kw| query_lower.contains(kw));
            if !keyword_hit {
                continue;
            }
            for descriptor in self.by_category(&category) {
                if seen.insert(descriptor.name.clone()) {
                    selected.push(descriptor);
                }
            }
        }

        selected.truncate(max);
        selected
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tools_are_registered() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.has_tool("calculator"));
        assert!(registry.has_tool("list_directory"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(crate::tools::calculator::Calculator)).unwrap();
        let err = registry.register(Arc::new(crate::tools::calculator::Calculator));
        assert!(err.is_err());
    }

    #[test]
    fn general_category_returns_locals() {
        let registry = ToolRegistry::with_default_tools();
        let general = registry.by_category("GENERAL");
        assert!(general.iter().any(|t| t.name == "calculator"));
    }

    #[test]
    fn filter_for_query_truncates_to_max() {
        let registry = ToolRegistry::with_default_tools();
        let results = registry.filter_for_query("GENERAL", "search and fetch things", 1);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn unknown_tool_resolution_fails() {
        let registry = ToolRegistry::with_default_tools();
        assert!(registry.resolve("does_not_exist").is_err());
    }

    #[tokio::test]
    async fn calculator_executes() {
        let registry = ToolRegistry::with_default_tools();
        let result = registry
            .execute("calculator", serde_json::json!({"operation": "add", "a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result["result"], 5.0);
    }
}
