//! Tool surface over a [`KnowledgeBase`].
//!
//! Each exposed operation is a [`Tool`] with an OpenAI function-calling
//! parameter schema. The [`ToolRegistry`] is what the HTTP server lists and
//! dispatches through.
//!
//! | Tool | Operation |
//! |------|-----------|
//! | `search_knowledge_base` | [`KnowledgeBase::search_knowledge_base`] |
//! | `rag_answer` | [`KnowledgeBase::rag_answer`] |
//! | `update_knowledge_base_from_files` | [`KnowledgeBase::update_knowledge_base_from_files`] |
//! | `add_to_knowledge_base` | [`KnowledgeBase::add_to_knowledge_base`] |
//! | `list_sources` | [`KnowledgeBase::list_sources`] |
//! | `create_temp_knowledge_base` | [`KnowledgeBase::create_temp_knowledge_base`] |
//! | `search_temp_knowledge_base` | [`KnowledgeBase::search_temp_knowledge_base`] |

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{PipelineError, RagError};
use crate::knowledge::KnowledgeBase;
use crate::sources::summarize;

/// Failure of a tool call, carrying a machine-readable code.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    pub code: &'static str,
    pub message: String,
}

impl ToolError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "bad_request",
            message: message.into(),
        }
    }
}

impl From<RagError> for ToolError {
    fn from(e: RagError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<PipelineError> for ToolError {
    fn from(e: PipelineError) -> Self {
        Self {
            code: e.source.code(),
            message: e.to_string(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError {
        code: "internal",
        message: e.to_string(),
    })
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError>;
}

/// Serializable tool description for `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for passages relevant to a query"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "k": { "type": "integer", "description": "Max results (default: retrieval.top_k)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            return Err(ToolError::bad_request("query must not be empty"));
        }
        let k = match params.get("k").and_then(|v| v.as_i64()) {
            Some(k) if k <= 0 => return Err(ToolError::bad_request("k must be greater than 0")),
            Some(k) => Some(k as usize),
            None => None,
        };

        let hits = kb.search_knowledge_base(query, k).await?;
        Ok(serde_json::json!({ "results": to_json(&hits)? }))
    }
}

pub struct AnswerTool;

#[async_trait]
impl Tool for AnswerTool {
    fn name(&self) -> &str {
        "rag_answer"
    }

    fn description(&self) -> &str {
        "Answer a question using only passages retrieved from the knowledge base"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question to answer" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let query = params["query"].as_str().unwrap_or("");
        if query.trim().is_empty() {
            return Err(ToolError::bad_request("query must not be empty"));
        }
        let answer = kb.rag_answer(query).await?;
        to_json(&answer)
    }
}

pub struct UpdateTool;

#[async_trait]
impl Tool for UpdateTool {
    fn name(&self) -> &str {
        "update_knowledge_base_from_files"
    }

    fn description(&self) -> &str {
        "Index or refresh files and directories; recorded files not listed are removed"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_paths": {
                    "type": "string",
                    "description": "Files or directories separated by ';', ',' or newlines"
                }
            },
            "required": ["file_paths"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let paths = params["file_paths"].as_str().unwrap_or("");
        let report = kb.update_knowledge_base_from_files(paths).await?;
        to_json(&report)
    }
}

pub struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str {
        "add_to_knowledge_base"
    }

    fn description(&self) -> &str {
        "Add a piece of text to the knowledge base"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to index" },
                "source": { "type": "string", "description": "Source label", "default": "user_input" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let content = params["content"].as_str().unwrap_or("");
        let source = params["source"].as_str().unwrap_or("user_input");
        let chunks = kb.add_to_knowledge_base(content, source).await?;
        Ok(serde_json::json!({ "source": format!("memory://{}", source.trim()), "chunks": chunks }))
    }
}

pub struct SourcesTool;

#[async_trait]
impl Tool for SourcesTool {
    fn name(&self) -> &str {
        "list_sources"
    }

    fn description(&self) -> &str {
        "List indexed sources with chunk counts and indexing times"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let records = kb.list_sources().await?;
        Ok(serde_json::json!({ "sources": to_json(&summarize(&records))? }))
    }
}

pub struct CreateTempTool;

#[async_trait]
impl Tool for CreateTempTool {
    fn name(&self) -> &str {
        "create_temp_knowledge_base"
    }

    fn description(&self) -> &str {
        "Build a temporary knowledge base for this session from files or directories, replacing any earlier one"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "string",
                    "description": "Files or directories separated by ';', ',' or newlines"
                }
            },
            "required": ["paths"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let paths = params["paths"].as_str().unwrap_or("");
        let summary = kb.create_temp_knowledge_base(paths).await?;
        to_json(&summary)
    }
}

pub struct SearchTempTool;

#[async_trait]
impl Tool for SearchTempTool {
    fn name(&self) -> &str {
        "search_temp_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the temporary knowledge base created with create_temp_knowledge_base"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "k": { "type": "integer", "description": "Max results (default: retrieval.top_k)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, kb: &KnowledgeBase) -> Result<Value, ToolError> {
        let query = params["query"].as_str().unwrap_or("");
        let k = match params.get("k").and_then(|v| v.as_i64()) {
            Some(k) if k <= 0 => return Err(ToolError::bad_request("k must be greater than 0")),
            Some(k) => Some(k as usize),
            None => None,
        };
        let hits = kb.search_temp_knowledge_base(query, k).await?;
        Ok(serde_json::json!({ "results": to_json(&hits)? }))
    }
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(AnswerTool));
        registry.register(Box::new(UpdateTool));
        registry.register(Box::new(AddTool));
        registry.register(Box::new(SourcesTool));
        registry.register(Box::new(CreateTempTool));
        registry.register(Box::new(SearchTempTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check `params` against the `required` list and the primitive property types of `schema`.
pub fn validate_params(schema: &Value, params: &Value) -> Result<(), ToolError> {
    let obj = params
        .as_object()
        .ok_or_else(|| ToolError::bad_request("parameters must be a JSON object"))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(field) {
                return Err(ToolError::bad_request(format!(
                    "missing required parameter: {}",
                    field
                )));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(expected) = props.get(key).and_then(|p| p.get("type")).and_then(|t| t.as_str())
            else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                _ => true,
            };
            if !ok {
                return Err(ToolError::bad_request(format!(
                    "parameter '{}' must be of type {}",
                    key, expected
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registered_by_name() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 7);
        for name in [
            "search_knowledge_base",
            "rag_answer",
            "update_knowledge_base_from_files",
            "add_to_knowledge_base",
            "list_sources",
            "create_temp_knowledge_base",
            "search_temp_knowledge_base",
        ] {
            assert!(registry.find(name).is_some(), "missing {}", name);
        }
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn validate_required_and_types() {
        let schema = SearchTool.parameters_schema();
        assert!(validate_params(&schema, &serde_json::json!({ "query": "x" })).is_ok());
        assert!(validate_params(&schema, &serde_json::json!({ "query": "x", "k": 2 })).is_ok());

        let missing = validate_params(&schema, &serde_json::json!({})).unwrap_err();
        assert_eq!(missing.code, "bad_request");
        assert!(missing.message.contains("query"));

        assert!(validate_params(&schema, &serde_json::json!({ "query": 3 })).is_err());
        assert!(validate_params(&schema, &serde_json::json!({ "query": "x", "k": "2" })).is_err());
        assert!(validate_params(&schema, &serde_json::json!("query")).is_err());
    }

    #[test]
    fn pipeline_error_keeps_code_and_stage() {
        let e = PipelineError::new(
            crate::pipeline::Stage::Compose,
            RagError::GenerationFailed("boom".to_string()),
        );
        let t = ToolError::from(e);
        assert_eq!(t.code, "generation_failed");
        assert!(t.message.contains("compose"));
    }

    #[test]
    fn tool_error_displays_code_and_message() {
        let e = ToolError::bad_request("query must not be empty");
        assert_eq!(e.to_string(), "bad_request: query must not be empty");
        let wrapped = anyhow::Error::from(e);
        assert_eq!(format!("{:#}", wrapped), "bad_request: query must not be empty");
    }
}
