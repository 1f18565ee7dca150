//! Web Search Tool
//!
//! Queries a Serper-style search endpoint and formats the organic hits as
//! the observation text, attaching the raw result array as structured data.

use async_trait::async_trait;
use serde_json::Value;

use crew_core::{
    error::{CrewError, Result},
    tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema},
};

const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";
const DEFAULT_LIMIT: i64 = 5;

/// Tool that performs web searches against a Serper-style API
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// Configure from `SEARCH_API_KEY` and optional `SEARCH_API_ENDPOINT`
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("SEARCH_API_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
            std::env::var("SEARCH_API_KEY").ok(),
        )
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search".into(),
            description: "Search the web and return the top organic results".into(),
            parameters: vec![
                ParameterSchema {
                    name: "query".into(),
                    param_type: "string".into(),
                    description: "The search query".into(),
                    required: true,
                    default: None,
                    enum_values: None,
                },
                ParameterSchema {
                    name: "limit".into(),
                    param_type: "integer".into(),
                    description: "Maximum number of results to return".into(),
                    required: false,
                    default: Some(serde_json::json!(DEFAULT_LIMIT)),
                    enum_values: None,
                },
            ],
            category: Some("search".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let Some(api_key) = &self.api_key else {
            return Ok(ToolResult::failure(
                "web_search",
                "search API key not configured (set SEARCH_API_KEY)",
            ));
        };
        let query = call
            .arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| CrewError::ToolValidation("query must be a string".into()))?;
        let limit = call
            .arguments
            .get("limit")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_LIMIT)
            .max(1) as usize;

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", api_key)
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await
            .map_err(|e| CrewError::ToolExecution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::failure(
                "web_search",
                format!("search request failed with status {status}"),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CrewError::ToolExecution(e.to_string()))?;
        let hits = payload
            .get("organic")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        tracing::debug!(query, hits = hits.len(), "search completed");

        if hits.is_empty() {
            return Ok(ToolResult::success("web_search", "no results"));
        }
        let shown: Vec<Value> = hits.into_iter().take(limit).collect();
        Ok(ToolResult::success("web_search", format_hits(&shown))
            .with_data(Value::Array(shown)))
    }
}

/// Render hits as a numbered title/link/snippet list
fn format_hits(hits: &[Value]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let title = hit.get("title").and_then(Value::as_str).unwrap_or("(untitled)");
            let link = hit.get("link").and_then(Value::as_str).unwrap_or("");
            let snippet = hit.get("snippet").and_then(Value::as_str).unwrap_or("");
            format!("{}. {title}\n   {link}\n   {snippet}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_format_hits() {
        let hits = vec![
            serde_json::json!({
                "title": "Rust",
                "link": "https://rust-lang.org",
                "snippet": "A language empowering everyone.",
            }),
            serde_json::json!({ "link": "https://example.com" }),
        ];
        let text = format_hits(&hits);
        assert!(text.starts_with("1. Rust\n"));
        assert!(text.contains("https://rust-lang.org"));
        assert!(text.contains("2. (untitled)"));
    }

    #[tokio::test]
    async fn test_missing_key_is_failure_result() {
        let tool = WebSearchTool::new(DEFAULT_ENDPOINT, None);
        let mut arguments = Map::new();
        arguments.insert("query".into(), Value::String("anything".into()));

        let result = tool.execute(&ToolCall::new("web_search", arguments)).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("SEARCH_API_KEY"));
    }
}
