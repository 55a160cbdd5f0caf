/// REST client for the tool integration provider
///
/// - `POST {base}/tools/execute` with `{ user_id, tool, arguments }`
/// - `GET {base}/tools?user_id=..&apps=..&tools=..`
///
/// Execution responses follow the `{ successful, data, error }` envelope;
/// an unsuccessful envelope is reported as a provider error.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::ToolSettings;
use crate::providers::{ToolDescriptor, ToolFilter, ToolProvider};
use crate::runtime::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct HttpToolProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolListing {
    Items { items: Vec<ToolDescriptor> },
    Plain(Vec<ToolDescriptor>),
}

impl HttpToolProvider {
    pub fn from_settings(settings: &ToolSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn read_json(request: RequestBuilder, what: &str) -> EngineResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Provider(format!("{what} request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::Provider(format!("failed to read {what} response: {e}")))?;

        if !status.is_success() {
            return Err(EngineError::Provider(format!("{what} returned {status}: {text}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| EngineError::Provider(format!("invalid {what} response: {e}")))
    }
}

/// Unwrap the `{ successful, data, error }` envelope
fn unwrap_envelope(tool: &str, body: Value) -> EngineResult<Value> {
    if body.get("successful").and_then(Value::as_bool) == Some(false) {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(EngineError::Provider(format!("tool '{tool}' failed: {reason}")));
    }

    match body {
        Value::Object(mut map) if map.contains_key("data") => Ok(map.remove("data").unwrap_or(Value::Null)),
        other => Ok(other),
    }
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    async fn execute(&self, user_id: &str, tool: &str, arguments: Value) -> EngineResult<Value> {
        tracing::debug!("🔧 Executing tool '{}' for user '{}'", tool, user_id);

        let request = self
            .authorize(self.http.post(format!("{}/tools/execute", self.base_url)))
            .json(&json!({
                "user_id": user_id,
                "tool": tool,
                "arguments": arguments,
            }));

        let body = Self::read_json(request, "tool execution").await?;
        unwrap_envelope(tool, body)
    }

    async fn list_tools(&self, user_id: &str, filter: &ToolFilter) -> EngineResult<Vec<ToolDescriptor>> {
        let mut query = vec![("user_id", user_id.to_string())];
        if !filter.apps.is_empty() {
            query.push(("apps", filter.apps.join(",")));
        }
        if !filter.tools.is_empty() {
            query.push(("tools", filter.tools.join(",")));
        }

        let request = self
            .authorize(self.http.get(format!("{}/tools", self.base_url)))
            .query(&query);

        let body = Self::read_json(request, "tool listing").await?;
        let listing: ToolListing = serde_json::from_value(body)
            .map_err(|e| EngineError::Provider(format!("unexpected tool listing shape: {e}")))?;

        Ok(match listing {
            ToolListing::Items { items } => items,
            ToolListing::Plain(items) => items,
        })
    }
}
