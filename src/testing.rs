/// Deterministic in-process providers
///
/// Used by the unit and HTTP tests to drive workflows without network access.
/// Both stubs count every call they receive.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::providers::{CompletionParams, LanguageModel, ToolDescriptor, ToolFilter, ToolProvider};
use crate::runtime::error::{EngineError, EngineResult};
use crate::workflow::types::Message;

/// Language model that replays a fixed script of replies
///
/// Once the script is exhausted the last reply is repeated.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<EngineResult<String>>>,
    last: Mutex<Option<EngineResult<String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// Every call fails with a provider error
    pub fn failing(reason: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(EngineError::Provider(reason.to_string()))])),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Message lists received so far, oldest first
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: &[Message], _params: &CompletionParams) -> EngineResult<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| EngineError::Provider("scripted model poisoned".to_string()))?;

        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(EngineError::Provider("scripted model has no replies".to_string()))),
        }
    }
}

/// One recorded tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub user_id: String,
    pub tool: String,
    pub arguments: Value,
}

/// Tool provider answering from a fixed table
#[derive(Debug, Default)]
pub struct StaticTools {
    results: HashMap<String, EngineResult<Value>>,
    descriptors: Vec<ToolDescriptor>,
    invocations: Mutex<Vec<ToolInvocation>>,
    listings: AtomicUsize,
}

impl StaticTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool returning `result`
    pub fn with_tool(mut self, name: &str, app: Option<&str>, result: Value) -> Self {
        self.descriptors.push(ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} test tool"),
            app: app.map(str::to_string),
            input_schema: Value::Null,
        });
        self.results.insert(name.to_string(), Ok(result));
        self
    }

    /// Register a tool that always fails
    pub fn with_failing_tool(mut self, name: &str, reason: &str) -> Self {
        self.results
            .insert(name.to_string(), Err(EngineError::Provider(reason.to_string())));
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().map(|i| i.clone()).unwrap_or_default()
    }

    /// Number of `execute` calls
    pub fn calls(&self) -> usize {
        self.invocations.lock().map(|i| i.len()).unwrap_or_default()
    }

    /// Number of `list_tools` calls
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolProvider for StaticTools {
    async fn execute(&self, user_id: &str, tool: &str, arguments: Value) -> EngineResult<Value> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(ToolInvocation {
                user_id: user_id.to_string(),
                tool: tool.to_string(),
                arguments,
            });
        }

        self.results
            .get(tool)
            .cloned()
            .unwrap_or_else(|| Err(EngineError::Provider(format!("unknown tool '{tool}'"))))
    }

    async fn list_tools(&self, _user_id: &str, filter: &ToolFilter) -> EngineResult<Vec<ToolDescriptor>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .descriptors
            .iter()
            .filter(|d| {
                filter.apps.is_empty()
                    || d.app.as_ref().is_some_and(|app| filter.apps.contains(app))
            })
            .filter(|d| filter.tools.is_empty() || filter.tools.contains(&d.name))
            .cloned()
            .collect())
    }
}
