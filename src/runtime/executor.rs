/// Node execution handlers for the five node kinds
///
/// Each handler reads the current execution state and its node's config and
/// returns a partial state update:
/// - Input: records the caller's input
/// - Llm: one completion from the language model
/// - ToolCall: one tool invocation through the integration provider
/// - Agent: bounded loop of completions and tool invocations
/// - Output: selects the run's final value

use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::providers::{CompletionParams, LanguageModel, ToolFilter, ToolProvider};
use crate::runtime::error::{EngineError, EngineResult};
use crate::runtime::graph::LoadedNode;
use crate::runtime::path::{render_template, resolve, to_text};
use crate::workflow::node_config::{
    AgentConfig, EngineConfig, InputConfig, LlmConfig, ModelParams, NodeSpec, OutputConfig,
    ToolCallConfig,
};
use crate::workflow::types::{ExecutionState, Message};

/// Partial state produced by one node
///
/// Merged into the running state by the execution loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    /// Replaces the current input
    pub input: Option<String>,
    /// Replaces the current output
    pub current_output: Option<String>,
    /// Sets the run's final output
    pub output: Option<String>,
    /// Appended to the message history
    pub messages: Vec<Message>,
    /// Stored under the node's id in `node_results`
    pub result: Option<Value>,
    /// Merged into run metadata
    pub metadata: Map<String, Value>,
}

impl StateUpdate {
    /// Merge this update into `state` on behalf of `node_id`
    pub fn apply_to(self, node_id: &str, state: &mut ExecutionState) {
        if let Some(input) = self.input {
            state.input = input;
        }
        if let Some(current) = self.current_output {
            state.current_output = Some(current);
        }
        if let Some(output) = self.output {
            state.output = Some(output);
        }
        state.messages.extend(self.messages);
        if let Some(result) = self.result {
            state.node_results.insert(node_id.to_string(), result);
        }
        state.metadata.extend(self.metadata);
    }
}

/// A tool request parsed from an agent reply
#[derive(Debug, Clone, PartialEq)]
struct ToolRequest {
    tool: String,
    arguments: Value,
}

/// Node executor that dispatches on node kind
///
/// Holds the shared providers; one executor serves any number of runs.
pub struct NodeExecutor {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolProvider>,
}

impl std::fmt::Debug for NodeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeExecutor").finish_non_exhaustive()
    }
}

impl NodeExecutor {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Arc<dyn ToolProvider>) -> Self {
        Self { model, tools }
    }

    /// Execute a single node against the current state
    pub async fn execute_node(
        &self,
        node: &LoadedNode,
        state: &ExecutionState,
        config: &EngineConfig,
    ) -> EngineResult<StateUpdate> {
        tracing::debug!("🚀 Executing node: {} ({})", node.id, node.kind());

        match &node.spec {
            NodeSpec::Input(input) => Ok(self.execute_input_node(input, state)),
            NodeSpec::Llm(llm) => self.execute_llm_node(llm, state).await,
            NodeSpec::ToolCall(tool) => self.execute_tool_call_node(node, tool, state, config).await,
            NodeSpec::Agent(agent) => self.execute_agent_node(node, agent, state, config).await,
            NodeSpec::Output(output) => self.execute_output_node(output, state),
        }
    }

    fn execute_input_node(&self, config: &InputConfig, state: &ExecutionState) -> StateUpdate {
        let input = match (&config.default, state.input.is_empty()) {
            (Some(default), true) => default.clone(),
            _ => state.input.clone(),
        };

        StateUpdate {
            input: Some(input.clone()),
            result: Some(Value::String(input)),
            ..StateUpdate::default()
        }
    }

    async fn execute_llm_node(&self, config: &LlmConfig, state: &ExecutionState) -> EngineResult<StateUpdate> {
        let prompt = render_template(&config.prompt, state)?;

        let mut messages = Vec::with_capacity(state.messages.len() + 2);
        if let Some(system) = &config.system {
            messages.push(Message::system(render_template(system, state)?));
        }
        if config.include_history {
            messages.extend(state.messages.iter().cloned());
        }
        let user = Message::user(prompt);
        messages.push(user.clone());

        let completion = self.model.complete(&messages, &completion_params(&config.params)).await?;
        tracing::debug!("🧠 Completion received ({} chars)", completion.len());

        Ok(StateUpdate {
            current_output: Some(completion.clone()),
            messages: vec![user, Message::assistant(completion.clone())],
            result: Some(Value::String(completion)),
            ..StateUpdate::default()
        })
    }

    async fn execute_tool_call_node(
        &self,
        node: &LoadedNode,
        config: &ToolCallConfig,
        state: &ExecutionState,
        engine: &EngineConfig,
    ) -> EngineResult<StateUpdate> {
        let tool_input = match &config.input_path {
            Some(path) => resolve(&state.node_results, path)?.clone(),
            None => Value::String(current_or_input(state)),
        };

        let mut arguments = config.arguments.clone();
        arguments.insert(config.input_key.clone(), tool_input);

        let user_id = user_for(node, config.user_id.as_deref(), engine)?;
        tracing::debug!("🔧 Calling tool '{}' for user '{}'", config.tool, user_id);

        let result = self.tools.execute(user_id, &config.tool, Value::Object(arguments)).await?;

        Ok(StateUpdate {
            current_output: Some(to_text(&result)),
            result: Some(result),
            ..StateUpdate::default()
        })
    }

    /// Run the agent loop
    ///
    /// Tool discovery, every completion and every tool invocation count
    /// against the budget; the agent never exceeds it. A reply that is not a tool request ends the
    /// loop as the answer. When the budget runs out the last reply is used.
    async fn execute_agent_node(
        &self,
        node: &LoadedNode,
        config: &AgentConfig,
        state: &ExecutionState,
        engine: &EngineConfig,
    ) -> EngineResult<StateUpdate> {
        let budget = config.max_iterations.unwrap_or(engine.max_agent_iterations);
        let user_id = user_for(node, config.user_id.as_deref(), engine)?;
        let params = completion_params(&config.params);

        let mut calls = 0;
        let mut allowed = config.tools.clone();
        if !config.apps.is_empty() {
            let filter = ToolFilter { apps: config.apps.clone(), tools: Vec::new() };
            let discovered = self.tools.list_tools(user_id, &filter).await?;
            calls += 1;
            for tool in discovered {
                if !allowed.contains(&tool.name) {
                    allowed.push(tool.name);
                }
            }
        }

        let task = Message::user(render_template(&config.prompt, state)?);
        let mut transcript = vec![Message::system(agent_system_prompt(&config.instructions, &allowed))];
        if config.include_history {
            transcript.extend(state.messages.iter().cloned());
        }
        transcript.push(task.clone());

        let mut tool_calls = Vec::new();
        let mut last_reply = String::new();
        let mut answer = None;

        while calls < budget {
            let reply = self.model.complete(&transcript, &params).await?;
            calls += 1;
            transcript.push(Message::assistant(reply.clone()));

            let Some(request) = parse_tool_request(&reply) else {
                answer = Some(reply);
                break;
            };
            last_reply = reply;

            if !allowed.contains(&request.tool) {
                tracing::warn!("⚠️ Agent '{}' asked for unavailable tool '{}'", node.id, request.tool);
                transcript.push(Message::user(format!(
                    "Tool `{}` is not available. Use one of: {}",
                    request.tool,
                    allowed.join(", ")
                )));
                continue;
            }

            if calls >= budget {
                break;
            }

            let result = self.tools.execute(user_id, &request.tool, request.arguments.clone()).await?;
            calls += 1;
            transcript.push(Message::user(format!("Result of `{}`: {}", request.tool, result)));
            tool_calls.push(json!({
                "tool": request.tool,
                "arguments": request.arguments,
                "result": result,
            }));
        }

        let exhausted = answer.is_none();
        if exhausted {
            tracing::warn!("⏸️ Agent '{}' used its budget of {} calls without concluding", node.id, budget);
        }
        let answer = answer.unwrap_or(last_reply);

        Ok(StateUpdate {
            current_output: Some(answer.clone()),
            messages: vec![task, Message::assistant(answer.clone())],
            result: Some(json!({
                "answer": answer,
                "tool_calls": tool_calls,
                "calls": calls,
                "exhausted": exhausted,
            })),
            ..StateUpdate::default()
        })
    }

    fn execute_output_node(&self, config: &OutputConfig, state: &ExecutionState) -> EngineResult<StateUpdate> {
        let output = match &config.source {
            Some(path) => to_text(resolve(&state.node_results, path)?),
            None => current_or_input(state),
        };

        Ok(StateUpdate {
            output: Some(output.clone()),
            result: Some(Value::String(output)),
            ..StateUpdate::default()
        })
    }
}

fn current_or_input(state: &ExecutionState) -> String {
    state.current_output.clone().unwrap_or_else(|| state.input.clone())
}

fn completion_params(params: &ModelParams) -> CompletionParams {
    CompletionParams {
        model: params.model.clone(),
        temperature: params.temperature,
        max_tokens: params.max_tokens,
    }
}

/// Node-level user id, else the workflow's
fn user_for<'a>(node: &LoadedNode, own: Option<&'a str>, engine: &'a EngineConfig) -> EngineResult<&'a str> {
    own.or(engine.user_id.as_deref()).ok_or_else(|| {
        EngineError::Configuration(format!("node '{}' ({}) has no user id to call tools with", node.id, node.kind()))
    })
}

fn agent_system_prompt(instructions: &str, tools: &[String]) -> String {
    let mut prompt = String::new();
    if !instructions.trim().is_empty() {
        prompt.push_str(instructions.trim());
        prompt.push_str("\n\n");
    }
    if tools.is_empty() {
        prompt.push_str("No tools are available. Answer directly.");
    } else {
        prompt.push_str(&format!(
            "Available tools: {}.\nTo call a tool reply with only a JSON object \
             {{\"tool\": \"<name>\", \"arguments\": {{...}}}}. \
             Any other reply is taken as your final answer.",
            tools.join(", ")
        ));
    }
    prompt
}

/// A reply is a tool request when it is a JSON object with a string "tool"
fn parse_tool_request(reply: &str) -> Option<ToolRequest> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let value: Value = serde_json::from_str(body).ok()?;
    let tool = value.get("tool")?.as_str()?.to_string();
    let arguments = value.get("arguments").cloned().unwrap_or_else(|| json!({}));
    Some(ToolRequest { tool, arguments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedModel, StaticTools};
    use crate::workflow::types::{Node, NodeKind};

    fn loaded(node: Node) -> LoadedNode {
        LoadedNode {
            id: node.id.clone(),
            label: None,
            spec: NodeSpec::parse(&node).unwrap(),
        }
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            user_id: Some("user-1".to_string()),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_parse_tool_request() {
        let req = parse_tool_request(r#"{"tool": "SEARCH", "arguments": {"q": "rust"}}"#).unwrap();
        assert_eq!(req.tool, "SEARCH");
        assert_eq!(req.arguments, json!({"q": "rust"}));

        let fenced = parse_tool_request("```json\n{\"tool\": \"SEARCH\"}\n```").unwrap();
        assert_eq!(fenced.arguments, json!({}));

        assert!(parse_tool_request("The answer is 42").is_none());
        assert!(parse_tool_request(r#"{"answer": "42"}"#).is_none());
    }

    #[test]
    fn test_apply_update() {
        let mut state = ExecutionState::new("in");
        let update = StateUpdate {
            current_output: Some("out".into()),
            messages: vec![Message::user("q")],
            result: Some(json!(1)),
            ..StateUpdate::default()
        };
        update.apply_to("n1", &mut state);
        assert_eq!(state.input, "in");
        assert_eq!(state.current_output.as_deref(), Some("out"));
        assert_eq!(state.output, None);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.node_results["n1"], json!(1));
    }

    #[tokio::test]
    async fn test_llm_node_builds_messages() {
        let model = Arc::new(ScriptedModel::new(["a summary"]));
        let executor = NodeExecutor::new(model.clone(), Arc::new(StaticTools::new()));
        let node = loaded(Node::new("llm", NodeKind::Llm).with_config(json!({
            "prompt": "Summarize: {{input}}",
            "system": "Be brief"
        })));

        let mut state = ExecutionState::new("long text");
        state.messages.push(Message::assistant("earlier"));

        let update = executor.execute_node(&node, &state, &engine_config()).await.unwrap();
        assert_eq!(update.current_output.as_deref(), Some("a summary"));
        assert_eq!(update.output, None);
        assert_eq!(
            update.messages,
            vec![Message::user("Summarize: long text"), Message::assistant("a summary")]
        );

        let sent = &model.requests()[0];
        assert_eq!(sent[0], Message::system("Be brief"));
        assert_eq!(sent[1], Message::assistant("earlier"));
        assert_eq!(sent[2], Message::user("Summarize: long text"));
    }

    #[tokio::test]
    async fn test_tool_call_resolves_path() {
        let tools = Arc::new(StaticTools::new().with_tool("CREATE_ISSUE", None, json!({"number": 12})));
        let executor = NodeExecutor::new(Arc::new(ScriptedModel::new(["unused"])), tools.clone());
        let node = loaded(Node::new("issue", NodeKind::ToolCall).with_config(json!({
            "tool": "CREATE_ISSUE",
            "input_path": "fetch.items.0.title",
            "input_key": "title",
            "arguments": {"repo": "acme/app"}
        })));

        let mut state = ExecutionState::new("");
        state.node_results.insert("fetch".into(), json!({"items": [{"title": "Crash on save"}]}));

        let update = executor.execute_node(&node, &state, &engine_config()).await.unwrap();
        assert_eq!(update.result, Some(json!({"number": 12})));
        assert_eq!(update.current_output.as_deref(), Some(r#"{"number":12}"#));

        let calls = tools.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_id, "user-1");
        assert_eq!(calls[0].arguments, json!({"repo": "acme/app", "title": "Crash on save"}));
    }

    #[tokio::test]
    async fn test_tool_call_without_user_is_configuration_error() {
        let tools = Arc::new(StaticTools::new().with_tool("PING", None, json!("pong")));
        let executor = NodeExecutor::new(Arc::new(ScriptedModel::new(["unused"])), tools.clone());
        let node = loaded(Node::new("ping", NodeKind::ToolCall).with_config(json!({"tool": "PING"})));

        let err = executor
            .execute_node(&node, &ExecutionState::new("x"), &EngineConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(tools.calls(), 0);
    }

    #[tokio::test]
    async fn test_agent_calls_tool_then_answers() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"tool": "WEATHER", "arguments": {"city": "Oslo"}}"#,
            "It is 4°C in Oslo.",
        ]));
        let tools = Arc::new(StaticTools::new().with_tool("WEATHER", Some("weather"), json!({"temp": 4})));
        let executor = NodeExecutor::new(model.clone(), tools.clone());
        let node = loaded(Node::new("agent", NodeKind::Agent).with_config(json!({
            "instructions": "You answer weather questions.",
            "apps": ["weather"]
        })));

        let update = executor
            .execute_node(&node, &ExecutionState::new("Weather in Oslo?"), &engine_config())
            .await
            .unwrap();

        assert_eq!(update.current_output.as_deref(), Some("It is 4°C in Oslo."));
        let result = update.result.unwrap();
        // list_tools, completion, WEATHER, completion
        assert_eq!(result["calls"], json!(4));
        assert_eq!(tools.listings(), 1);
        assert_eq!(result["exhausted"], json!(false));
        assert_eq!(result["tool_calls"][0]["result"], json!({"temp": 4}));
        assert_eq!(tools.invocations()[0].arguments, json!({"city": "Oslo"}));

        let second = &model.requests()[1];
        assert!(second.last().unwrap().content.contains("Result of `WEATHER`"));
    }

    #[tokio::test]
    async fn test_agent_rejects_unlisted_tool_without_calling_it() {
        let model = Arc::new(ScriptedModel::new([r#"{"tool": "DELETE_REPO"}"#, "Done without tools."]));
        let tools = Arc::new(StaticTools::new().with_tool("DELETE_REPO", None, json!(true)));
        let executor = NodeExecutor::new(model.clone(), tools.clone());
        let node = loaded(Node::new("agent", NodeKind::Agent).with_config(json!({"tools": ["SEARCH"]})));

        let update = executor
            .execute_node(&node, &ExecutionState::new("go"), &engine_config())
            .await
            .unwrap();
        assert_eq!(update.current_output.as_deref(), Some("Done without tools."));
        assert_eq!(tools.calls(), 0);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_output_node_source() {
        let executor = NodeExecutor::new(Arc::new(ScriptedModel::new(["x"])), Arc::new(StaticTools::new()));
        let node = loaded(Node::new("out", NodeKind::Output).with_config(json!({"source": "llm"})));

        let mut state = ExecutionState::new("in");
        state.node_results.insert("llm".into(), json!("final words"));
        let update = executor.execute_node(&node, &state, &engine_config()).await.unwrap();
        assert_eq!(update.output.as_deref(), Some("final words"));

        let missing = loaded(Node::new("out", NodeKind::Output).with_config(json!({"source": "nope"})));
        let err = executor.execute_node(&missing, &state, &engine_config()).await.unwrap_err();
        assert_eq!(err.kind(), "data");
    }
}
