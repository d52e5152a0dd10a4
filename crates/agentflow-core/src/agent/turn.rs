//! Turn Executor: runs one agent against one input until it produces a
//! final answer, errors upstream, or runs out of iterations.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;

use crate::config::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOOL_RESULT_CHARS};
use crate::error::FlowError;
use crate::llm::{CompletionRequest, FinishReason, LlmError, ModelClient, TokenUsage};
use crate::models::{AgentConfig, ConversationMessage, ToolCall};
use crate::tools::{ToolArguments, ToolDefinition, ToolRegistry, ToolResult};

#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    /// Hard cap on model round-trips per turn.
    pub max_iterations: u32,
    /// Max characters of a tool result placed in the transcript. 0 disables truncation.
    pub max_tool_result_chars: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
        }
    }
}

/// One tool call and its outcome, as observed by the turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    pub call: ToolCall,
    /// Parsed arguments, or the raw string when they were not valid JSON.
    pub params: serde_json::Value,
    pub result: ToolResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnTermination {
    FinalAnswer,
    IterationExhausted,
    UpstreamError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub success: bool,
    pub message: String,
    pub tool_calls: Vec<ToolExecution>,
    pub total_execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub iterations: u32,
    pub termination: TurnTermination,
    /// Summed over every round-trip that reported usage.
    pub usage: TokenUsage,
}

/// Terminal state of the loop.
enum Outcome {
    FinalAnswer(String),
    IterationExhausted,
    UpstreamError(LlmError),
}

enum Step {
    Continue,
    Done(Outcome),
}

/// Mutable state owned by a single turn.
struct TurnState {
    iteration: u32,
    transcript: Vec<ConversationMessage>,
    trace: Vec<ToolExecution>,
    usage: TokenUsage,
}

pub struct TurnExecutor {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolRegistry>,
    options: TurnOptions,
}

impl TurnExecutor {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<dyn ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            options: TurnOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TurnOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one turn. Never returns an error: every failure is reported in
    /// the `TurnResult` together with the partial tool trace.
    pub async fn execute(
        &self,
        agent: &AgentConfig,
        user_message: &str,
        history: &[ConversationMessage],
    ) -> TurnResult {
        let started = Instant::now();

        let mut transcript = Vec::with_capacity(history.len() + 2);
        transcript.push(ConversationMessage::system(agent.role_prompt.clone()));
        transcript.extend_from_slice(history);
        transcript.push(ConversationMessage::user(user_message));

        let tool_defs = self.resolve_tool_definitions(agent);
        let mut state = TurnState {
            iteration: 0,
            transcript,
            trace: Vec::new(),
            usage: TokenUsage::default(),
        };

        tracing::info!(
            agent_id = %agent.id,
            model = %agent.model,
            client = self.model.name(),
            tools = tool_defs.len(),
            "[TurnExecutor] Starting turn"
        );

        let outcome = loop {
            match self.advance(agent, &tool_defs, &mut state).await {
                Step::Continue => continue,
                Step::Done(outcome) => break outcome,
            }
        };

        let total_execution_time_ms = started.elapsed().as_millis() as u64;
        let (success, message, error, termination) = match outcome {
            Outcome::FinalAnswer(text) => (true, text, None, TurnTermination::FinalAnswer),
            Outcome::IterationExhausted => (
                false,
                String::new(),
                Some(FlowError::IterationExhausted(self.options.max_iterations).to_string()),
                TurnTermination::IterationExhausted,
            ),
            Outcome::UpstreamError(e) => (
                false,
                String::new(),
                Some(FlowError::from(e).to_string()),
                TurnTermination::UpstreamError,
            ),
        };

        if let Some(ref err) = error {
            tracing::warn!(
                agent_id = %agent.id,
                iterations = state.iteration,
                "[TurnExecutor] Turn failed: {}",
                err
            );
        } else {
            tracing::info!(
                agent_id = %agent.id,
                iterations = state.iteration,
                tool_calls = state.trace.len(),
                elapsed_ms = total_execution_time_ms,
                "[TurnExecutor] Turn completed"
            );
        }

        TurnResult {
            success,
            message,
            tool_calls: state.trace,
            total_execution_time_ms,
            error,
            iterations: state.iteration,
            termination,
            usage: state.usage,
        }
    }

    /// One model round-trip plus, if requested, one round of tool calls.
    async fn advance(
        &self,
        agent: &AgentConfig,
        tool_defs: &[ToolDefinition],
        state: &mut TurnState,
    ) -> Step {
        if state.iteration >= self.options.max_iterations {
            return Step::Done(Outcome::IterationExhausted);
        }
        state.iteration += 1;

        let request = CompletionRequest {
            model: &agent.model,
            messages: &state.transcript,
            tools: if tool_defs.is_empty() { None } else { Some(tool_defs) },
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
        };

        let response = match self.model.complete(&request).await {
            Ok(response) => response,
            Err(e) => return Step::Done(Outcome::UpstreamError(e)),
        };

        if let Some(usage) = &response.usage {
            state.usage.input_tokens += usage.input_tokens;
            state.usage.output_tokens += usage.output_tokens;
        }
        if response.finish_reason == FinishReason::MaxTokens {
            tracing::warn!(
                agent_id = %agent.id,
                model = %response.model,
                max_tokens = agent.max_tokens,
                "[TurnExecutor] Response cut off at the token limit"
            );
        }

        if !response.has_tool_calls() {
            return Step::Done(Outcome::FinalAnswer(response.message.content));
        }

        let calls = response.message.requested_tool_calls().to_vec();
        tracing::debug!(
            agent_id = %agent.id,
            iteration = state.iteration,
            calls = calls.len(),
            "[TurnExecutor] Model requested tool calls"
        );
        state.transcript.push(response.message);

        let executions = join_all(calls.iter().map(|call| self.execute_tool_call(agent, call))).await;

        for execution in executions {
            let content = render_tool_message(&execution.result, self.options.max_tool_result_chars);
            state
                .transcript
                .push(ConversationMessage::tool_result(execution.call.id.clone(), content));
            state.trace.push(execution);
        }

        Step::Continue
    }

    fn resolve_tool_definitions(&self, agent: &AgentConfig) -> Vec<ToolDefinition> {
        if !agent.has_tools() {
            return Vec::new();
        }
        let defs = self.tools.definitions(&agent.tools);
        if defs.len() < agent.tools.len() {
            let missing: Vec<&String> = agent
                .tools
                .iter()
                .filter(|id| !defs.iter().any(|d| &d.name == *id))
                .collect();
            tracing::warn!(
                agent_id = %agent.id,
                "[TurnExecutor] Enabled tools not found in registry: {:?}",
                missing
            );
        }
        defs
    }

    /// Execute one requested call. Every failure mode becomes a failed record.
    async fn execute_tool_call(&self, agent: &AgentConfig, call: &ToolCall) -> ToolExecution {
        let started_at = Utc::now();
        let started = Instant::now();

        let arguments = ToolArguments::parse(&call.arguments);
        let params = arguments.as_recorded();

        let result = match arguments {
            ToolArguments::Malformed { error, .. } => ToolResult::error(format!(
                "Invalid JSON arguments for tool '{}': {}",
                call.name, error
            )),
            ToolArguments::Parsed(_) if !agent.is_tool_enabled(&call.name) => {
                ToolResult::error(format!("Tool not available: {}", call.name))
            }
            ToolArguments::Parsed(value) => {
                match AssertUnwindSafe(self.tools.invoke(&call.name, value))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => ToolResult::error(
                        FlowError::ToolExecution(format!(
                            "Tool '{}' panicked: {}",
                            call.name,
                            panic_message(panic.as_ref())
                        ))
                        .to_string(),
                    ),
                }
            }
        };

        let execution_time_ms = started.elapsed().as_millis() as u64;
        if !result.success {
            tracing::debug!(
                tool = %call.name,
                call_id = %call.id,
                "[TurnExecutor] Tool call failed: {}",
                result.error.as_deref().unwrap_or("unknown")
            );
        }

        ToolExecution {
            call: call.clone(),
            params,
            result,
            started_at,
            finished_at: Utc::now(),
            execution_time_ms,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Tool result as placed in the transcript: `{success, data}` or `{success, error}`,
/// capped at `max_chars` characters.
fn render_tool_message(result: &ToolResult, max_chars: usize) -> String {
    let payload = if result.success {
        serde_json::json!({ "success": true, "data": result.data })
    } else {
        serde_json::json!({ "success": false, "error": result.error })
    };
    truncate_for_transcript(&payload.to_string(), max_chars)
}

fn truncate_for_transcript(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return s.to_string();
    }
    let total = s.chars().count();
    if total <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars).collect();
        format!("{}…[truncated {} chars]", kept, total - max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        text_response, tool_call_response, BarrierTool, FailingTool, PanickingTool, ScriptedModel,
    };
    use crate::tools::LocalToolRegistry;
    use std::time::Duration;

    fn executor(model: Arc<ScriptedModel>, registry: LocalToolRegistry) -> TurnExecutor {
        TurnExecutor::new(model, Arc::new(registry))
    }

    fn agent_with_tools(tools: &[&str]) -> AgentConfig {
        AgentConfig::new("tester", "You are a test agent.", "test-model").with_tools(tools.iter().copied())
    }

    #[tokio::test]
    async fn test_plain_answer_without_tools_omits_tool_parameter() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("Hello there")]));
        let exec = executor(model.clone(), LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&[]), "hi", &[]).await;

        assert!(result.success);
        assert_eq!(result.message, "Hello there");
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.termination, TurnTermination::FinalAnswer);
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].had_tools);
        assert_eq!(requests[0].messages[0], ConversationMessage::system("You are a test agent."));
        assert_eq!(requests[0].messages[1], ConversationMessage::user("hi"));
    }

    #[tokio::test]
    async fn test_history_sits_between_system_prompt_and_user_message() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("ok")]));
        let exec = executor(model.clone(), LocalToolRegistry::new());
        let history = vec![
            ConversationMessage::user("earlier question"),
            ConversationMessage::assistant("earlier answer"),
        ];

        exec.execute(&agent_with_tools(&[]), "now", &history).await;

        let messages = &model.requests()[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].content, "earlier answer");
        assert_eq!(messages[3].content, "now");
    }

    #[tokio::test]
    async fn test_tool_call_then_final_answer() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("call_1", "echo", r#"{"text":"ping"}"#)]),
            text_response("pong"),
        ]));
        let exec = executor(model.clone(), LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "say ping", &[]).await;

        assert!(result.success);
        assert_eq!(result.message, "pong");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_calls.len(), 1);
        let record = &result.tool_calls[0];
        assert!(record.result.success);
        assert_eq!(record.params, serde_json::json!({ "text": "ping" }));

        let second = &model.requests()[1];
        assert!(second.had_tools);
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.contains("ping"));
    }

    #[tokio::test]
    async fn test_usage_is_summed_across_round_trips() {
        let mut first = tool_call_response(vec![("call_1", "echo", r#"{"text":"a"}"#)]);
        first.usage = Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        });
        let mut second = text_response("cut");
        second.finish_reason = FinishReason::MaxTokens;
        second.usage = Some(TokenUsage {
            input_tokens: 150,
            output_tokens: 5,
        });
        let model = Arc::new(ScriptedModel::new(vec![first, second]));
        let exec = executor(model, LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "go", &[]).await;

        assert!(result.success);
        assert_eq!(result.message, "cut");
        assert_eq!(result.usage.input_tokens, 250);
        assert_eq!(result.usage.output_tokens, 25);
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_endless_tool_calls() {
        let model = Arc::new(ScriptedModel::repeating(tool_call_response(vec![(
            "call_x",
            "echo",
            r#"{"text":"again"}"#,
        )])));
        let exec = executor(model.clone(), LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "loop", &[]).await;

        assert!(!result.success);
        assert_eq!(result.termination, TurnTermination::IterationExhausted);
        assert_eq!(model.call_count(), 10);
        assert_eq!(result.iterations, 10);
        assert_eq!(result.tool_calls.len(), 10);
        assert!(result.error.unwrap().contains("10 iterations"));
    }

    #[tokio::test]
    async fn test_custom_iteration_cap_is_respected() {
        let model = Arc::new(ScriptedModel::repeating(tool_call_response(vec![(
            "c",
            "echo",
            r#"{"text":"x"}"#,
        )])));
        let exec = executor(model.clone(), LocalToolRegistry::with_builtins()).with_options(TurnOptions {
            max_iterations: 3,
            ..TurnOptions::default()
        });

        let result = exec.execute(&agent_with_tools(&["echo"]), "loop", &[]).await;
        assert!(!result.success);
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_failed_record() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("bad", "echo", "{\"text\": ")]),
            text_response("recovered"),
        ]));
        let exec = executor(model.clone(), LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "go", &[]).await;

        assert!(result.success);
        assert_eq!(result.message, "recovered");
        let record = &result.tool_calls[0];
        assert!(!record.result.success);
        assert!(record
            .result
            .error
            .as_deref()
            .unwrap()
            .starts_with("Invalid JSON arguments for tool 'echo'"));
        assert_eq!(record.params, serde_json::Value::String("{\"text\": ".to_string()));
        let tool_msg = model.requests()[1].messages.last().cloned().unwrap();
        assert!(tool_msg.content.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_independent_outcomes() {
        let mut registry = LocalToolRegistry::with_builtins();
        registry.register(Arc::new(PanickingTool));
        registry.register(Arc::new(FailingTool));
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![
                ("a", "echo", r#"{"text":"first"}"#),
                ("b", "panic_tool", "{}"),
                ("c", "failing_tool", "{}"),
                ("d", "echo", r#"{"text":"last"}"#),
            ]),
            text_response("done"),
        ]));
        let exec = executor(model, registry);
        let agent = agent_with_tools(&["echo", "panic_tool", "failing_tool"]);

        let result = exec.execute(&agent, "go", &[]).await;

        assert!(result.success);
        let ids: Vec<&str> = result.tool_calls.iter().map(|t| t.call.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(result.tool_calls[0].result.success);
        assert!(!result.tool_calls[1].result.success);
        assert_eq!(
            result.tool_calls[1].result.error.as_deref(),
            Some("Tool execution failed: Tool 'panic_tool' panicked: tool blew up")
        );
        assert!(!result.tool_calls[2].result.success);
        assert_eq!(
            result.tool_calls[2].result.error.as_deref(),
            Some("Tool execution failed: backend unavailable")
        );
        assert_eq!(
            result.tool_calls[3].result.data,
            Some(serde_json::json!({ "text": "last" }))
        );
    }

    #[tokio::test]
    async fn test_tool_calls_in_one_response_run_concurrently() {
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let mut registry = LocalToolRegistry::new();
        registry.register(Arc::new(BarrierTool::new(barrier)));
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("one", "barrier", "{}"), ("two", "barrier", "{}")]),
            text_response("both arrived"),
        ]));
        let exec = executor(model, registry);

        // Sequential execution would deadlock on the barrier.
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            exec.execute(&agent_with_tools(&["barrier"]), "go", &[]),
        )
        .await
        .expect("tool calls did not run concurrently");

        assert!(result.success);
        assert!(result.tool_calls.iter().all(|t| t.result.success));
    }

    #[tokio::test]
    async fn test_tool_not_enabled_for_agent_is_rejected() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_call_response(vec![("x", "current_time", "{}")]),
            text_response("fine"),
        ]));
        let exec = executor(model, LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "time?", &[]).await;

        assert!(result.success);
        assert_eq!(
            result.tool_calls[0].result.error.as_deref(),
            Some("Tool not available: current_time")
        );
    }

    #[tokio::test]
    async fn test_model_error_fails_turn_and_keeps_partial_trace() {
        let model = Arc::new(ScriptedModel::with_results(vec![
            Ok(tool_call_response(vec![("a", "echo", r#"{"text":"hi"}"#)])),
            Err(LlmError::Api {
                status: 500,
                message: "upstream down".to_string(),
            }),
        ]));
        let exec = executor(model, LocalToolRegistry::with_builtins());

        let result = exec.execute(&agent_with_tools(&["echo"]), "go", &[]).await;

        assert!(!result.success);
        assert_eq!(result.termination, TurnTermination::UpstreamError);
        assert_eq!(result.tool_calls.len(), 1);
        assert!(result.error.unwrap().contains("upstream down"));
    }

    #[test]
    fn test_truncate_for_transcript() {
        assert_eq!(truncate_for_transcript("short", 10), "short");
        assert_eq!(truncate_for_transcript("abcdefghij", 4), "abcd…[truncated 6 chars]");
        assert_eq!(truncate_for_transcript("unbounded", 0), "unbounded");
    }

    #[test]
    fn test_render_tool_message_shapes() {
        let ok: serde_json::Value = serde_json::from_str(&render_tool_message(
            &ToolResult::success(serde_json::json!({ "n": 1 })),
            0,
        ))
        .unwrap();
        assert_eq!(ok, serde_json::json!({ "success": true, "data": { "n": 1 } }));
        let err: serde_json::Value =
            serde_json::from_str(&render_tool_message(&ToolResult::error("nope"), 0)).unwrap();
        assert_eq!(err, serde_json::json!({ "success": false, "error": "nope" }));
    }
}
