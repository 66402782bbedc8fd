use crate::agent_prompts::AGENT_SYSTEM_PROMPT;
use crate::error::{PilotError, Result};
use crate::normalize::AgentReply;
use crate::settings::LlmSettings;
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on model/tool round trips for a single instruction.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// The LLM-driven component that turns an instruction into a reply.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, instruction: &str) -> Result<AgentReply>;
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// OpenAI-compatible chat-completions agent with tool calling.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: Client,
    tools: Option<Arc<ToolRegistry>>,
}

impl LlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            PilotError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PilotError::Llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            http,
            tools: None,
        })
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1,
        });

        if let Some(tools) = &self.tools {
            body["tools"] = json!(tools.function_definitions());
            body["tool_choice"] = json!("auto");
        }

        if self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = json!(2000);
        } else {
            body["max_tokens"] = json!(1500);
        }
        body
    }

    /// One chat-completions round trip, returning the first choice's message.
    async fn complete(&self, messages: &[Value]) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| PilotError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PilotError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| PilotError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        first_choice_message(&response_json)
    }

    async fn run_tool(&self, call: &ToolCallRequest) -> Value {
        let Some(tools) = &self.tools else {
            return json!({"error": format!("Tool {} is not available", call.name)});
        };
        match tools.execute(&call.name, call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool {} failed: {}", call.name, e);
                json!({"error": e.to_string()})
            }
        }
    }
}

#[async_trait]
impl Agent for LlmClient {
    async fn invoke(&self, instruction: &str) -> Result<AgentReply> {
        let mut messages = vec![
            json!({"role": "system", "content": AGENT_SYSTEM_PROMPT}),
            json!({"role": "user", "content": instruction}),
        ];

        for round in 0..MAX_TOOL_ROUNDS {
            let message = self.complete(&messages).await?;
            let calls = parse_tool_calls(&message);
            if calls.is_empty() {
                debug!("Agent answered after {} tool rounds", round);
                return Ok(AgentReply::from_value(message));
            }

            info!("Model requested {} tool call(s)", calls.len());
            messages.push(message);
            for call in &calls {
                let output = self.run_tool(call).await;
                messages.push(tool_result_message(&call.id, &output));
            }
        }

        Err(PilotError::Llm(format!(
            "Agent did not produce an answer within {} tool rounds",
            MAX_TOOL_ROUNDS
        )))
    }
}

/// Pull `choices[0].message` out of a chat-completions response body.
pub fn first_choice_message(response: &Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        return Err(PilotError::Llm(format!("LLM API error: {}", error)));
    }
    let choices = response
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| PilotError::Llm("No choices array in LLM response".to_string()))?;
    choices
        .first()
        .and_then(|choice| choice.get("message"))
        .cloned()
        .ok_or_else(|| PilotError::Llm("Empty choices array in LLM response".to_string()))
}

/// Tool calls carried by an assistant message. Arguments arrive as a JSON
/// string; unparseable arguments are passed on as the raw string so the tool
/// reports the problem back to the model.
pub fn parse_tool_calls(message: &Value) -> Vec<ToolCallRequest> {
    let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) else {
        return Vec::new();
    };

    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = match function.get("arguments") {
                Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
                Some(Value::String(raw)) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Some(other) => other.clone(),
                None => json!({}),
            };
            Some(ToolCallRequest {
                id: call
                    .get("id")
                    .and_then(|id| id.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name,
                arguments,
            })
        })
        .collect()
}

pub fn tool_result_message(call_id: &str, output: &Value) -> Value {
    let content = match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({"role": "tool", "tool_call_id": call_id, "content": content})
}
