//! Conversation orchestrator
//!
//! A turn walks `GeneratingSql -> RunningQuery -> (GeneratingChart) ->
//! FormattingAnswer -> Done`. Any failure ends the turn in `Error` and is
//! rendered as a single assistant message; the session stays usable.

use crate::agent_prompts::{build_explanation_instruction, build_sql_instruction};
use crate::athena::{QueryClient, QueryOptions, Record, DEFAULT_MAX_ROWS};
use crate::chart::{build_chart, wants_chart, ChartSpec};
use crate::cost::LlmCost;
use crate::error::{PilotError, Result};
use crate::llm::{Agent, LlmClient};
use crate::settings::{AthenaSettings, LlmSettings};
use crate::sql_extract::extract_sql;
use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    AwaitingInput,
    GeneratingSql,
    RunningQuery,
    GeneratingChart,
    FormattingAnswer,
    Done,
    Error,
}

impl TurnStage {
    /// Progress text shown while the stage runs.
    pub fn label(&self) -> &'static str {
        match self {
            TurnStage::AwaitingInput => "Waiting for a question",
            TurnStage::GeneratingSql => "Generating SQL...",
            TurnStage::RunningQuery => "Running Athena query...",
            TurnStage::GeneratingChart => "Building chart...",
            TurnStage::FormattingAnswer => "Formatting answer...",
            TurnStage::Done => "Done",
            TurnStage::Error => "Failed",
        }
    }
}

/// Receives progress while a turn runs.
pub trait TurnObserver: Send + Sync {
    fn on_stage(&self, stage: TurnStage);

    /// Called once the SQL to execute is known.
    fn on_sql(&self, _sql: &str) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl TurnObserver for SilentObserver {
    fn on_stage(&self, _stage: TurnStage) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One entry of the session history. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_records: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vega_spec: Option<ChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_cost: Option<LlmCost>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    pub fn error(err: &PilotError) -> Self {
        Self::assistant(format!("Error: {}", err))
    }

    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            sql: None,
            table: None,
            table_records: None,
            vega_spec: None,
            llm_cost: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TurnOptions {
    pub max_rows: usize,
    /// Forbid schema-discovery tools in the SQL instruction.
    pub fast_mode: bool,
    pub display_cost: bool,
    /// Ask the agent for a short prose answer after the query runs.
    pub explain: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            fast_mode: true,
            display_cost: true,
            explain: false,
        }
    }
}

pub struct Conversation {
    agent: Arc<dyn Agent>,
    client: Arc<QueryClient>,
    options: TurnOptions,
    history: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(agent: Arc<dyn Agent>, client: Arc<QueryClient>, options: TurnOptions) -> Self {
        Self {
            agent,
            client,
            options,
            history: Vec::new(),
        }
    }

    /// Conversation backed by Athena/Glue and the chat-completions agent,
    /// with the Athena tools registered on the agent.
    pub fn with_aws(athena: AthenaSettings, llm: &LlmSettings, options: TurnOptions) -> Result<Self> {
        let client = Arc::new(QueryClient::aws(athena));
        let tools = Arc::new(ToolRegistry::new(Arc::clone(&client)));
        let agent = LlmClient::new(llm)?.with_tools(tools);
        info!("Using model {}", agent.model());
        Ok(Self::new(Arc::new(agent), client, options))
    }

    pub fn client(&self) -> Arc<QueryClient> {
        Arc::clone(&self.client)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn reset(&mut self) {
        info!("Clearing {} messages from the session", self.history.len());
        self.history.clear();
    }

    /// Run one turn for `prompt`, append the user message and exactly one
    /// assistant message to the history, and return the assistant message.
    pub async fn submit(&mut self, prompt: &str, observer: &dyn TurnObserver) -> ChatMessage {
        let turn_id = Uuid::new_v4();
        info!(turn = %turn_id, "New question: {}", prompt);
        self.history.push(ChatMessage::user(prompt));

        let reply = match self.handle_prompt(prompt, observer).await {
            Ok(message) => {
                observer.on_stage(TurnStage::Done);
                info!(turn = %turn_id, "Turn completed");
                message
            }
            Err(e) => {
                observer.on_stage(TurnStage::Error);
                error!(turn = %turn_id, "Turn failed: {}", e);
                ChatMessage::error(&e)
            }
        };

        self.history.push(reply.clone());
        reply
    }

    async fn handle_prompt(&self, prompt: &str, observer: &dyn TurnObserver) -> Result<ChatMessage> {
        let chart_requested = wants_chart(prompt);
        let mut instructions: Vec<String> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();

        observer.on_stage(TurnStage::GeneratingSql);
        let sql_instruction =
            build_sql_instruction(prompt, self.options.max_rows, self.options.fast_mode);
        let sql_reply = self.agent.invoke(&sql_instruction).await?;
        let sql_text = sql_reply.as_text();
        debug!("Model output: {}", sql_text);
        instructions.push(sql_instruction);
        outputs.push(sql_text);

        let sql = extract_sql(&outputs[0]);
        if sql.is_empty() {
            return Err(PilotError::Extraction(
                "Failed to extract SQL from the model output.".to_string(),
            ));
        }
        observer.on_sql(&sql);

        observer.on_stage(TurnStage::RunningQuery);
        let query_options = QueryOptions::from_settings(self.client.settings(), self.options.max_rows);
        let result = self.client.run_query(&sql, &query_options).await?;
        let records = result.records();

        let chart = if chart_requested && !records.is_empty() {
            observer.on_stage(TurnStage::GeneratingChart);
            build_chart(&records)
        } else {
            None
        };

        observer.on_stage(TurnStage::FormattingAnswer);
        let explanation = if self.options.explain {
            let instruction = build_explanation_instruction(prompt, &sql, &result);
            let text = self.agent.invoke(&instruction).await?.as_text();
            instructions.push(instruction);
            outputs.push(text.clone());
            Some(text.trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };

        let llm_cost = self
            .options
            .display_cost
            .then(|| LlmCost::estimate(&instructions, &outputs));

        let lead = if records.is_empty() {
            "No rows returned."
        } else {
            "Results shown above."
        };
        let mut content = format!("{}\n\n```sql\n{}\n```", lead, sql);
        if let Some(explanation) = explanation {
            content = format!("{}\n\n{}", explanation, content);
        }

        Ok(ChatMessage {
            role: Role::Assistant,
            content,
            sql: Some(sql),
            table: Some(TableData {
                columns: result.columns,
                rows: result.rows,
            }),
            table_records: Some(records),
            vega_spec: chart,
            llm_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_shape() {
        let message = ChatMessage::error(&PilotError::Timeout("Athena query timed out after 120s: q-1".to_string()));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"role": "assistant", "content": "Error: Athena query timed out after 120s: q-1"})
        );
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(TurnStage::GeneratingSql.label(), "Generating SQL...");
        assert_eq!(TurnStage::RunningQuery.label(), "Running Athena query...");
        assert_eq!(
            serde_json::to_value(TurnStage::FormattingAnswer).unwrap(),
            json!("formatting_answer")
        );
    }
}
