//! In-memory stand-ins for the remote services and the agent.

#![allow(dead_code)]

use async_trait::async_trait;
use insight_pilot::athena::service::{
    CatalogService, ExecutionState, ExecutionStatus, QueryService, RegionServices, ResultPage,
    ServiceFactory, StartQuery, TableDescription, TablePage,
};
use insight_pilot::athena::{PollPolicy, QueryClient};
use insight_pilot::conversation::{TurnObserver, TurnStage};
use insight_pilot::llm::Agent;
use insight_pilot::normalize::AgentReply;
use insight_pilot::settings::AthenaSettings;
use insight_pilot::{PilotError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn status(state: ExecutionState, reason: Option<&str>) -> ExecutionStatus {
    ExecutionStatus {
        state,
        state_change_reason: reason.map(|r| r.to_string()),
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        timeout: Duration::from_millis(50),
    }
}

pub fn default_settings() -> AthenaSettings {
    AthenaSettings::from_lookup(|_| None)
}

/// Query service that replays a status script and serves fixed result pages.
/// The last status repeats once the script runs out. Page `n` is requested
/// with token `page-n`.
pub struct FakeQuery {
    statuses: Mutex<VecDeque<ExecutionStatus>>,
    pages: Vec<ResultPage>,
    pub started: Mutex<Vec<StartQuery>>,
    pub page_requests: AtomicUsize,
}

impl FakeQuery {
    pub fn succeeding(columns: &[&str], pages: Vec<Vec<Vec<&str>>>) -> Self {
        Self::with_statuses(
            vec![
                status(ExecutionState::Queued, None),
                status(ExecutionState::Running, None),
                status(ExecutionState::Succeeded, None),
            ],
            columns,
            pages,
        )
    }

    pub fn with_statuses(
        statuses: Vec<ExecutionStatus>,
        columns: &[&str],
        pages: Vec<Vec<Vec<&str>>>,
    ) -> Self {
        let count = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, rows)| ResultPage {
                columns: strings(columns),
                rows: rows.iter().map(|row| strings(row)).collect(),
                next_token: (index + 1 < count).then(|| format!("page-{}", index + 1)),
            })
            .collect();

        Self {
            statuses: Mutex::new(statuses.into()),
            pages,
            started: Mutex::new(Vec::new()),
            page_requests: AtomicUsize::new(0),
        }
    }

    pub fn last_request(&self) -> Option<StartQuery> {
        self.started.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl QueryService for FakeQuery {
    async fn start_query(&self, request: &StartQuery) -> Result<String> {
        let mut started = self.started.lock().unwrap();
        started.push(request.clone());
        Ok(format!("q-{}", started.len()))
    }

    async fn query_status(&self, _execution_id: &str) -> Result<ExecutionStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        let current = statuses
            .front()
            .cloned()
            .ok_or_else(|| PilotError::RemoteService("no status scripted".to_string()))?;
        if statuses.len() > 1 {
            statuses.pop_front();
        }
        Ok(current)
    }

    async fn result_page(&self, _execution_id: &str, next_token: Option<&str>) -> Result<ResultPage> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let index = match next_token {
            None => 0,
            Some(token) => token
                .trim_start_matches("page-")
                .parse()
                .map_err(|_| PilotError::RemoteService(format!("bad token {}", token)))?,
        };
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pub table_pages: Vec<Vec<String>>,
    pub description: TableDescription,
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn table_page(&self, _database: &str, next_token: Option<&str>) -> Result<TablePage> {
        let index: usize = next_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        Ok(TablePage {
            names: self.table_pages.get(index).cloned().unwrap_or_default(),
            next_token: (index + 1 < self.table_pages.len()).then(|| (index + 1).to_string()),
        })
    }

    async fn describe_table(&self, _database: &str, table: &str) -> Result<TableDescription> {
        if table == "missing" {
            return Err(PilotError::RemoteService(
                "Glue get_table failed: EntityNotFoundException".to_string(),
            ));
        }
        Ok(self.description.clone())
    }
}

/// Hands out the same fake services for every region and counts connects.
pub struct FakeFactory {
    pub query: Arc<FakeQuery>,
    pub catalog: Arc<FakeCatalog>,
    pub regions: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(query: FakeQuery, catalog: FakeCatalog) -> Arc<Self> {
        Arc::new(Self {
            query: Arc::new(query),
            catalog: Arc::new(catalog),
            regions: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> usize {
        self.regions.lock().unwrap().len()
    }
}

#[async_trait]
impl ServiceFactory for FakeFactory {
    async fn connect(&self, region: &str) -> Result<RegionServices> {
        self.regions.lock().unwrap().push(region.to_string());
        Ok(RegionServices {
            query: self.query.clone(),
            catalog: self.catalog.clone(),
        })
    }
}

pub fn client_for(factory: &Arc<FakeFactory>) -> QueryClient {
    QueryClient::new(default_settings(), factory.clone()).with_poll_policy(fast_poll())
}

/// Agent that answers from a script and remembers its instructions.
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<AgentReply>>,
    pub instructions: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<AgentReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            instructions: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn invoke(&self, instruction: &str) -> Result<AgentReply> {
        self.instructions.lock().unwrap().push(instruction.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PilotError::Llm("no reply scripted".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub stages: Mutex<Vec<TurnStage>>,
    pub sql: Mutex<Vec<String>>,
}

impl TurnObserver for RecordingObserver {
    fn on_stage(&self, stage: TurnStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_sql(&self, sql: &str) {
        self.sql.lock().unwrap().push(sql.to_string());
    }
}
