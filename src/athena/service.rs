//! Remote service seams
//!
//! The query client talks to two services: a query-execution service (Athena)
//! and a metadata catalog (Glue). Both sit behind traits so the client logic
//! does not depend on the SDK and can be exercised against in-memory fakes.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Lifecycle state reported for a submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Succeeded | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Queued => "QUEUED",
            ExecutionState::Running => "RUNNING",
            ExecutionState::Succeeded => "SUCCEEDED",
            ExecutionState::Failed => "FAILED",
            ExecutionState::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    pub state_change_reason: Option<String>,
}

/// Everything needed to submit one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartQuery {
    pub sql: String,
    pub database: String,
    pub catalog: String,
    pub workgroup: Option<String>,
    pub output_location: Option<String>,
}

/// One page of query results, cells as the service returned them.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TablePage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}

/// Column name/type pairs of a catalog table.
#[derive(Debug, Clone, Default)]
pub struct TableDescription {
    pub columns: Vec<(String, String)>,
    pub partition_keys: Vec<(String, String)>,
}

#[async_trait]
pub trait QueryService: Send + Sync {
    /// Submit a statement, returning its execution id.
    async fn start_query(&self, request: &StartQuery) -> Result<String>;

    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus>;

    async fn result_page(&self, execution_id: &str, next_token: Option<&str>) -> Result<ResultPage>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn table_page(&self, database: &str, next_token: Option<&str>) -> Result<TablePage>;

    async fn describe_table(&self, database: &str, table: &str) -> Result<TableDescription>;
}

/// Service handles bound to one region.
#[derive(Clone)]
pub struct RegionServices {
    pub query: Arc<dyn QueryService>,
    pub catalog: Arc<dyn CatalogService>,
}

/// Creates service handles for a region. Called at most once per region by
/// [`crate::athena::QueryClient`].
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn connect(&self, region: &str) -> Result<RegionServices>;
}
