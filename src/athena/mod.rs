//! Athena query client
//!
//! Wraps the query-execution and catalog services behind three operations:
//! list the tables of a database, describe one table, and run a statement to
//! completion. Service handles are created on first use and cached per region.

pub mod aws;
pub mod service;

use crate::error::{PilotError, Result};
use crate::settings::AthenaSettings;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service::{ExecutionStatus, QueryService, RegionServices, ServiceFactory, StartQuery};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ROWS: usize = 100;

/// One result row keyed by column name.
pub type Record = Map<String, Value>;

/// Column name to column type, in catalog order.
pub type TableSchema = Map<String, Value>;

/// Rows returned by a finished query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub query_execution_id: String,
}

impl QueryResult {
    pub fn records(&self) -> Vec<Record> {
        records_from_table(&self.columns, &self.rows)
    }
}

/// Pair each row with the column names. Cells are kept as the raw strings;
/// a row shorter than the header yields nulls for the missing columns.
pub fn records_from_table(columns: &[String], rows: &[Vec<String>]) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let cell = row
                        .get(idx)
                        .map(|v| Value::String(v.clone()))
                        .unwrap_or(Value::Null);
                    (column.clone(), cell)
                })
                .collect()
        })
        .collect()
}

/// How often and for how long to poll a running query.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Per-call overrides for [`QueryClient::run_query`]. Unset fields fall back
/// to the client's settings.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub database: Option<String>,
    pub workgroup: Option<String>,
    pub output_location: Option<String>,
    pub region: Option<String>,
    pub max_rows: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            database: None,
            workgroup: None,
            output_location: None,
            region: None,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl QueryOptions {
    /// Options that pin every routing parameter to `settings`.
    pub fn from_settings(settings: &AthenaSettings, max_rows: usize) -> Self {
        Self {
            database: Some(settings.database.clone()),
            workgroup: settings.workgroup.clone(),
            output_location: settings.output.clone(),
            region: Some(settings.region.clone()),
            max_rows,
        }
    }
}

pub struct QueryClient {
    settings: AthenaSettings,
    factory: Arc<dyn ServiceFactory>,
    services: DashMap<String, RegionServices>,
    poll: PollPolicy,
}

impl QueryClient {
    pub fn new(settings: AthenaSettings, factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            settings,
            factory,
            services: DashMap::new(),
            poll: PollPolicy::default(),
        }
    }

    /// Client backed by the AWS SDK and the default credential chain.
    pub fn aws(settings: AthenaSettings) -> Self {
        Self::new(settings, Arc::new(aws::AwsServiceFactory))
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn settings(&self) -> &AthenaSettings {
        &self.settings
    }

    pub async fn list_tables(
        &self,
        database: Option<&str>,
        catalog: Option<&str>,
        region: Option<&str>,
    ) -> Result<Vec<String>> {
        let database = self.resolve_database(database)?;
        let catalog = pick(catalog, Some(self.settings.catalog.as_str()));
        debug!("Listing tables of {} (catalog {:?})", database, catalog);

        let services = self.services(region).await?;
        let mut tables = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = services
                .catalog
                .table_page(&database, next_token.as_deref())
                .await?;
            tables.extend(page.names);
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        info!("Found {} tables in {}", tables.len(), database);
        Ok(tables)
    }

    /// Storage columns followed by partition keys; a repeated name keeps the later type.
    pub async fn get_table_schema(
        &self,
        table: &str,
        database: Option<&str>,
        catalog: Option<&str>,
        region: Option<&str>,
    ) -> Result<TableSchema> {
        if table.trim().is_empty() {
            return Err(PilotError::Validation("table is required".to_string()));
        }
        let database = self.resolve_database(database)?;
        let catalog = pick(catalog, Some(self.settings.catalog.as_str()));
        debug!("Describing {}.{} (catalog {:?})", database, table, catalog);

        let services = self.services(region).await?;
        let description = services.catalog.describe_table(&database, table).await?;

        let mut schema = TableSchema::new();
        for (name, column_type) in description
            .columns
            .into_iter()
            .chain(description.partition_keys)
        {
            schema.insert(name, Value::String(column_type));
        }
        Ok(schema)
    }

    pub async fn run_query(&self, sql: &str, options: &QueryOptions) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(PilotError::Validation("sql is required".to_string()));
        }
        if options.max_rows == 0 {
            return Err(PilotError::Validation("max_rows must be at least 1".to_string()));
        }

        let request = StartQuery {
            sql: sql.to_string(),
            database: self.resolve_database(options.database.as_deref())?,
            catalog: self.settings.catalog.clone(),
            workgroup: pick(options.workgroup.as_deref(), self.settings.workgroup.as_deref()),
            output_location: pick(
                options.output_location.as_deref(),
                self.settings.output.as_deref(),
            ),
        };

        let services = self.services(options.region.as_deref()).await?;
        let execution_id = services.query.start_query(&request).await?;
        info!("Athena query submitted: {}", execution_id);

        let status = self.wait_for_query(services.query.as_ref(), &execution_id).await?;
        if status.state != service::ExecutionState::Succeeded {
            let reason = status
                .state_change_reason
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(PilotError::RemoteService(format!(
                "Athena query {}: {}",
                status.state.as_str(),
                reason
            )));
        }

        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut next_token: Option<String> = None;
        let mut first_page = true;

        'pages: loop {
            let page = services
                .query
                .result_page(&execution_id, next_token.as_deref())
                .await?;

            let mut page_rows = page.rows.into_iter().peekable();
            if first_page {
                columns = page.columns;
                if page_rows.peek() == Some(&columns) {
                    page_rows.next();
                }
                first_page = false;
            }

            for row in page_rows {
                rows.push(row);
                if rows.len() >= options.max_rows {
                    break 'pages;
                }
            }

            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        info!("Athena query {} returned {} rows", execution_id, rows.len());
        Ok(QueryResult {
            columns,
            rows,
            query_execution_id: execution_id,
        })
    }

    async fn wait_for_query(
        &self,
        query: &dyn QueryService,
        execution_id: &str,
    ) -> Result<ExecutionStatus> {
        let start = Instant::now();
        loop {
            let status = query.query_status(execution_id).await?;
            if status.state.is_terminal() {
                debug!("Query {} finished as {}", execution_id, status.state.as_str());
                return Ok(status);
            }
            if start.elapsed() > self.poll.timeout {
                warn!("Query {} still {} after {:?}", execution_id, status.state.as_str(), self.poll.timeout);
                return Err(PilotError::Timeout(format!(
                    "Athena query timed out after {}s: {}",
                    self.poll.timeout.as_secs_f64(),
                    execution_id
                )));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    fn resolve_database(&self, database: Option<&str>) -> Result<String> {
        pick(database, Some(self.settings.database.as_str())).ok_or_else(|| {
            PilotError::Configuration("database is required (or set ATHENA_DATABASE)".to_string())
        })
    }

    async fn services(&self, region: Option<&str>) -> Result<RegionServices> {
        let region = pick(region, Some(self.settings.region.as_str())).ok_or_else(|| {
            PilotError::Configuration(
                "AWS region not configured. Set AWS_REGION or AWS_DEFAULT_REGION.".to_string(),
            )
        })?;

        let cached = self.services.get(&region).map(|entry| entry.value().clone());
        if let Some(services) = cached {
            return Ok(services);
        }

        let services = self.factory.connect(&region).await?;
        Ok(self.services.entry(region).or_insert(services).clone())
    }
}

/// First non-blank value of `primary`, then `fallback`.
fn pick(primary: Option<&str>, fallback: Option<&str>) -> Option<String> {
    primary
        .filter(|v| !v.trim().is_empty())
        .or(fallback.filter(|v| !v.trim().is_empty()))
        .map(|v| v.trim().to_string())
}
