//! AWS SDK bindings for the query and catalog seams.

use crate::athena::service::{
    CatalogService, ExecutionState, ExecutionStatus, QueryService, RegionServices, ResultPage,
    ServiceFactory, StartQuery, TableDescription, TablePage,
};
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds Athena and Glue clients from the default AWS credential chain.
#[derive(Debug, Default, Clone)]
pub struct AwsServiceFactory;

#[async_trait]
impl ServiceFactory for AwsServiceFactory {
    async fn connect(&self, region: &str) -> Result<RegionServices> {
        info!("Creating Athena and Glue clients for region {}", region);
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Ok(RegionServices {
            query: Arc::new(AthenaService {
                client: aws_sdk_athena::Client::new(&config),
            }),
            catalog: Arc::new(GlueCatalog {
                client: aws_sdk_glue::Client::new(&config),
            }),
        })
    }
}

pub struct AthenaService {
    client: aws_sdk_athena::Client,
}

#[async_trait]
impl QueryService for AthenaService {
    async fn start_query(&self, request: &StartQuery) -> Result<String> {
        let context = QueryExecutionContext::builder()
            .database(&request.database)
            .catalog(&request.catalog)
            .build();
        let result_configuration = request
            .output_location
            .as_ref()
            .map(|location| ResultConfiguration::builder().output_location(location).build());

        let response = self
            .client
            .start_query_execution()
            .query_string(&request.sql)
            .query_execution_context(context)
            .set_work_group(request.workgroup.clone())
            .set_result_configuration(result_configuration)
            .send()
            .await
            .map_err(|e| {
                PilotError::RemoteService(format!("Failed to start query: {}", DisplayErrorContext(&e)))
            })?;

        response
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| PilotError::RemoteService("Athena returned no query execution id".to_string()))
    }

    async fn query_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let response = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| {
                PilotError::RemoteService(format!(
                    "Failed to read status of query {}: {}",
                    execution_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let status = response.query_execution().and_then(|q| q.status());
        let state = match status.and_then(|s| s.state()) {
            Some(QueryExecutionState::Queued) => ExecutionState::Queued,
            Some(QueryExecutionState::Running) => ExecutionState::Running,
            Some(QueryExecutionState::Succeeded) => ExecutionState::Succeeded,
            Some(QueryExecutionState::Failed) => ExecutionState::Failed,
            Some(QueryExecutionState::Cancelled) => ExecutionState::Cancelled,
            other => {
                warn!("Unrecognised Athena state {:?} for {}, treating as running", other, execution_id);
                ExecutionState::Running
            }
        };

        Ok(ExecutionStatus {
            state,
            state_change_reason: status
                .and_then(|s| s.state_change_reason())
                .map(str::to_string),
        })
    }

    async fn result_page(&self, execution_id: &str, next_token: Option<&str>) -> Result<ResultPage> {
        let response = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                PilotError::RemoteService(format!(
                    "Failed to fetch results of query {}: {}",
                    execution_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut page = ResultPage {
            next_token: response.next_token().map(str::to_string),
            ..Default::default()
        };

        if let Some(result_set) = response.result_set() {
            if let Some(metadata) = result_set.result_set_metadata() {
                page.columns = metadata
                    .column_info()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
            }
            page.rows = result_set
                .rows()
                .iter()
                .map(|row| {
                    row.data()
                        .iter()
                        .map(|datum| datum.var_char_value().unwrap_or_default().to_string())
                        .collect()
                })
                .collect();
        }

        debug!("Fetched {} rows for {}", page.rows.len(), execution_id);
        Ok(page)
    }
}

pub struct GlueCatalog {
    client: aws_sdk_glue::Client,
}

#[async_trait]
impl CatalogService for GlueCatalog {
    async fn table_page(&self, database: &str, next_token: Option<&str>) -> Result<TablePage> {
        let response = self
            .client
            .get_tables()
            .database_name(database)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                PilotError::RemoteService(format!(
                    "Glue get_tables failed: {}",
                    aws_sdk_glue::error::DisplayErrorContext(&e)
                ))
            })?;

        Ok(TablePage {
            names: response
                .table_list()
                .iter()
                .map(|t| t.name().to_string())
                .collect(),
            next_token: response.next_token().map(str::to_string),
        })
    }

    async fn describe_table(&self, database: &str, table: &str) -> Result<TableDescription> {
        let response = self
            .client
            .get_table()
            .database_name(database)
            .name(table)
            .send()
            .await
            .map_err(|e| {
                PilotError::RemoteService(format!(
                    "Glue get_table failed: {}",
                    aws_sdk_glue::error::DisplayErrorContext(&e)
                ))
            })?;

        let mut description = TableDescription::default();
        if let Some(table) = response.table() {
            let pair = |c: &aws_sdk_glue::types::Column| {
                (c.name().to_string(), c.r#type().unwrap_or_default().to_string())
            };
            if let Some(storage) = table.storage_descriptor() {
                description.columns = storage.columns().iter().map(pair).collect();
            }
            description.partition_keys = table.partition_keys().iter().map(pair).collect();
        }
        Ok(description)
    }
}
