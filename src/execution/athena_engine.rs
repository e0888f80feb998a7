//! Athena Query Engine
//!
//! Statements run inside one Glue database and one Athena workgroup, both
//! fixed per process.

use crate::error::{PipelineError, Result};
use crate::execution::engine::{
    ColumnDescriptor, ExecutionStatus, QueryEngine, QueryRequest, QueryState, ResultPage,
};
use async_trait::async_trait;
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::types::QueryExecutionContext;
use aws_sdk_athena::Client as AthenaClient;
use tracing::debug;

/// Athena-backed query engine
pub struct AthenaEngine {
    client: AthenaClient,
    database: String,
    work_group: String,
}

impl AthenaEngine {
    /// Create a new Athena engine
    ///
    /// # Arguments
    /// * `client` - AWS Athena client
    /// * `database` - Glue database used as the query execution context
    /// * `work_group` - Athena workgroup the queries run in
    pub fn new(client: AthenaClient, database: String, work_group: String) -> Self {
        Self {
            client,
            database,
            work_group,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl QueryEngine for AthenaEngine {
    async fn submit_query(&self, request: &QueryRequest) -> Result<String> {
        let context = QueryExecutionContext::builder()
            .database(&self.database)
            .build();

        let parameters = if request.parameters.is_empty() {
            None
        } else {
            Some(request.parameters.clone())
        };

        let output = self
            .client
            .start_query_execution()
            .query_string(&request.statement)
            .query_execution_context(context)
            .work_group(&self.work_group)
            .set_execution_parameters(parameters)
            .set_client_request_token(request.client_request_token.clone())
            .send()
            .await
            .map_err(|e| {
                PipelineError::Engine(format!(
                    "Failed to start Athena query: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Engine("Athena returned no query execution id".to_string()))
    }

    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let output = self
            .client
            .get_query_execution()
            .query_execution_id(execution_id)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Engine(format!(
                    "Failed to get status of Athena query {}: {}",
                    execution_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let execution = output.query_execution().ok_or_else(|| {
            PipelineError::Engine(format!("Athena query {} not found", execution_id))
        })?;
        let status = execution.status();

        let state = status
            .and_then(|s| s.state())
            .ok_or_else(|| {
                PipelineError::Engine(format!("Athena query {} has no state", execution_id))
            })?
            .as_str()
            .parse::<QueryState>()?;

        let failure_reason = status.and_then(|s| {
            s.athena_error()
                .and_then(|e| e.error_message())
                .or_else(|| s.state_change_reason())
                .map(str::to_string)
        });

        debug!("Athena query {} state: {}", execution_id, state);

        Ok(ExecutionStatus {
            state,
            failure_reason,
            statement: execution.query().map(str::to_string),
        })
    }

    async fn get_result_page(
        &self,
        execution_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<ResultPage> {
        let output = self
            .client
            .get_query_results()
            .query_execution_id(execution_id)
            .set_next_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                PipelineError::Engine(format!(
                    "Failed to fetch results of Athena query {}: {}",
                    execution_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut page = ResultPage {
            continuation_token: output.next_token().map(str::to_string),
            ..ResultPage::default()
        };

        if let Some(result_set) = output.result_set() {
            page.rows = result_set
                .rows()
                .iter()
                .map(|row| {
                    row.data()
                        .iter()
                        .map(|datum| datum.var_char_value().map(str::to_string))
                        .collect()
                })
                .collect();

            page.columns = result_set.result_set_metadata().map(|metadata| {
                metadata
                    .column_info()
                    .iter()
                    .map(|info| ColumnDescriptor::new(info.name(), info.r#type()))
                    .collect()
            });
        }

        Ok(page)
    }
}
