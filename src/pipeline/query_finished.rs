//! Query-finished handler: harvest and decode results of a completed query

use crate::error::{PipelineError, Result};
use crate::events::QueryStateChange;
use crate::execution::engine::{QueryEngine, QueryState};
use crate::execution::result::{fetch_and_decode, DecodedRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Decoded output of one finished query
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub execution_id: String,
    pub statement: Option<String>,
    pub records: Vec<DecodedRecord>,
}

pub struct QueryFinishedHandler<'a> {
    engine: &'a dyn QueryEngine,
}

impl<'a> QueryFinishedHandler<'a> {
    pub fn new(engine: &'a dyn QueryEngine) -> Self {
        Self { engine }
    }

    /// `Ok(None)` for intermediate states; failed and cancelled queries are errors
    pub async fn handle(&self, change: &QueryStateChange) -> Result<Option<QueryAnswer>> {
        let execution_id = &change.query_execution_id;

        match change.current_state {
            QueryState::Succeeded => {}
            QueryState::Failed | QueryState::Cancelled => {
                let status = match self.engine.get_execution_status(execution_id).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        warn!(
                            "Could not look up status of query {}, reporting without it: {}",
                            execution_id, e
                        );
                        None
                    }
                };
                let reason = change
                    .failure_reason()
                    .map(str::to_string)
                    .or_else(|| status.as_ref().and_then(|s| s.failure_reason.clone()));
                return Err(PipelineError::QueryFailed {
                    statement: status
                        .and_then(|s| s.statement)
                        .unwrap_or_else(|| execution_id.clone()),
                    state: change.current_state,
                    reason,
                });
            }
            state => {
                debug!("Query {} is {}, nothing to harvest yet", execution_id, state);
                return Ok(None);
            }
        }

        let status = self.engine.get_execution_status(execution_id).await?;
        let records = fetch_and_decode(self.engine, execution_id).await?;

        let answer = QueryAnswer {
            execution_id: execution_id.clone(),
            statement: status.statement,
            records,
        };
        log_answer(&answer)?;
        Ok(Some(answer))
    }
}

fn log_answer(answer: &QueryAnswer) -> Result<()> {
    let banner = "*".repeat(52);
    info!("{}", banner);
    info!("Query {}:\n{}", answer.execution_id, answer.statement.as_deref().unwrap_or("<unknown>"));
    info!("Results:\n{}", serde_json::to_string_pretty(&answer.records)?);
    info!("{}", banner);
    Ok(())
}
