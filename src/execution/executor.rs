//! Query Executor - submits statements and waits for them to finish
//!
//! Waiting is a cooperative poll against the engine's status endpoint. It is
//! meant for short administrative statements (DDL, small aggregations);
//! long analytic queries should be submitted fire-and-forget and harvested
//! from the engine's state-change notification instead.

use crate::error::{PipelineError, Result};
use crate::execution::engine::{QueryEngine, QueryExecution, QueryRequest, QueryState};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// How the delay between status checks evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Delay doubles after every check, capped at `max`
    Exponential { max: Duration },
}

/// Poll settings for `await_terminal`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound on status checks; `None` waits until the engine reports a terminal state
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: None,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential { max } => current.saturating_mul(2).min(max),
        }
    }
}

/// Deterministic engine-side deduplication token for a (scope, query) pair.
///
/// Redelivered notifications for the same export produce the same token, so
/// the engine hands back the original execution instead of starting a second one.
pub fn idempotency_token(scope: &str, query_name: &str, parameters: &[String]) -> String {
    let key = format!("{}:{}:{}", scope, query_name, parameters.join(","));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

/// Submits statements to a query engine and tracks them to completion
pub struct QueryExecutor<'a> {
    engine: &'a dyn QueryEngine,
    policy: PollPolicy,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(engine: &'a dyn QueryEngine, policy: PollPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn engine(&self) -> &'a dyn QueryEngine {
        self.engine
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submit a statement; the returned execution is in the `Submitted` state
    pub async fn submit(&self, statement: &str, parameters: &[String]) -> Result<QueryExecution> {
        self.submit_request(QueryRequest {
            statement: statement.to_string(),
            parameters: parameters.to_vec(),
            client_request_token: None,
        })
        .await
    }

    /// Submit with an engine-side deduplication token
    pub async fn submit_idempotent(
        &self,
        statement: &str,
        parameters: &[String],
        token: String,
    ) -> Result<QueryExecution> {
        self.submit_request(QueryRequest {
            statement: statement.to_string(),
            parameters: parameters.to_vec(),
            client_request_token: Some(token),
        })
        .await
    }

    async fn submit_request(&self, request: QueryRequest) -> Result<QueryExecution> {
        info!("Executing query: {}", request.statement);

        let id = self.engine.submit_query(&request).await?;
        info!("Query started with ID: {}", id);

        Ok(QueryExecution {
            id,
            statement: request.statement,
            parameters: request.parameters,
            state: QueryState::Submitted,
            failure_reason: None,
        })
    }

    /// Block until the execution reaches a terminal state.
    ///
    /// Returns the execution in `Succeeded`; `Failed` and `Cancelled` become
    /// `PipelineError::QueryFailed`. No retry happens here.
    pub async fn await_terminal(&self, execution: QueryExecution) -> Result<QueryExecution> {
        let mut execution = execution;
        let mut delay = self.policy.interval;
        let mut attempts: u32 = 0;

        loop {
            let status = self.engine.get_execution_status(&execution.id).await?;
            attempts += 1;
            execution.state = status.state;
            execution.failure_reason = status.failure_reason;

            if execution.state.is_terminal() {
                break;
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    warn!(
                        "Query {} still {} after {} status checks, giving up",
                        execution.id, execution.state, attempts
                    );
                    return Err(PipelineError::PollTimeout {
                        execution_id: execution.id,
                        attempts,
                    });
                }
            }

            debug!(
                "Query {} is {}, checking again in {:?}",
                execution.id, execution.state, delay
            );
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }

        match execution.state {
            QueryState::Succeeded => Ok(execution),
            state => Err(PipelineError::QueryFailed {
                statement: execution.statement,
                state,
                reason: execution.failure_reason,
            }),
        }
    }

    /// Submit and wait. Only for short-running statements.
    pub async fn execute_and_wait(
        &self,
        statement: &str,
        parameters: &[String],
    ) -> Result<QueryExecution> {
        let execution = self.submit(statement, parameters).await?;
        self.await_terminal(execution).await
    }
}
