//! Query Engine Trait - contract for the external query engine
//!
//! The pipeline only ever talks to the engine through this trait, so the
//! Athena client and the in-memory fakes used in tests are interchangeable.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a query execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Submitted,
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Submitted => "SUBMITTED",
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryState {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(QueryState::Submitted),
            "QUEUED" => Ok(QueryState::Queued),
            "RUNNING" => Ok(QueryState::Running),
            "SUCCEEDED" => Ok(QueryState::Succeeded),
            "FAILED" => Ok(QueryState::Failed),
            "CANCELLED" => Ok(QueryState::Cancelled),
            other => Err(PipelineError::Engine(format!(
                "Unknown query execution state: {}",
                other
            ))),
        }
    }
}

/// A query as tracked by the pipeline. Owned by the executor that submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecution {
    pub id: String,
    pub statement: String,
    pub parameters: Vec<String>,
    pub state: QueryState,
    pub failure_reason: Option<String>,
}

/// What gets sent to the engine for one submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub statement: String,
    pub parameters: Vec<String>,
    /// Engine-side deduplication token; same token means same execution
    pub client_request_token: Option<String>,
}

/// Status snapshot returned by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub state: QueryState,
    pub failure_reason: Option<String>,
    /// Statement text as recorded by the engine, when it reports it
    pub statement: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            failure_reason: None,
            statement: None,
        }
    }
}

/// Declared column type of a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Boolean,
    Integer,
    BigInt,
    FloatingPoint,
    String,
    Date,
    Array,
    /// Anything the decoder does not know how to coerce
    Other(String),
}

impl ColumnType {
    /// Map an engine type name (e.g. `varchar`, `decimal`) onto a column type
    pub fn from_engine_type(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "boolean" => ColumnType::Boolean,
            "integer" | "int" | "smallint" | "tinyint" => ColumnType::Integer,
            "bigint" => ColumnType::BigInt,
            "double" | "float" | "real" | "decimal" => ColumnType::FloatingPoint,
            "char" | "varchar" | "string" => ColumnType::String,
            "date" | "timestamp" => ColumnType::Date,
            "array" => ColumnType::Array,
            _ => ColumnType::Other(type_name.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, engine_type: &str) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::from_engine_type(engine_type),
        }
    }
}

/// One page of a paginated result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Vec<Option<String>>>,
    pub continuation_token: Option<String>,
    /// Column metadata; the engine reports it on every page, only the first is used
    pub columns: Option<Vec<ColumnDescriptor>>,
}

/// Query engine trait - Athena in production, fakes in tests
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Start a query and return the engine-assigned execution id
    async fn submit_query(&self, request: &QueryRequest) -> Result<String>;

    /// Fetch the current status of an execution
    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus>;

    /// Fetch one page of results
    async fn get_result_page(
        &self,
        execution_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<ResultPage>;
}
