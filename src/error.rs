use crate::execution::engine::QueryState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown table name: {0}")]
    UnknownTable(String),

    #[error("Unable to extract table name from command: {0}")]
    TableName(String),

    #[error("Command {statement} failed with status: {state}{}", format_reason(.reason))]
    QueryFailed {
        statement: String,
        state: QueryState,
        reason: Option<String>,
    },

    #[error("Query {execution_id} did not finish after {attempts} status checks")]
    PollTimeout { execution_id: String, attempts: u32 },

    #[error("Query engine error: {0}")]
    Engine(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(". Error: {}", r))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, PipelineError>;
