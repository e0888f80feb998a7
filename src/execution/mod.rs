//! Execution Module - query submission, completion tracking and result decoding
//!
//! - QueryEngine trait for the external engine
//! - QueryExecutor for submit / await-terminal
//! - Result decoder for paginated, schema-annotated results
//! - Athena implementation of the engine

pub mod engine;
pub mod executor;
pub mod result;

pub mod athena_engine;

pub use athena_engine::AthenaEngine;
pub use engine::{
    ColumnDescriptor, ColumnType, ExecutionStatus, QueryEngine, QueryExecution, QueryRequest,
    QueryState, ResultPage,
};
pub use executor::{idempotency_token, Backoff, PollPolicy, QueryExecutor};
pub use result::{decode, fetch_all_pages, fetch_and_decode, to_camel_case, DecodedRecord, DecodedValue};
