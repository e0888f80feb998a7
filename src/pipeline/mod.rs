//! Pipeline Module - notification handlers wiring the components together
//!
//! Export completion: extract events → (re)build table → submit aggregates.
//! Query completion: page through results → decode → log the answer.

pub mod definitions;
pub mod export_completed;
pub mod query_finished;

pub use definitions::{plan_for, DerivedQuery, TablePlan};
pub use export_completed::ExportCompletedPipeline;
pub use query_finished::{QueryAnswer, QueryFinishedHandler};
