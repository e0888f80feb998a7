//! Table Lifecycle Manager - external table definitions over export data
//!
//! Incremental pipelines keep one table over a stable location and only
//! create it when the catalog does not know it yet. Full-snapshot pipelines
//! point the table at a new location every cycle, which the engine cannot
//! do in place, so the table is dropped and created again.

use crate::catalog::Catalog;
use crate::error::{PipelineError, Result};
use crate::execution::engine::QueryState;
use crate::execution::executor::QueryExecutor;
use regex::Regex;
use tracing::{info, warn};

lazy_static::lazy_static! {
    static ref EXISTS_NAME: Regex = Regex::new(r"(?i)EXISTS (\w+)").unwrap();
    static ref TABLE_NAME: Regex = Regex::new(r"(?i)TABLE (\w+)").unwrap();
}

/// Pull the table name out of a DDL statement.
///
/// `DROP TABLE IF EXISTS item;` and `CREATE EXTERNAL TABLE item (...)` both give `item`.
pub fn extract_table_from_command(command: &str) -> Result<String> {
    EXISTS_NAME
        .captures(command)
        .or_else(|| TABLE_NAME.captures(command))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            PipelineError::TableName(command.trim().chars().take(80).collect::<String>())
        })
}

/// External table definition over an export's data location
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    /// Explicit table name; derived from `ddl_create` when absent
    pub name: Option<String>,
    pub ddl_create: String,
    pub ddl_drop: Option<String>,
    pub data_location: String,
}

impl TableDefinition {
    pub fn new(ddl_create: impl Into<String>, data_location: impl Into<String>) -> Self {
        Self {
            name: None,
            ddl_create: ddl_create.into(),
            ddl_drop: None,
            data_location: data_location.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_drop(mut self, ddl_drop: impl Into<String>) -> Self {
        self.ddl_drop = Some(ddl_drop.into());
        self
    }

    pub fn table_name(&self) -> Result<String> {
        match &self.name {
            Some(name) => Ok(name.clone()),
            None => extract_table_from_command(&self.ddl_create),
        }
    }

    /// Drop statement to run before re-creating the table
    pub fn drop_statement(&self) -> Result<String> {
        match &self.ddl_drop {
            Some(ddl) => Ok(ddl.clone()),
            None => Ok(format!("DROP TABLE IF EXISTS {};", self.table_name()?)),
        }
    }
}

/// Outcome of `ensure_table`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

pub struct TableLifecycleManager<'a> {
    executor: &'a QueryExecutor<'a>,
    catalog: &'a dyn Catalog,
    database: String,
}

impl<'a> TableLifecycleManager<'a> {
    pub fn new(executor: &'a QueryExecutor<'a>, catalog: &'a dyn Catalog, database: String) -> Self {
        Self {
            executor,
            catalog,
            database,
        }
    }

    /// Create the table unless the catalog already has it
    pub async fn ensure_table(&self, def: &TableDefinition) -> Result<EnsureOutcome> {
        let table_name = def.table_name()?;

        if self.catalog.table_exists(&self.database, &table_name).await? {
            info!("Athena table {} already exists.", table_name);
            return Ok(EnsureOutcome::AlreadyExists);
        }

        info!("Creating Athena table {}.", table_name);
        self.executor.execute_and_wait(&def.ddl_create, &[]).await?;
        info!("Athena table {} created.", table_name);
        Ok(EnsureOutcome::Created)
    }

    /// Drop the table (absence is fine) and create it again, strictly in that order
    pub async fn rebuild_table(&self, def: &TableDefinition) -> Result<()> {
        let table_name = def.table_name()?;
        let drop_statement = def.drop_statement()?;

        info!("Recreating Athena table {}.", table_name);
        match self.executor.execute_and_wait(&drop_statement, &[]).await {
            Ok(_) => info!("Athena table {} dropped.", table_name),
            Err(err) if is_missing_table_failure(&err) => {
                warn!("Athena table {} did not exist, nothing to drop.", table_name)
            }
            Err(err) => return Err(err),
        }

        self.executor.execute_and_wait(&def.ddl_create, &[]).await?;
        info!("Athena table {} created.", table_name);
        Ok(())
    }
}

fn is_missing_table_failure(err: &PipelineError) -> bool {
    match err {
        PipelineError::QueryFailed {
            state: QueryState::Failed,
            reason: Some(reason),
            ..
        } => {
            let reason = reason.to_lowercase();
            reason.contains("table") && (reason.contains("not found") || reason.contains("does not exist"))
        }
        _ => false,
    }
}
