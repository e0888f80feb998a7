//! Catalog lookups against the Glue Data Catalog

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use aws_sdk_glue::error::DisplayErrorContext;
use aws_sdk_glue::Client as GlueClient;
use tracing::debug;

/// Registry of table definitions consulted by the query engine
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `Ok(false)` when the table is not registered; other probe failures are errors
    async fn table_exists(&self, database: &str, name: &str) -> Result<bool>;
}

pub struct GlueCatalog {
    client: GlueClient,
}

impl GlueCatalog {
    pub fn new(client: GlueClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Catalog for GlueCatalog {
    async fn table_exists(&self, database: &str, name: &str) -> Result<bool> {
        match self
            .client
            .get_table()
            .database_name(database)
            .name(name)
            .send()
            .await
        {
            Ok(output) => Ok(output.table().is_some()),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_entity_not_found_exception() {
                    debug!("Glue table {}.{} does not exist", database, name);
                    Ok(false)
                } else {
                    Err(PipelineError::Catalog(format!(
                        "Failed to look up Glue table {}.{}: {}",
                        database,
                        name,
                        DisplayErrorContext(&service_error)
                    )))
                }
            }
        }
    }
}
