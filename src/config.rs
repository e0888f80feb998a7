//! Process configuration, read from the environment

use crate::error::{PipelineError, Result};
use crate::execution::executor::{Backoff, PollPolicy, DEFAULT_POLL_INTERVAL_MS};
use crate::export::{ExportMode, SourceTable};
use std::time::Duration;

/// Logical names the export trigger files the source tables under
pub const CUSTOMER_ORDER_TABLE: &str = "CustomerOrder";
pub const ITEM_TABLE: &str = "Item";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Bucket the exports are written to
    pub bucket: String,
    /// Catalog database the external tables live in; only the query-side commands need it
    pub database: Option<String>,
    pub work_group: Option<String>,
    pub export_mode: ExportMode,
    pub customer_order_table_arn: Option<String>,
    pub item_table_arn: Option<String>,
    pub poll_policy: PollPolicy,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PipelineError::Config(format!("{} is not set", key)))
        };

        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let export_mode = match lookup("EXPORT_TYPE") {
            Some(value) => value.parse()?,
            None => ExportMode::Full,
        };

        let interval_ms = match lookup("POLL_INTERVAL_MS") {
            Some(value) => value.trim().parse::<u64>().map_err(|e| {
                PipelineError::Config(format!("POLL_INTERVAL_MS is not a number: {}", e))
            })?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };
        let interval = Duration::from_millis(interval_ms);

        let mut poll_policy = PollPolicy::fixed(interval);
        if let Some(value) = lookup("POLL_MAX_ATTEMPTS") {
            let max = value.trim().parse::<u32>().map_err(|e| {
                PipelineError::Config(format!("POLL_MAX_ATTEMPTS is not a number: {}", e))
            })?;
            poll_policy = poll_policy.with_max_attempts(max);
        }
        match lookup("POLL_BACKOFF").as_deref().map(str::trim) {
            None | Some("fixed") => {}
            Some("exponential") => {
                poll_policy = poll_policy.with_backoff(Backoff::Exponential {
                    max: interval.saturating_mul(8),
                })
            }
            Some(other) => {
                return Err(PipelineError::Config(format!(
                    "Unknown POLL_BACKOFF: {} (expected fixed or exponential)",
                    other
                )))
            }
        }

        Ok(Self {
            bucket: required("BUCKET_NAME")?,
            database: optional("GLUE_DATABASE_NAME"),
            work_group: optional("ATHENA_WORK_GROUP_NAME"),
            export_mode,
            customer_order_table_arn: lookup("CUSTOMER_ORDER_TABLE_ARN"),
            item_table_arn: lookup("ITEM_TABLE_ARN"),
            poll_policy,
        })
    }

    pub fn database(&self) -> Result<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| PipelineError::Config("GLUE_DATABASE_NAME is not set".to_string()))
    }

    pub fn work_group(&self) -> Result<&str> {
        self.work_group
            .as_deref()
            .ok_or_else(|| PipelineError::Config("ATHENA_WORK_GROUP_NAME is not set".to_string()))
    }

    /// Source tables to export; both ARNs must be configured
    pub fn source_tables(&self) -> Result<Vec<SourceTable>> {
        let customer_order = self.customer_order_table_arn.clone().ok_or_else(|| {
            PipelineError::Config("CUSTOMER_ORDER_TABLE_ARN is not set".to_string())
        })?;
        let item = self
            .item_table_arn
            .clone()
            .ok_or_else(|| PipelineError::Config("ITEM_TABLE_ARN is not set".to_string()))?;

        Ok(vec![
            SourceTable::new(CUSTOMER_ORDER_TABLE, customer_order),
            SourceTable::new(ITEM_TABLE, item),
        ])
    }
}
