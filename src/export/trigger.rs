//! Export Trigger - requests point-in-time exports of the source tables
//!
//! Each source table is exported in ION format under `s3://<bucket>/<table>/`.
//! The export service then writes `<table>/AWSDynamoDB/<exportId>/...`,
//! which is what the export completion notification later reports.

use crate::error::{PipelineError, Result};
use crate::export::{ExportMode, ExportWindow};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::DateTime as AwsDateTime;
use aws_sdk_dynamodb::types::{ExportFormat, ExportType, IncrementalExportSpecification};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::{DateTime, Utc};
use tracing::info;

/// A table to export and the logical name its data is filed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub logical_name: String,
    pub table_arn: String,
}

impl SourceTable {
    pub fn new(logical_name: impl Into<String>, table_arn: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            table_arn: table_arn.into(),
        }
    }

    /// Physical table name: last `/` segment of the ARN
    pub fn physical_name(&self) -> &str {
        self.table_arn.rsplit('/').next().unwrap_or(&self.table_arn)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub table_arn: String,
    pub bucket: String,
    pub prefix: String,
    pub mode: ExportMode,
    pub window: ExportWindow,
}

/// Source database export API
#[async_trait]
pub trait ExportService: Send + Sync {
    /// Oldest point the table can still be exported from, if point-in-time recovery reports one
    async fn earliest_restorable_time(&self, table_name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Start an export and return its identifier
    async fn start_export(&self, request: &ExportRequest) -> Result<String>;
}

pub struct DynamoDbExportService {
    client: DynamoDbClient,
}

impl DynamoDbExportService {
    pub fn new(client: DynamoDbClient) -> Self {
        Self { client }
    }
}

fn to_aws_time(value: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_millis(value.timestamp_millis())
}

#[async_trait]
impl ExportService for DynamoDbExportService {
    async fn earliest_restorable_time(&self, table_name: &str) -> Result<Option<DateTime<Utc>>> {
        let output = self
            .client
            .describe_continuous_backups()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Export(format!(
                    "Failed to describe continuous backups of {}: {}",
                    table_name,
                    DisplayErrorContext(&e)
                ))
            })?;

        let earliest = output
            .continuous_backups_description()
            .and_then(|d| d.point_in_time_recovery_description())
            .and_then(|p| p.earliest_restorable_date_time())
            .and_then(|t| t.to_millis().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        Ok(earliest)
    }

    async fn start_export(&self, request: &ExportRequest) -> Result<String> {
        let (export_type, incremental) = match request.mode {
            ExportMode::Full => (ExportType::FullExport, None),
            ExportMode::Incremental => (
                ExportType::IncrementalExport,
                Some(
                    IncrementalExportSpecification::builder()
                        .set_export_from_time(request.window.from.map(to_aws_time))
                        .set_export_to_time(request.window.to.map(to_aws_time))
                        .build(),
                ),
            ),
        };

        let output = self
            .client
            .export_table_to_point_in_time()
            .table_arn(&request.table_arn)
            .s3_bucket(&request.bucket)
            .s3_prefix(&request.prefix)
            .export_type(export_type)
            .export_format(ExportFormat::Ion)
            .set_incremental_export_specification(incremental)
            .send()
            .await
            .map_err(|e| {
                PipelineError::Export(format!(
                    "Failed to export {}: {}",
                    request.table_arn,
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .export_description()
            .and_then(|d| d.export_arn())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Export("Export started without an export ARN".to_string()))
    }
}

/// Starts one export per configured source table
pub struct ExportTrigger<'a> {
    service: &'a dyn ExportService,
    bucket: String,
    mode: ExportMode,
}

impl<'a> ExportTrigger<'a> {
    pub fn new(service: &'a dyn ExportService, bucket: String, mode: ExportMode) -> Self {
        Self {
            service,
            bucket,
            mode,
        }
    }

    /// Build the export request for one table at `now`
    pub async fn request_for(&self, source: &SourceTable, now: DateTime<Utc>) -> Result<ExportRequest> {
        let window = match self.mode {
            ExportMode::Full => ExportWindow::full(),
            ExportMode::Incremental => {
                let earliest = self
                    .service
                    .earliest_restorable_time(source.physical_name())
                    .await?;
                let window = self.mode.window_for(now, earliest);
                info!(
                    "Incremental export of {} from {:?} to {:?}",
                    source.logical_name, window.from, window.to
                );
                window
            }
        };

        Ok(ExportRequest {
            table_arn: source.table_arn.clone(),
            bucket: self.bucket.clone(),
            prefix: format!("{}/", source.logical_name),
            mode: self.mode,
            window,
        })
    }

    /// Export every source table in order; stops at the first failure
    pub async fn run(&self, sources: &[SourceTable], now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut export_ids = Vec::with_capacity(sources.len());
        for source in sources {
            let request = self.request_for(source, now).await?;
            let export_id = self.service.start_export(&request).await?;
            info!("Table {} export triggered: {}", source.logical_name, export_id);
            export_ids.push(export_id);
        }
        Ok(export_ids)
    }
}
