//! Export-completed pipeline: rebuild or ensure tables, then start aggregates

use crate::error::Result;
use crate::events::{extract_from_notification, ExportEvent, ObjectStoreNotification};
use crate::execution::engine::QueryExecution;
use crate::execution::executor::{idempotency_token, QueryExecutor};
use crate::export::ExportMode;
use crate::pipeline::definitions::plan_for;
use crate::tables::TableLifecycleManager;
use chrono::NaiveDate;
use tracing::info;

pub struct ExportCompletedPipeline<'a> {
    executor: &'a QueryExecutor<'a>,
    tables: &'a TableLifecycleManager<'a>,
    mode: ExportMode,
    bucket: String,
}

impl<'a> ExportCompletedPipeline<'a> {
    pub fn new(
        executor: &'a QueryExecutor<'a>,
        tables: &'a TableLifecycleManager<'a>,
        mode: ExportMode,
        bucket: String,
    ) -> Self {
        Self {
            executor,
            tables,
            mode,
            bucket,
        }
    }

    /// Handle one notification batch; returns the submitted aggregate queries.
    ///
    /// Events are processed in order and the first failure aborts the batch.
    pub async fn handle(
        &self,
        notification: &ObjectStoreNotification,
        today: NaiveDate,
    ) -> Result<Vec<QueryExecution>> {
        let events = extract_from_notification(notification);
        info!("Notification carries {} export events", events.len());

        let mut submitted = Vec::new();
        for event in &events {
            submitted.extend(self.handle_event(event, today).await?);
        }
        Ok(submitted)
    }

    pub async fn handle_event(&self, event: &ExportEvent, today: NaiveDate) -> Result<Vec<QueryExecution>> {
        info!(
            "Export {} of {} completed ({})",
            event.export_id, event.source_table, self.mode
        );
        let plan = plan_for(event, self.mode, &self.bucket, today)?;

        match self.mode {
            ExportMode::Full => self.tables.rebuild_table(&plan.definition).await?,
            ExportMode::Incremental => {
                self.tables.ensure_table(&plan.definition).await?;
            }
        }

        // Aggregates are harvested later from the query-state-change notification
        let mut submitted = Vec::with_capacity(plan.queries.len());
        for query in &plan.queries {
            let token = idempotency_token(&event.export_id, query.name, &query.parameters);
            let execution = self
                .executor
                .submit_idempotent(&query.statement, &query.parameters, token)
                .await?;
            info!("Submitted {} as {}", query.name, execution.id);
            submitted.push(execution);
        }
        Ok(submitted)
    }
}
