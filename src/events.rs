//! Notification payloads and the export event extractor
//!
//! Export completion arrives as an object-storage notification whose keys
//! look like `<table>/AWSDynamoDB/<exportId>/...`. Query completion arrives
//! as a query-state-change notification.

use crate::execution::engine::QueryState;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Path segment the export service writes between table prefix and export id
pub const EXPORT_NAMESPACE_MARKER: &str = "AWSDynamoDB";

lazy_static::lazy_static! {
    static ref EXPORT_KEY: Regex =
        Regex::new(&format!(r"^([^/]+)/{}/([^/]+)/", EXPORT_NAMESPACE_MARKER)).unwrap();
}

/// A completed export of one source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEvent {
    pub source_table: String,
    pub export_id: String,
}

/// Parse object keys into export events.
///
/// Keys that do not match are skipped: unrelated objects share the same
/// notification channel. Order is kept and duplicates are not removed.
pub fn extract<S: AsRef<str>>(keys: &[S]) -> Vec<ExportEvent> {
    keys.iter()
        .filter_map(|key| {
            let key = key.as_ref();
            let parsed = parse_key(key);
            if parsed.is_none() {
                debug!("Ignoring object key {}", key);
            }
            parsed
        })
        .collect()
}

fn parse_key(key: &str) -> Option<ExportEvent> {
    let caps = EXPORT_KEY.captures(key)?;
    Some(ExportEvent {
        source_table: caps.get(1)?.as_str().to_string(),
        export_id: caps.get(2)?.as_str().to_string(),
    })
}

/// Object-storage notification (S3 event shape)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<ObjectStoreRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreRecord {
    pub s3: ObjectStoreEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreEntity {
    pub object: StoredObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
}

impl ObjectStoreNotification {
    pub fn keys(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.s3.object.key.as_str()).collect()
    }
}

/// Export events carried by one notification batch
pub fn extract_from_notification(notification: &ObjectStoreNotification) -> Vec<ExportEvent> {
    extract(notification.keys().as_slice())
}

/// Query-state-change notification envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStateChangeEvent {
    pub detail: QueryStateChange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStateChange {
    pub query_execution_id: String,
    pub current_state: QueryState,
    #[serde(default)]
    pub athena_error: Option<QueryError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryError {
    #[serde(default)]
    pub error_message: Option<String>,
}

impl QueryStateChange {
    pub fn failure_reason(&self) -> Option<&str> {
        self.athena_error
            .as_ref()
            .and_then(|e| e.error_message.as_deref())
    }
}
