//! Result Decoder - turns paginated engine results into typed records
//!
//! The engine returns every cell as an optional string plus a column
//! descriptor per position. Row 0 of the first page repeats the column
//! names and is skipped.

use crate::error::{PipelineError, Result};
use crate::execution::engine::{ColumnDescriptor, ColumnType, QueryEngine, ResultPage};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use itertools::Itertools;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

/// A single decoded cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// The engine returned no value for this cell
    Absent,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// ISO-8601 instant, always UTC with millisecond precision
    Timestamp(String),
    Array(serde_json::Value),
}

impl DecodedValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, DecodedValue::Absent)
    }
}

/// One result row keyed by camelCase column name, in column order.
///
/// Serializes as a JSON object whose keys follow the result set's columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    fields: Vec<(String, DecodedValue)>,
}

impl DecodedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field; a repeated name replaces the earlier value in place
    pub fn insert(&mut self, name: String, value: DecodedValue) {
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DecodedValue)> {
        self.fields.iter().map(|(name, value)| (name, value))
    }
}

impl Serialize for DecodedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// `total_items` -> `totalItems`, `Order-Date` -> `orderDate`
pub fn to_camel_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(idx, token)| {
            let lower = token.to_ascii_lowercase();
            if idx == 0 {
                lower
            } else {
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
        })
        .join("")
}

/// Decode all pages of a result set, in page order.
///
/// Fails on the first column whose declared type is unknown, on a row wider
/// than the metadata, and on cells that do not parse as their declared type.
pub fn decode(metadata: &[ColumnDescriptor], pages: &[ResultPage]) -> Result<Vec<DecodedRecord>> {
    if let Some(unknown) = metadata.iter().find_map(|c| match &c.column_type {
        ColumnType::Other(t) => Some(t),
        _ => None,
    }) {
        return Err(PipelineError::Decode(format!("Unknown column type {}", unknown)));
    }

    let names: Vec<String> = metadata.iter().map(|c| to_camel_case(&c.name)).collect();
    let mut records = Vec::new();

    for (page_idx, page) in pages.iter().enumerate() {
        let skip = if page_idx == 0 { 1 } else { 0 };
        for row in page.rows.iter().skip(skip) {
            if row.len() > metadata.len() {
                return Err(PipelineError::Decode(format!(
                    "Row has {} cells but only {} columns are described",
                    row.len(),
                    metadata.len()
                )));
            }

            let mut record = DecodedRecord::new();
            for (idx, cell) in row.iter().enumerate() {
                let value = decode_cell(&metadata[idx], cell.as_deref())?;
                record.insert(names[idx].clone(), value);
            }
            records.push(record);
        }
    }

    debug!("Decoded {} records from {} pages", records.len(), pages.len());
    Ok(records)
}

fn decode_cell(column: &ColumnDescriptor, raw: Option<&str>) -> Result<DecodedValue> {
    let raw = match raw {
        None => return Ok(DecodedValue::Absent),
        Some(raw) => raw,
    };

    // Empty text is a value only for textual columns
    if raw.is_empty() && column.column_type != ColumnType::String {
        return Ok(DecodedValue::Absent);
    }

    let value = match &column.column_type {
        ColumnType::Boolean => DecodedValue::Boolean(raw == "true"),
        ColumnType::Integer | ColumnType::BigInt => {
            DecodedValue::Integer(raw.trim().parse::<i64>().map_err(|e| {
                PipelineError::Decode(format!(
                    "Column {} value '{}' is not an integer: {}",
                    column.name, raw, e
                ))
            })?)
        }
        ColumnType::FloatingPoint => {
            DecodedValue::Float(raw.trim().parse::<f64>().map_err(|e| {
                PipelineError::Decode(format!(
                    "Column {} value '{}' is not a number: {}",
                    column.name, raw, e
                ))
            })?)
        }
        ColumnType::String => DecodedValue::String(raw.to_string()),
        ColumnType::Date => DecodedValue::Timestamp(normalize_instant(raw).ok_or_else(|| {
            PipelineError::Decode(format!(
                "Column {} value '{}' is not a date or timestamp",
                column.name, raw
            ))
        })?),
        ColumnType::Array => DecodedValue::Array(serde_json::from_str(raw).map_err(|e| {
            PipelineError::Decode(format!(
                "Column {} value is not a structured array: {}",
                column.name, e
            ))
        })?),
        ColumnType::Other(t) => {
            return Err(PipelineError::Decode(format!("Unknown column type {}", t)));
        }
    };

    Ok(value)
}

/// Parse engine date/timestamp text into `YYYY-MM-DDTHH:MM:SS.sssZ`
fn normalize_instant(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let instant: DateTime<Utc> = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        ndt.and_utc()
    } else if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        ndt.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };

    Some(instant.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Fetch every page of an execution's results, one at a time.
///
/// Returns the column metadata from the first page alongside the pages.
pub async fn fetch_all_pages(
    engine: &dyn QueryEngine,
    execution_id: &str,
) -> Result<(Vec<ColumnDescriptor>, Vec<ResultPage>)> {
    let mut pages = Vec::new();
    let mut metadata: Option<Vec<ColumnDescriptor>> = None;
    let mut next_token: Option<String> = None;

    loop {
        let page = engine
            .get_result_page(execution_id, next_token.as_deref())
            .await?;
        if metadata.is_none() {
            metadata = page.columns.clone();
        }
        next_token = page.continuation_token.clone();
        pages.push(page);

        if next_token.is_none() {
            break;
        }
    }

    debug!("Fetched {} result pages for query {}", pages.len(), execution_id);
    Ok((metadata.unwrap_or_default(), pages))
}

/// Fetch and decode an execution's full result set
pub async fn fetch_and_decode(
    engine: &dyn QueryEngine,
    execution_id: &str,
) -> Result<Vec<DecodedRecord>> {
    let (metadata, pages) = fetch_all_pages(engine, execution_id).await?;
    decode(&metadata, &pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(rows: Vec<Vec<Option<&str>>>) -> ResultPage {
        ResultPage {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
            continuation_token: None,
            columns: None,
        }
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(to_camel_case("total_items"), "totalItems");
        assert_eq!(to_camel_case("order_date"), "orderDate");
        assert_eq!(to_camel_case("customer__name"), "customerName");
        assert_eq!(to_camel_case("Total-Items"), "totalItems");
        assert_eq!(to_camel_case("total"), "total");
    }

    #[test]
    fn test_decode_integer_column() {
        let metadata = vec![ColumnDescriptor::new("total_items", "integer")];
        let pages = vec![page(vec![vec![Some("total_items")], vec![Some("42")]])];

        let records = decode(&metadata, &pages).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("totalItems"), Some(&DecodedValue::Integer(42)));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let metadata = vec![ColumnDescriptor::new("x", "unsupported_type")];
        let pages = vec![page(vec![vec![Some("x")], vec![Some("1")]])];

        let err = decode(&metadata, &pages).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(err.to_string().contains("unsupported_type"));
    }

    #[test]
    fn test_decode_mixed_row() {
        let metadata = vec![
            ColumnDescriptor::new("order_id", "varchar"),
            ColumnDescriptor::new("total", "decimal"),
            ColumnDescriptor::new("is_paid", "boolean"),
            ColumnDescriptor::new("order_date", "date"),
            ColumnDescriptor::new("items", "array"),
            ColumnDescriptor::new("customer_count", "bigint"),
        ];
        let pages = vec![page(vec![
            vec![
                Some("order_id"),
                Some("total"),
                Some("is_paid"),
                Some("order_date"),
                Some("items"),
                Some("customer_count"),
            ],
            vec![
                Some("o-1"),
                Some("30.50"),
                Some("true"),
                Some("2024-05-01"),
                Some(r#"[{"item_id":"i-1","quantity":2}]"#),
                Some("9007199254740993"),
            ],
        ])];

        let records = decode(&metadata, &pages).unwrap();
        let r = &records[0];
        assert_eq!(r.get("orderId"), Some(&DecodedValue::String("o-1".into())));
        assert_eq!(r.get("total"), Some(&DecodedValue::Float(30.5)));
        assert_eq!(r.get("isPaid"), Some(&DecodedValue::Boolean(true)));
        assert_eq!(
            r.get("orderDate"),
            Some(&DecodedValue::Timestamp("2024-05-01T00:00:00.000Z".into()))
        );
        assert_eq!(
            r.get("items"),
            Some(&DecodedValue::Array(serde_json::json!([{"item_id": "i-1", "quantity": 2}])))
        );
        assert_eq!(
            r.get("customerCount"),
            Some(&DecodedValue::Integer(9_007_199_254_740_993))
        );
    }

    #[test]
    fn test_absent_is_distinct_from_empty_string() {
        let metadata = vec![
            ColumnDescriptor::new("name", "varchar"),
            ColumnDescriptor::new("email", "varchar"),
        ];
        let pages = vec![page(vec![
            vec![Some("name"), Some("email")],
            vec![Some(""), None],
        ])];

        let records = decode(&metadata, &pages).unwrap();
        assert_eq!(records[0].get("name"), Some(&DecodedValue::String(String::new())));
        assert_eq!(records[0].get("email"), Some(&DecodedValue::Absent));
    }

    #[test]
    fn test_header_skipped_only_on_first_page() {
        let metadata = vec![ColumnDescriptor::new("n", "integer")];
        let pages = vec![
            page(vec![vec![Some("n")], vec![Some("1")]]),
            page(vec![vec![Some("2")], vec![Some("3")]]),
        ];

        let records = decode(&metadata, &pages).unwrap();
        let values: Vec<_> = records.iter().map(|r| r.get("n").cloned()).collect();
        assert_eq!(
            values,
            vec![
                Some(DecodedValue::Integer(1)),
                Some(DecodedValue::Integer(2)),
                Some(DecodedValue::Integer(3)),
            ]
        );
    }

    #[test]
    fn test_timestamp_normalized_to_utc_millis() {
        assert_eq!(
            normalize_instant("2024-05-01 13:45:10.5").as_deref(),
            Some("2024-05-01T13:45:10.500Z")
        );
        assert_eq!(
            normalize_instant("2024-05-01T13:45:10+02:00").as_deref(),
            Some("2024-05-01T11:45:10.000Z")
        );
        assert_eq!(normalize_instant("yesterday"), None);
    }

    #[test]
    fn test_unparseable_integer_fails() {
        let metadata = vec![ColumnDescriptor::new("n", "integer")];
        let pages = vec![page(vec![vec![Some("n")], vec![Some("forty")]])];
        assert!(matches!(
            decode(&metadata, &pages),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_records_serialize_as_plain_json() {
        let metadata = vec![ColumnDescriptor::new("total_items", "integer")];
        let pages = vec![page(vec![vec![Some("total_items")], vec![Some("42")]])];
        let records = decode(&metadata, &pages).unwrap();

        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json, serde_json::json!([{"totalItems": 42}]));
    }

    #[test]
    fn test_records_keep_column_order() {
        let metadata = vec![
            ColumnDescriptor::new("total", "decimal"),
            ColumnDescriptor::new("order_id", "varchar"),
        ];
        let pages = vec![page(vec![
            vec![Some("total"), Some("order_id")],
            vec![Some("12.5"), Some("o-1")],
        ])];
        let records = decode(&metadata, &pages).unwrap();

        let names: Vec<_> = records[0].iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["total", "orderId"]);
        assert_eq!(
            serde_json::to_string(&records[0]).unwrap(),
            r#"{"total":12.5,"orderId":"o-1"}"#
        );
    }

    #[test]
    fn test_repeated_column_name_replaces_value() {
        let mut record = DecodedRecord::new();
        record.insert("n".to_string(), DecodedValue::Integer(1));
        record.insert("m".to_string(), DecodedValue::Integer(2));
        record.insert("n".to_string(), DecodedValue::Integer(3));

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("n"), Some(&DecodedValue::Integer(3)));
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"n":3,"m":2}"#);
    }
}
