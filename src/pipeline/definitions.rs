//! External table definitions and derived aggregate queries per source table
//!
//! Full exports land under a per-export prefix, so each cycle's table points
//! at `<table>/AWSDynamoDB/<exportId>/data/` and rows are `Item` structs.
//! Incremental exports share `<table>/AWSDynamoDB/data/` and rows are change
//! records with `NewImage`/`OldImage`.

use crate::config::{CUSTOMER_ORDER_TABLE, ITEM_TABLE};
use crate::error::{PipelineError, Result};
use crate::events::{ExportEvent, EXPORT_NAMESPACE_MARKER};
use crate::export::ExportMode;
use crate::tables::TableDefinition;
use chrono::NaiveDate;

const ION_SERDE: &str = "ROW FORMAT SERDE 'com.amazon.ionhiveserde.IonHiveSerDe'";

/// Aggregate query run against a freshly (re)built table
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedQuery {
    /// Stable name, used for deduplication tokens and logs
    pub name: &'static str,
    pub statement: String,
    pub parameters: Vec<String>,
}

/// Everything to run for one export event
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub definition: TableDefinition,
    pub queries: Vec<DerivedQuery>,
}

/// Plan for an export of `event.source_table`; unknown tables are an error
pub fn plan_for(event: &ExportEvent, mode: ExportMode, bucket: &str, today: NaiveDate) -> Result<TablePlan> {
    let location = data_location(event, mode, bucket);
    let date_param = vec![format!("'{}'", today.format("%Y-%m-%d"))];

    match event.source_table.as_str() {
        ITEM_TABLE => Ok(TablePlan {
            definition: item_table(mode, location),
            queries: vec![DerivedQuery {
                name: "total_inventory",
                statement: total_inventory_query(mode),
                parameters: Vec::new(),
            }],
        }),
        CUSTOMER_ORDER_TABLE => Ok(TablePlan {
            definition: customer_order_table(mode, location),
            queries: vec![
                DerivedQuery {
                    name: "daily_earnings",
                    statement: daily_earnings_query(mode),
                    parameters: date_param.clone(),
                },
                DerivedQuery {
                    name: "most_expensive_order",
                    statement: most_expensive_order_query(mode),
                    parameters: date_param,
                },
            ],
        }),
        other => Err(PipelineError::UnknownTable(other.to_string())),
    }
}

pub fn data_location(event: &ExportEvent, mode: ExportMode, bucket: &str) -> String {
    match mode {
        ExportMode::Full => format!(
            "s3://{}/{}/{}/{}/data/",
            bucket, event.source_table, EXPORT_NAMESPACE_MARKER, event.export_id
        ),
        ExportMode::Incremental => format!(
            "s3://{}/{}/{}/data/",
            bucket, event.source_table, EXPORT_NAMESPACE_MARKER
        ),
    }
}

fn external_table(name: &str, columns: &str, location: &str) -> String {
    format!(
        "CREATE EXTERNAL TABLE {} (\n{}\n)\n{}\nLOCATION '{}'\nTBLPROPERTIES ('has_encrypted_data'='true');",
        name, columns, ION_SERDE, location
    )
}

fn item_table(mode: ExportMode, location: String) -> TableDefinition {
    match mode {
        ExportMode::Full => {
            let columns = "  Item struct <itemId: string,\n               category: string,\n               name: string,\n               price: decimal(10,2)>";
            TableDefinition::new(external_table("item", columns, &location), location)
                .with_drop("DROP TABLE IF EXISTS item;")
        }
        ExportMode::Incremental => {
            let columns = "  Record struct <NewImage: struct <itemId: string,\n                                   category: string,\n                                   name: string,\n                                   price: decimal(10,2)>,\n                 OldImage: struct <itemId: string>>";
            TableDefinition::new(external_table("item", columns, &location), location)
        }
    }
}

const CUSTOMER_ORDER_FIELDS: &str = "PK: string,
    SK: string,
    customerId: string,
    date: string,
    ENTITY_TYPE: string,
    orderId: string,
    email: string,
    name: string,
    itemId: string,
    itemName: string,
    price: decimal(10,2),
    quantity: decimal(10,0)";

fn customer_order_table(mode: ExportMode, location: String) -> TableDefinition {
    match mode {
        ExportMode::Full => {
            let columns = format!("  Item struct <{}>", CUSTOMER_ORDER_FIELDS);
            TableDefinition::new(external_table("customer_order", &columns, &location), location)
                .with_drop("DROP TABLE IF EXISTS customer_order;")
        }
        ExportMode::Incremental => {
            let columns = format!(
                "  Record struct <NewImage: struct <{}>,\n                 OldImage: struct <PK: string, SK: string>>",
                CUSTOMER_ORDER_FIELDS
            );
            TableDefinition::new(external_table("customer_order", &columns, &location), location)
        }
    }
}

/// Common table expressions splitting the single-table design into entities.
/// Incremental data may repeat a row per change, hence `DISTINCT`.
fn entity_ctes(mode: ExportMode) -> String {
    let (row, distinct) = match mode {
        ExportMode::Full => ("Item", ""),
        ExportMode::Incremental => ("Record.NewImage", "DISTINCT "),
    };
    format!(
        r#"WITH "customer" AS (
  SELECT {d}{r}.customerId AS customer_id,
         {r}.name AS name,
         {r}.email AS email
    FROM "customer_order"
   WHERE {r}.entity_type = 'CUSTOMER'
),
"order" AS (
  SELECT {d}{r}.orderId AS order_id,
         {r}.customerId AS customer_id,
         DATE(parse_datetime({r}.date, 'yyyy-MM-dd''T''HH:mm:ss.SSS''Z')) AS order_date
    FROM "customer_order"
   WHERE {r}.entity_type = 'ORDER'
),
"order_item" AS (
  SELECT {d}{r}.orderId AS order_id,
         {r}.itemId AS item_id,
         {r}.itemName AS item_name,
         {r}.price AS price,
         {r}.quantity AS quantity
    FROM "customer_order"
   WHERE {r}.entity_type = 'ORDER_ITEM'
)"#,
        d = distinct,
        r = row
    )
}

/// Total earnings of the given day
fn daily_earnings_query(mode: ExportMode) -> String {
    format!(
        r#"{}
SELECT o.order_date AS order_date,
       SUM(oi.price * oi.quantity) AS total
  FROM "order" AS o
 INNER JOIN "order_item" AS oi
    ON oi.order_id = o.order_id
 WHERE o.order_date = parse_datetime(?, 'yyyy-MM-dd')
 GROUP BY o.order_date
 ORDER BY order_date;"#,
        entity_ctes(mode)
    )
}

/// Most expensive order of the given day with all ordered items
fn most_expensive_order_query(mode: ExportMode) -> String {
    format!(
        r#"{}
SELECT o.order_id,
       c.customer_id,
       c.name AS customer_name,
       SUM(oi.price * oi.quantity) AS total,
       ARRAY_AGG(
         CAST(
           CAST(
             ROW(oi.item_id, oi.item_name, oi.quantity, oi.price)
               AS ROW(item_id VARCHAR, item_name VARCHAR, quantity INTEGER, price DOUBLE)
           ) AS JSON)
       ) AS items
  FROM "order" AS o
 INNER JOIN "order_item" AS oi
    ON oi.order_id = o.order_id
 INNER JOIN "customer" AS c
    ON c.customer_id = o.customer_id
 WHERE o.order_date = parse_datetime(?, 'yyyy-MM-dd')
 GROUP BY o.order_id, c.customer_id, c.name
 ORDER BY total DESC
 LIMIT 1"#,
        entity_ctes(mode)
    )
}

/// Number of items currently in the inventory
fn total_inventory_query(mode: ExportMode) -> String {
    match mode {
        ExportMode::Full => "SELECT COUNT(Item.Itemid) AS total_items\n  FROM item".to_string(),
        // Items whose key shows up as an OldImage were deleted at some point
        ExportMode::Incremental => r#"SELECT COUNT(DISTINCT i.Record.NewImage.itemId) AS total_items
  FROM "item" AS i
  LEFT OUTER JOIN (SELECT DISTINCT Record.OldImage.itemId AS item_id
                     FROM "item"
                    WHERE Record.OldImage.itemId IS NOT NULL) AS i_deleted
    ON i.Record.OldImage.itemId = i.Record.NewImage.itemId
 WHERE i.Record.NewImage.itemId IS NOT NULL
   AND i_deleted.item_id IS NULL"#
            .to_string(),
    }
}
