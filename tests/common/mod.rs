//! In-memory stand-ins for the query engine, catalog and export service

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use export_pipeline::catalog::Catalog;
use export_pipeline::error::{PipelineError, Result};
use export_pipeline::execution::{ExecutionStatus, QueryEngine, QueryRequest, QueryState, ResultPage};
use export_pipeline::export::{ExportRequest, ExportService};
use export_pipeline::tables::extract_table_from_command;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct WarehouseState {
    next_id: u32,
    submitted: Vec<QueryRequest>,
    statements: HashMap<String, String>,
    scripts: HashMap<String, VecDeque<QueryState>>,
    reasons: HashMap<String, String>,
    pages: HashMap<String, Vec<ResultPage>>,
    tokens: HashMap<String, String>,
    tables: HashSet<String>,
    status_calls: usize,
    page_calls: Vec<Option<String>>,
    default_script: Vec<QueryState>,
    default_reason: Option<String>,
    fail_statements_containing: Option<(String, String)>,
}

/// Query engine and catalog sharing one set of tables.
///
/// `CREATE ... TABLE x` registers `x` and `DROP TABLE ... x` removes it once
/// the statement succeeds, so catalog answers follow executed DDL.
pub struct FakeWarehouse {
    state: Mutex<WarehouseState>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WarehouseState {
                default_script: vec![QueryState::Succeeded],
                ..WarehouseState::default()
            }),
        }
    }

    /// Status sequence every subsequent submission walks through; the last state sticks
    pub fn script_statuses(&self, states: Vec<QueryState>, reason: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.default_script = states;
        state.default_reason = reason.map(str::to_string);
    }

    /// Make statements containing `needle` fail with `reason`
    pub fn fail_statements_containing(&self, needle: &str, reason: &str) {
        self.state.lock().unwrap().fail_statements_containing =
            Some((needle.to_string(), reason.to_string()));
    }

    pub fn with_table(self, name: &str) -> Self {
        self.state.lock().unwrap().tables.insert(name.to_string());
        self
    }

    /// Register an already finished query with its result pages
    pub fn finished_query(&self, id: &str, statement: &str, pages: Vec<ResultPage>) {
        let mut state = self.state.lock().unwrap();
        state.statements.insert(id.to_string(), statement.to_string());
        state
            .scripts
            .insert(id.to_string(), VecDeque::from(vec![QueryState::Succeeded]));
        state.pages.insert(id.to_string(), pages);
    }

    pub fn submitted(&self) -> Vec<QueryRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submitted_statements(&self) -> Vec<String> {
        self.submitted().into_iter().map(|r| r.statement).collect()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn page_calls(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().page_calls.clone()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains(name)
    }
}

fn apply_ddl(tables: &mut HashSet<String>, statement: &str) {
    let upper = statement.trim_start().to_ascii_uppercase();
    if let Ok(name) = extract_table_from_command(statement) {
        if upper.starts_with("CREATE") {
            tables.insert(name);
        } else if upper.starts_with("DROP") {
            tables.remove(&name);
        }
    }
}

#[async_trait]
impl QueryEngine for FakeWarehouse {
    async fn submit_query(&self, request: &QueryRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        // Same token, same execution
        if let Some(token) = &request.client_request_token {
            if let Some(id) = state.tokens.get(token) {
                return Ok(id.clone());
            }
        }

        state.next_id += 1;
        let id = format!("q-{}", state.next_id);
        state.submitted.push(request.clone());
        state.statements.insert(id.clone(), request.statement.clone());
        if let Some(token) = &request.client_request_token {
            state.tokens.insert(token.clone(), id.clone());
        }

        let failing = state
            .fail_statements_containing
            .clone()
            .filter(|(needle, _)| request.statement.contains(needle.as_str()));
        if let Some((_, reason)) = failing {
            state.scripts.insert(id.clone(), VecDeque::from(vec![QueryState::Failed]));
            state.reasons.insert(id.clone(), reason);
        } else {
            let script = VecDeque::from(state.default_script.clone());
            state.scripts.insert(id.clone(), script);
            if let Some(reason) = state.default_reason.clone() {
                state.reasons.insert(id.clone(), reason);
            }
        }
        Ok(id)
    }

    async fn get_execution_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;

        let script = state
            .scripts
            .get_mut(execution_id)
            .ok_or_else(|| PipelineError::Engine(format!("Unknown execution {}", execution_id)))?;
        let current = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            *script.front().unwrap()
        };

        let statement = state.statements.get(execution_id).cloned();
        if current == QueryState::Succeeded {
            if let Some(statement) = &statement {
                apply_ddl(&mut state.tables, statement);
            }
        }

        Ok(ExecutionStatus {
            state: current,
            failure_reason: if current == QueryState::Succeeded {
                None
            } else {
                state.reasons.get(execution_id).cloned()
            },
            statement,
        })
    }

    async fn get_result_page(
        &self,
        execution_id: &str,
        continuation_token: Option<&str>,
    ) -> Result<ResultPage> {
        let mut state = self.state.lock().unwrap();
        state.page_calls.push(continuation_token.map(str::to_string));

        let pages = state
            .pages
            .get(execution_id)
            .ok_or_else(|| PipelineError::Engine(format!("No results for {}", execution_id)))?;
        let idx = match continuation_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| PipelineError::Engine(format!("Bad token {}", token)))?,
        };

        let mut page = pages
            .get(idx)
            .cloned()
            .ok_or_else(|| PipelineError::Engine(format!("No page {}", idx)))?;
        page.continuation_token = if idx + 1 < pages.len() {
            Some(format!("page-{}", idx + 1))
        } else {
            None
        };
        Ok(page)
    }
}

#[async_trait]
impl Catalog for FakeWarehouse {
    async fn table_exists(&self, _database: &str, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().tables.contains(name))
    }
}

/// Catalog whose probe always fails
pub struct BrokenCatalog;

#[async_trait]
impl Catalog for BrokenCatalog {
    async fn table_exists(&self, _database: &str, _name: &str) -> Result<bool> {
        Err(PipelineError::Catalog("AccessDeniedException".to_string()))
    }
}

/// Export service recording every request
pub struct FakeExportService {
    pub earliest: Option<DateTime<Utc>>,
    pub requests: Mutex<Vec<ExportRequest>>,
    pub probed_tables: Mutex<Vec<String>>,
}

impl FakeExportService {
    pub fn new(earliest: Option<DateTime<Utc>>) -> Self {
        Self {
            earliest,
            requests: Mutex::new(Vec::new()),
            probed_tables: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ExportService for FakeExportService {
    async fn earliest_restorable_time(&self, table_name: &str) -> Result<Option<DateTime<Utc>>> {
        self.probed_tables.lock().unwrap().push(table_name.to_string());
        Ok(self.earliest)
    }

    async fn start_export(&self, request: &ExportRequest) -> Result<String> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("arn:aws:dynamodb:export/{}", requests.len()))
    }
}

/// Build a page from string literals; `None` cells are absent values
pub fn page(rows: Vec<Vec<Option<&str>>>) -> ResultPage {
    ResultPage {
        rows: rows
            .into_iter()
            .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
            .collect(),
        continuation_token: None,
        columns: None,
    }
}
