use std::path::PathBuf;

use crate::core::value::CellValue;

/// Materialized result set of one query: sanitized column names plus
/// one projected cell per column per row. Zero rows is a valid,
/// explicitly empty result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecResult {
    pub changes: u64,
    pub last_insert_rowid: i64,
}

/// A statement either produces rows (even zero of them) or only
/// side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(QueryResult),
    Exec(ExecResult),
}

/// One entry of the connection slot table, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SlotStatus {
    pub db: usize,
    pub path: Option<PathBuf>,
}
