//! Query-related data models.
//!
//! This module defines the outcome of one executed statement and the
//! restartable cursor callers read its rows through.

use crate::error::ErrorStatus;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Raw outcome of running a statement on a driver.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: i64,
    pub status: ErrorStatus,
}

impl Execution {
    /// An execution that never reached the server.
    pub fn failed(status: ErrorStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Result of one executed statement with forward-only, restartable iteration.
///
/// Clones share row storage but keep their own cursor.
#[derive(Debug, Clone)]
pub struct QueryResult {
    data: Arc<[Row]>,
    rows: u64,
    last_insert_id: i64,
    status: ErrorStatus,
    position: usize,
}

impl QueryResult {
    /// Wrap a driver execution. `rows` is the row count when the statement
    /// returned rows, the affected-row count otherwise.
    pub fn from_execution(execution: Execution) -> Self {
        let rows = if execution.rows.is_empty() {
            execution.rows_affected
        } else {
            execution.rows.len() as u64
        };
        Self {
            data: execution.rows.into(),
            rows,
            last_insert_id: execution.last_insert_id,
            status: execution.status,
            position: 0,
        }
    }

    /// Row count for selections, affected-row count otherwise.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn errno(&self) -> i64 {
        self.status.code
    }

    pub fn error(&self) -> &str {
        &self.status.message
    }

    pub fn status(&self) -> &ErrorStatus {
        &self.status
    }

    /// Identifier generated by this statement (0 when none was generated).
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    /// Alias for [`QueryResult::last_insert_id`].
    pub fn last_id(&self) -> i64 {
        self.last_insert_id()
    }

    /// Reset iteration to the first row. `false` when there is no row to seek to.
    pub fn rewind(&mut self) -> bool {
        if self.data.is_empty() {
            return false;
        }
        self.position = 0;
        true
    }

    /// Collect every unread row. The cursor stays exhausted afterwards;
    /// call [`QueryResult::rewind`] to iterate again.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.by_ref().collect()
    }

    /// Whether two results are backed by the same materialized rows.
    pub fn shares_rows_with(&self, other: &QueryResult) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Iterator for QueryResult {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row = self.data.get(self.position)?.clone();
        self.position += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.data.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            rows: u64,
            errno: i64,
            error: &'a str,
            last_insert_id: i64,
            data: &'a [Row],
        }

        View {
            rows: self.rows,
            errno: self.errno(),
            error: self.error(),
            last_insert_id: self.last_insert_id,
            data: &self.data,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row
    }

    fn select_result(count: i64) -> QueryResult {
        QueryResult::from_execution(Execution {
            rows: (1..=count).map(row).collect(),
            ..Execution::default()
        })
    }

    #[test]
    fn test_rows_counts_returned_rows() {
        assert_eq!(select_result(3).rows(), 3);
    }

    #[test]
    fn test_rows_counts_affected_rows_for_writes() {
        let result = QueryResult::from_execution(Execution {
            rows_affected: 7,
            last_insert_id: 42,
            ..Execution::default()
        });
        assert_eq!(result.rows(), 7);
        assert_eq!(result.last_insert_id(), 42);
        assert_eq!(result.last_id(), 42);
    }

    #[test]
    fn test_next_until_exhausted() {
        let mut result = select_result(2);
        assert_eq!(result.next(), Some(row(1)));
        assert_eq!(result.next(), Some(row(2)));
        assert_eq!(result.next(), None);
        assert_eq!(result.next(), None);
    }

    #[test]
    fn test_rewind_restarts() {
        let mut result = select_result(2);
        result.next();
        result.next();
        assert!(result.rewind());
        assert_eq!(result.next(), Some(row(1)));
    }

    #[test]
    fn test_rewind_without_rows() {
        let mut result = QueryResult::from_execution(Execution::default());
        assert!(!result.rewind());
        assert_eq!(result.next(), None);
    }

    #[test]
    fn test_fetch_all_leaves_cursor_exhausted() {
        let mut result = select_result(3);
        let rows = result.fetch_all();
        assert_eq!(rows.len(), 3);
        assert_eq!(result.next(), None);

        assert!(result.rewind());
        assert_eq!(result.fetch_all(), rows);
    }

    #[test]
    fn test_clones_keep_their_own_cursor() {
        let mut first = select_result(2);
        first.next();
        let mut second = first.clone();
        assert!(second.shares_rows_with(&first));
        second.rewind();
        assert_eq!(second.next(), Some(row(1)));
        assert_eq!(first.next(), Some(row(2)));
    }

    #[test]
    fn test_error_fields() {
        let result = QueryResult::from_execution(Execution::failed(ErrorStatus::new(
            1064,
            "You have an error in your SQL syntax",
        )));
        assert_eq!(result.errno(), 1064);
        assert!(result.error().contains("SQL syntax"));
        assert_eq!(result.rows(), 0);
    }

    #[test]
    fn test_serialize() {
        let result = select_result(1);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rows"], 1);
        assert_eq!(value["errno"], 0);
        assert_eq!(value["data"][0]["id"], 1);
    }
}
