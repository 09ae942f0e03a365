//! Per-backend query result cache.
//!
//! Results are keyed by the MD5 digest of the exact statement text. Only
//! read-only selections are eligible; the text is not normalized, so
//! differences in whitespace or case land in different slots.

use crate::models::QueryResult;
use md5::{Digest, Md5};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Keyword a cacheable statement must start with.
const SELECT_KEYWORD: &str = "SELECT";

/// Check whether a statement may be cached: it must begin (after leading
/// whitespace) with `SELECT` followed by whitespace, in any case.
pub fn is_cacheable(sql: &str) -> bool {
    let sql = sql.trim_start();
    let Some(keyword) = sql.get(..SELECT_KEYWORD.len()) else {
        return false;
    };
    keyword.eq_ignore_ascii_case(SELECT_KEYWORD)
        && sql[SELECT_KEYWORD.len()..]
            .chars()
            .next()
            .is_some_and(char::is_whitespace)
}

/// Cache key for a statement.
pub fn cache_key(sql: &str) -> String {
    format!("{:x}", Md5::digest(sql.as_bytes()))
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<String, QueryResult>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl QueryCache {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache holding at most `capacity` statements (oldest evicted first).
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Look up a previous result for this exact statement, rewound to its first row.
    pub fn get(&self, sql: &str) -> Option<QueryResult> {
        let mut result = self.entries.get(&cache_key(sql))?.clone();
        result.rewind();
        Some(result)
    }

    /// Store a result for a cacheable statement. Returns `false` when the
    /// statement is not eligible.
    pub fn insert(&mut self, sql: &str, result: &QueryResult) -> bool {
        if !is_cacheable(sql) || self.capacity == Some(0) {
            return false;
        }

        let key = cache_key(sql);
        if self.entries.insert(key.clone(), result.clone()).is_none() {
            self.order.push_back(key);
        }

        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                debug!(key = %oldest, "Evicted cached query result");
            }
        }
        true
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.entries.contains_key(&cache_key(sql))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
