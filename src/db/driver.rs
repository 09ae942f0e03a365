//! Wire-level driver capability and the scheme-keyed driver factory.
//!
//! A `Driver` owns at most one live connection to a database engine. It knows
//! how to open and close it, how to run a statement and how to report what went
//! wrong; everything above that (caching, transactions, routing) lives in
//! [`Backend`](crate::db::Backend) and is shared by all drivers.

use crate::db::sqlx_driver::SqlxDriver;
use crate::error::{DbError, DbResult, ErrorStatus};
use crate::models::{ConnectionParams, DatabaseType, Execution};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// SQL dialect spoken by this driver.
    fn dialect(&self) -> DatabaseType;

    /// Open a connection. Any previous handle is dropped; on failure no handle is kept.
    async fn open(&mut self, params: &ConnectionParams) -> Result<(), ErrorStatus>;

    /// Whether a connection handle exists (it may be stale).
    fn has_handle(&self) -> bool;

    /// Whether the server still reports an active session for the handle.
    async fn is_alive(&mut self) -> bool;

    /// Close the connection. The handle is released even when closing reports an error.
    async fn close(&mut self) -> Result<(), ErrorStatus>;

    /// Run one statement. Failures are reported in `Execution::status`.
    async fn execute(&mut self, sql: &str) -> Execution;

    /// Last identifier generated on this connection, 0 when none.
    fn last_insert_id(&self) -> i64;

    /// Escape a string for this dialect. Callers must hold a live connection.
    fn escape(&self, text: &str) -> String {
        self.dialect().escape(text)
    }
}

/// Builds a driver for a parsed connection URI.
pub type DriverConstructor =
    Arc<dyn Fn(&ConnectionParams) -> DbResult<Box<dyn Driver>> + Send + Sync>;

/// Scheme-keyed registry of driver constructors.
#[derive(Clone, Default)]
pub struct DriverFactory {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverFactory {
    /// Create a factory with no schemes registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory with the sqlx-backed MySQL, PostgreSQL and SQLite drivers.
    pub fn with_sqlx_drivers() -> Self {
        let mut factory = Self::new();
        for db_type in [DatabaseType::MySQL, DatabaseType::PostgreSQL, DatabaseType::SQLite] {
            for scheme in db_type.schemes() {
                factory.register(*scheme, move |_: &ConnectionParams| {
                    Ok(Box::new(SqlxDriver::new(db_type)) as Box<dyn Driver>)
                });
            }
        }
        factory
    }

    /// Register (or replace) the constructor for a scheme.
    pub fn register<F>(&mut self, scheme: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ConnectionParams) -> DbResult<Box<dyn Driver>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(scheme.into().to_ascii_lowercase(), Arc::new(constructor));
        self
    }

    /// Build a driver for the scheme of `params`.
    pub fn create(&self, params: &ConnectionParams) -> DbResult<Box<dyn Driver>> {
        let constructor = self.constructors.get(&params.scheme).ok_or_else(|| {
            DbError::invalid_input(format!("Unknown scheme '{}'", params.scheme))
        })?;
        constructor(params)
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.constructors.keys().cloned().collect();
        schemes.sort();
        schemes
    }
}

impl std::fmt::Debug for DriverFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverFactory")
            .field("schemes", &self.schemes())
            .finish()
    }
}
