//! Per-reference backend: one live connection, its query cache and its
//! transaction state.
//!
//! Connect and query problems never surface as errors here; they are captured
//! in the backend's [`ErrorStatus`] (and in the returned [`QueryResult`]) for
//! the caller to inspect. The only hard failure is [`Backend::escape`] without
//! a connection, since an un-escaped value must never be used.

use crate::db::cache::QueryCache;
use crate::db::driver::Driver;
use crate::error::{CLIENT_UNKNOWN_ERROR, DbError, DbResult, ErrorStatus};
use crate::models::{ConnectionParams, DatabaseType, QueryResult, TransactionState};
use tracing::{debug, info, warn};

const COMMIT: &str = "COMMIT";
const ROLLBACK: &str = "ROLLBACK";

#[derive(Debug)]
pub struct Backend {
    params: Option<ConnectionParams>,
    driver: Box<dyn Driver>,
    cache: QueryCache,
    transaction: TransactionState,
    error: ErrorStatus,
}

impl Backend {
    /// Create a backend around a driver. No connection is opened yet.
    pub fn new(driver: Box<dyn Driver>) -> Self {
        Self {
            params: None,
            driver,
            cache: QueryCache::new(),
            transaction: TransactionState::Idle,
            error: ErrorStatus::ok(),
        }
    }

    /// Parse and store the connection URI, returning the parsed parameters.
    pub fn set_connection_uri(&mut self, uri: &str) -> DbResult<ConnectionParams> {
        let params = ConnectionParams::parse(uri)?;
        Ok(self.set_connection_params(params))
    }

    /// Store already parsed connection parameters. Takes effect on the next connect.
    ///
    /// The query cache is always emptied: cached results belong to the
    /// previous target.
    pub fn set_connection_params(&mut self, params: ConnectionParams) -> ConnectionParams {
        if !self.cache.is_empty() {
            debug!(cached = self.cache.len(), "Connection URI changed, clearing query cache");
        }
        self.cache = QueryCache::with_capacity(params.options.cache_capacity);
        self.params = Some(params.clone());
        params
    }

    pub fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    pub fn dialect(&self) -> DatabaseType {
        self.driver.dialect()
    }

    /// Status of the most recent connect or query attempt.
    pub fn error(&self) -> &ErrorStatus {
        &self.error
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Connect to the database. A no-op success when already connected.
    ///
    /// Calling this is optional: [`Backend::query`] connects on demand.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected().await {
            return true;
        }

        let Some(params) = &self.params else {
            self.error = ErrorStatus::new(CLIENT_UNKNOWN_ERROR, "No connection URI has been set");
            return false;
        };

        match self.driver.open(params).await {
            Ok(()) => {
                info!(
                    scheme = %params.scheme,
                    host = ?params.host,
                    database = ?params.database,
                    "Connected"
                );
                self.error = ErrorStatus::ok();
                // A fresh session never carries a transaction over
                self.end_session_transaction("Reconnected after the session was lost");
                true
            }
            Err(status) => {
                warn!(
                    scheme = %params.scheme,
                    host = ?params.host,
                    code = status.code,
                    error = %status.message,
                    "Connect failed"
                );
                self.error = status;
                false
            }
        }
    }

    /// A handle exists and the server still reports a session for it.
    pub async fn is_connected(&mut self) -> bool {
        self.driver.has_handle() && self.driver.is_alive().await
    }

    /// Close the live connection. Succeeds trivially when there is nothing to close.
    ///
    /// An open transaction ends with the session: the server rolls it back
    /// and the backend returns to `Idle`.
    pub async fn disconnect(&mut self) -> bool {
        if !self.is_connected().await {
            if self.driver.has_handle() {
                // Stale handle: release it, the server already dropped the session
                let _ = self.driver.close().await;
            }
            self.end_session_transaction("Released a lost session");
            return true;
        }

        let closed = self.driver.close().await;
        self.end_session_transaction("Disconnected");

        match closed {
            Ok(()) => {
                info!("Disconnected");
                true
            }
            Err(status) => {
                self.error = status;
                false
            }
        }
    }

    /// The session that held the transaction is gone; so is the transaction.
    fn end_session_transaction(&mut self, reason: &str) {
        if self.transaction.is_active() {
            warn!(reason, "Open transaction was rolled back by the server");
            self.transaction = TransactionState::Idle;
        }
    }

    /// Run a statement.
    ///
    /// With `use_cache`, a previous result for the exact same text is returned
    /// rewound instead of re-executing. Fresh results of `SELECT` statements are
    /// cached when `use_cache` is set; nothing else is ever cached. Fails only
    /// when no connection could be established; execution errors are reported
    /// through the result's status.
    pub async fn query(&mut self, sql: &str, use_cache: bool) -> DbResult<QueryResult> {
        if use_cache {
            if let Some(hit) = self.cache.get(sql) {
                debug!(sql = %sql, rows = hit.rows(), "Query cache hit");
                return Ok(hit);
            }
        }

        if !self.connect().await {
            return Err(DbError::connection(self.error.clone()));
        }

        debug!(sql = %sql, use_cache, "Executing statement");
        let execution = self.driver.execute(sql).await;
        self.error = execution.status.clone();
        let result = QueryResult::from_execution(execution);

        if result.status().is_error() {
            debug!(sql = %sql, errno = result.errno(), error = %result.error(), "Statement failed");
        }

        if use_cache && self.cache.insert(sql, &result) {
            debug!(sql = %sql, cached = self.cache.len(), "Cached query result");
        }

        Ok(result)
    }

    /// Last generated identifier on this connection, or -1 when not connected.
    pub async fn last_insert_id(&mut self) -> i64 {
        if self.is_connected().await {
            return self.driver.last_insert_id();
        }
        -1
    }

    /// Alias for [`Backend::last_insert_id`].
    pub async fn last_id(&mut self) -> i64 {
        self.last_insert_id().await
    }

    /// Escape a string for this backend's dialect, connecting if needed.
    pub async fn escape(&mut self, text: &str) -> DbResult<String> {
        if self.connect().await {
            return Ok(self.driver.escape(text));
        }
        Err(DbError::escape(text, self.error.clone()))
    }

    /// Escape a string and wrap it in single quotes.
    pub async fn quote(&mut self, text: &str) -> DbResult<String> {
        Ok(format!("'{}'", self.escape(text).await?))
    }

    /// Open a transaction. Returns the resulting state; a second call while
    /// a transaction is open does nothing.
    pub async fn start_transaction(&mut self) -> bool {
        if self.transaction.is_active() {
            return true;
        }

        let begin = self.dialect().begin_statement();
        match self.query(begin, false).await {
            Ok(result) if result.status().is_ok() => {
                self.transaction = TransactionState::Active;
                info!("Transaction started");
            }
            Ok(result) => {
                warn!(errno = result.errno(), error = %result.error(), "Could not start transaction");
            }
            Err(e) => warn!(error = %e, "Could not start transaction"),
        }

        self.transaction.is_active()
    }

    /// End the open transaction with COMMIT (`commit`) or ROLLBACK.
    ///
    /// Returns `false` when no transaction is open and `true` once it has
    /// ended. When the statement fails the transaction stays open and the
    /// still-open state (`true`) is returned; check [`Backend::in_transaction`].
    pub async fn end_transaction(&mut self, commit: bool) -> bool {
        if !self.transaction.is_active() {
            return false;
        }

        let statement = if commit { COMMIT } else { ROLLBACK };
        match self.query(statement, false).await {
            Ok(result) if result.status().is_ok() => {
                self.transaction = TransactionState::Idle;
                info!(statement, "Transaction ended");
                return true;
            }
            Ok(result) => {
                warn!(statement, errno = result.errno(), error = %result.error(), "Could not end transaction");
            }
            Err(e) => warn!(statement, error = %e, "Could not end transaction"),
        }

        self.transaction.is_active()
    }

    /// Same as `end_transaction(true)`.
    pub async fn commit_transaction(&mut self) -> bool {
        self.end_transaction(true).await
    }

    /// Same as `end_transaction(false)`.
    pub async fn rollback_transaction(&mut self) -> bool {
        self.end_transaction(false).await
    }
}
