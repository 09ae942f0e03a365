//! Error types for the database router.
//!
//! Two kinds of failure live here. `ErrorStatus` is the status report every
//! connect and query attempt leaves behind, success or not; callers inspect it
//! instead of catching anything. `DbError` covers the cases that must halt the
//! caller: bad registrations, unknown references, escaping without a
//! connection and operations outside the declared method set.

use serde::Serialize;
use thiserror::Error;

/// Client-side code for failures with no better classification.
pub const CLIENT_UNKNOWN_ERROR: i64 = 2000;
/// Client-side code for I/O failures while reaching the server.
pub const CLIENT_CONNECTION_ERROR: i64 = 2002;
/// Client-side code for a connection that is missing or was lost.
pub const CLIENT_SERVER_LOST: i64 = 2013;
/// Client-side code for TLS negotiation failures.
pub const CLIENT_SSL_ERROR: i64 = 2026;
/// Client-side code for malformed packets.
pub const CLIENT_PROTOCOL_ERROR: i64 = 2027;

/// Snapshot of a backend's error state, taken after every connect or query.
///
/// A code of zero or below means "no error".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStatus {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_state: Option<String>,
}

impl ErrorStatus {
    /// The status of an attempt that went well.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql_state: None,
        }
    }

    /// Status for an operation attempted without a live connection.
    pub fn not_connected() -> Self {
        Self::new(CLIENT_SERVER_LOST, "Not connected to the database server")
    }

    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code <= 0
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ok() {
            return write!(f, "OK");
        }
        match &self.sql_state {
            Some(state) => write!(f, "[{}] ({}) {}", self.code, state, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Capture the status of a failed sqlx call.
impl From<&sqlx::Error> for ErrorStatus {
    fn from(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let sql_state = db_err.code().map(|c| c.to_string());

                if let Some(mysql) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                    let status = ErrorStatus::new(i64::from(mysql.number()), db_err.message());
                    return match sql_state {
                        Some(state) => status.with_sql_state(state),
                        None => status,
                    };
                }

                // SQLite reports its (extended) result code as a number, PostgreSQL
                // reports an alphanumeric SQLSTATE.
                match sql_state {
                    Some(state) => match state.parse::<i64>() {
                        Ok(code) if code > 0 => ErrorStatus::new(code, db_err.message()),
                        _ => ErrorStatus::new(1, db_err.message()).with_sql_state(state),
                    },
                    None => ErrorStatus::new(1, db_err.message()),
                }
            }
            sqlx::Error::Io(io_err) => {
                ErrorStatus::new(CLIENT_CONNECTION_ERROR, format!("I/O error: {}", io_err))
            }
            sqlx::Error::Tls(tls_err) => {
                ErrorStatus::new(CLIENT_SSL_ERROR, format!("TLS error: {}", tls_err))
            }
            sqlx::Error::Protocol(msg) => {
                ErrorStatus::new(CLIENT_PROTOCOL_ERROR, format!("Protocol error: {}", msg))
            }
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                ErrorStatus::new(CLIENT_SERVER_LOST, err.to_string())
            }
            sqlx::Error::Configuration(msg) => ErrorStatus::new(
                CLIENT_UNKNOWN_ERROR,
                format!("Configuration error: {}", msg),
            ),
            _ => ErrorStatus::new(CLIENT_UNKNOWN_ERROR, err.to_string()),
        }
    }
}

impl From<sqlx::Error> for ErrorStatus {
    fn from(err: sqlx::Error) -> Self {
        ErrorStatus::from(&err)
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Registration of '{reference}' failed: {message}")]
    Registration { reference: String, message: String },

    #[error("Connection not found: {reference}")]
    ConnectionNotFound { reference: String },

    #[error("No default connection has been registered")]
    NoDefaultConnection,

    #[error("Connection failed: {status}")]
    Connection { status: ErrorStatus },

    /// Escaping needs a live connection; un-escaped input must never be used.
    #[error("Could not escape string '{input}': {status}")]
    Escape { input: String, status: ErrorStatus },

    #[error("No such operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DbError {
    /// Create a registration error.
    pub fn registration(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registration {
            reference: reference.into(),
            message: message.into(),
        }
    }

    /// Create a connection not found error.
    pub fn connection_not_found(reference: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            reference: reference.into(),
        }
    }

    /// Create a connection error from the status the backend captured.
    pub fn connection(status: ErrorStatus) -> Self {
        Self::Connection { status }
    }

    /// Create an escape error.
    pub fn escape(input: impl Into<String>, status: ErrorStatus) -> Self {
        Self::Escape {
            input: input.into(),
            status,
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Get the backend status attached to this error, if any.
    pub fn status(&self) -> Option<&ErrorStatus> {
        match self {
            Self::Connection { status } | Self::Escape { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Programming errors halt the caller; everything else can be retried or branched on.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::Escape { .. } | Self::UnsupportedOperation { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Result type alias for router operations.
pub type DbResult<T> = Result<T, DbError>;
