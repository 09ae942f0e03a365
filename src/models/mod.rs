//! Data models for the database router.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    BackendOptions, ConnectionParams, ConnectionReference, DatabaseType, TransactionState,
};
pub use query::{Execution, QueryResult, Row};
