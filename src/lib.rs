//! db-router library
//!
//! A registry of named database connections routed through one default
//! reference. Each connection is served by a backend with its own query cache
//! and transaction state; drivers for MySQL, PostgreSQL and SQLite are built on
//! sqlx, and other schemes can be plugged in through [`db::DriverFactory`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{Backend, ConnectionRegistry, DriverFactory, Operation, Outcome};
pub use error::{DbError, DbResult, ErrorStatus};
pub use models::{ConnectionParams, ConnectionReference, QueryResult};
