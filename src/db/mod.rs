//! Database access layer.
//!
//! - Connection registry and default-reference routing
//! - Per-reference backends with query cache and transaction state
//! - Driver capability and scheme-keyed driver factory
//! - sqlx drivers for MySQL, PostgreSQL and SQLite
//! - Row decoding and dispatch macros

pub mod backend;
pub mod cache;
pub mod dispatch;
pub mod driver;
#[macro_use]
pub mod macros;
pub mod registry;
pub mod sqlx_driver;
pub mod types;

pub use backend::Backend;
pub use cache::QueryCache;
pub use dispatch::{Operation, Outcome};
pub use driver::{Driver, DriverConstructor, DriverFactory};
pub use registry::ConnectionRegistry;
pub use sqlx_driver::SqlxDriver;
