//! Database dispatch macro for reducing code duplication.
//!
//! The sqlx connection types share no object-safe trait we can call through,
//! so every operation on a [`DbConnection`](crate::db::sqlx_driver::DbConnection)
//! is one `match` with a near-identical arm per engine. This macro writes
//! those arms while keeping the call site readable.

/// Macro for generating connection dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(connection, {
///     MySql(c) => mysql::execute(c, sql).await,
///     Postgres(c) => postgres::execute(c, sql).await,
///     SQLite(c) => sqlite::execute(c, sql).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::sqlx_driver::DbConnection::$variant($c) => $body,
            )+
        }
    };
}
