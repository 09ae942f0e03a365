//! sqlx-backed drivers for MySQL, PostgreSQL and SQLite.
//!
//! Each driver holds a single connection, never a pool: one live connection
//! per registered reference. Statements are sent unprepared so that
//! transaction control (`START TRANSACTION`, `COMMIT`) and DDL go through
//! unchanged.
//!
//! The engine-specific modules below are intentionally parallel; differences
//! between them are the differences between the engines.

use crate::db::driver::Driver;
use crate::db::types::RowToJson;
use crate::error::ErrorStatus;
use crate::models::{ConnectionParams, DatabaseType, Execution};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::{Connection, Either, MySqlConnection, PgConnection, SqliteConnection};
use tracing::{debug, warn};

/// Engine-specific live connection.
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Open a connection for the given dialect.
    pub async fn open(dialect: DatabaseType, params: &ConnectionParams) -> Result<Self, sqlx::Error> {
        match dialect {
            DatabaseType::MySQL => mysql::connect(params).await.map(DbConnection::MySql),
            DatabaseType::PostgreSQL => postgres::connect(params).await.map(DbConnection::Postgres),
            DatabaseType::SQLite => sqlite::connect(params).await.map(DbConnection::SQLite),
        }
    }

    async fn ping(&mut self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.ping().await,
            Postgres(c) => c.ping().await,
            SQLite(c) => c.ping().await,
        })
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            Postgres(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
    }

    async fn execute(&mut self, sql: &str) -> Result<Execution, sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(c) => mysql::execute(c, sql).await,
            Postgres(c) => postgres::execute(c, sql).await,
            SQLite(c) => sqlite::execute(c, sql).await,
        })
    }
}

/// Driver speaking one database dialect over a single sqlx connection.
#[derive(Debug)]
pub struct SqlxDriver {
    dialect: DatabaseType,
    connection: Option<DbConnection>,
    last_insert_id: i64,
}

impl SqlxDriver {
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            connection: None,
            last_insert_id: 0,
        }
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn open(&mut self, params: &ConnectionParams) -> Result<(), ErrorStatus> {
        self.connection = None;
        self.last_insert_id = 0;

        match DbConnection::open(self.dialect, params).await {
            Ok(connection) => {
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => Err(ErrorStatus::from(&e)),
        }
    }

    fn has_handle(&self) -> bool {
        self.connection.is_some()
    }

    async fn is_alive(&mut self) -> bool {
        match self.connection.as_mut() {
            Some(connection) => match connection.ping().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Connection ping failed");
                    false
                }
            },
            None => false,
        }
    }

    async fn close(&mut self) -> Result<(), ErrorStatus> {
        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        connection.close().await.map_err(|e| {
            warn!(error = %e, dialect = %self.dialect, "Connection did not close cleanly");
            ErrorStatus::from(&e)
        })
    }

    async fn execute(&mut self, sql: &str) -> Execution {
        let Some(connection) = self.connection.as_mut() else {
            return Execution::failed(ErrorStatus::not_connected());
        };

        match connection.execute(sql).await {
            Ok(execution) => {
                self.last_insert_id = execution.last_insert_id;
                execution
            }
            Err(e) => Execution::failed(ErrorStatus::from(&e)),
        }
    }

    fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod mysql {
    use super::*;
    use sqlx::ConnectOptions;
    use sqlx::mysql::MySqlConnectOptions;

    pub async fn connect(params: &ConnectionParams) -> Result<MySqlConnection, sqlx::Error> {
        let mut options = MySqlConnectOptions::new()
            .host(params.host.as_deref().unwrap_or("localhost"))
            .charset("utf8mb4");
        if let Some(port) = params.port_or_default(DatabaseType::MySQL) {
            options = options.port(port);
        }
        if let Some(user) = &params.user {
            options = options.username(user);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(database) = &params.database {
            options = options.database(database);
        }
        options.connect().await
    }

    pub async fn execute(conn: &mut MySqlConnection, sql: &str) -> Result<Execution, sqlx::Error> {
        let mut execution = Execution::default();
        let mut stream = sqlx::Executor::fetch_many(&mut *conn, sql);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    execution.rows_affected += done.rows_affected();
                    execution.last_insert_id = done.last_insert_id() as i64;
                }
                Either::Right(row) => execution.rows.push(row.to_json_map()),
            }
        }
        Ok(execution)
    }
}

mod postgres {
    use super::*;
    use sqlx::ConnectOptions;
    use sqlx::postgres::PgConnectOptions;

    pub async fn connect(params: &ConnectionParams) -> Result<PgConnection, sqlx::Error> {
        let mut options = PgConnectOptions::new();
        if let Some(host) = &params.host {
            options = options.host(host);
        }
        if let Some(port) = params.port_or_default(DatabaseType::PostgreSQL) {
            options = options.port(port);
        }
        if let Some(user) = &params.user {
            options = options.username(user);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }
        if let Some(database) = &params.database {
            options = options.database(database);
        }
        options.connect().await
    }

    /// PostgreSQL has no connection-level generated id; `last_insert_id` stays 0.
    pub async fn execute(conn: &mut PgConnection, sql: &str) -> Result<Execution, sqlx::Error> {
        let mut execution = Execution::default();
        let mut stream = sqlx::Executor::fetch_many(&mut *conn, sql);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => execution.rows_affected += done.rows_affected(),
                Either::Right(row) => execution.rows.push(row.to_json_map()),
            }
        }
        Ok(execution)
    }
}

mod sqlite {
    use super::*;
    use sqlx::ConnectOptions;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;
    use url::Url;

    const MEMORY: &str = ":memory:";

    pub async fn connect(params: &ConnectionParams) -> Result<SqliteConnection, sqlx::Error> {
        let mut options = if params.path == MEMORY {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            // `sqlite://dir/file.db` puts the first segment in the host slot
            let filename = match &params.host {
                Some(host) => format!("{}{}", host, params.path),
                None => params.path.clone(),
            };
            SqliteConnectOptions::new().filename(filename)
        };

        if let Ok(url) = Url::parse(&params.uri) {
            for (key, value) in url.query_pairs() {
                match (key.as_ref(), value.as_ref()) {
                    ("mode", "ro") => options = options.read_only(true),
                    ("mode", "rwc") => options = options.create_if_missing(true),
                    _ => {}
                }
            }
        }

        options.connect().await
    }

    pub async fn execute(conn: &mut SqliteConnection, sql: &str) -> Result<Execution, sqlx::Error> {
        let mut execution = Execution::default();
        let mut stream = sqlx::Executor::fetch_many(&mut *conn, sql);
        while let Some(item) = stream.try_next().await? {
            match item {
                Either::Left(done) => {
                    execution.rows_affected += done.rows_affected();
                    execution.last_insert_id = done.last_insert_rowid();
                }
                Either::Right(row) => execution.rows.push(row.to_json_map()),
            }
        }
        Ok(execution)
    }
}
