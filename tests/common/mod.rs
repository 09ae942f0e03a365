//! Shared test helpers: a scripted in-memory driver registered under the
//! `driver` scheme.

#![allow(dead_code)]

use async_trait::async_trait;
use db_router::db::{ConnectionRegistry, Driver, DriverFactory};
use db_router::error::{CLIENT_SERVER_LOST, ErrorStatus};
use db_router::models::{ConnectionParams, DatabaseType, Execution, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const SCHEME: &str = "driver";

/// Observable and scriptable state behind one [`ScriptedDriver`].
#[derive(Debug, Default)]
pub struct DriverState {
    /// A handle is held
    pub handle: bool,
    /// The server still has a session for the handle
    pub alive: bool,
    pub opens: usize,
    pub closes: usize,
    pub executed: Vec<String>,
    pub connect_error: Option<ErrorStatus>,
    pub close_error: Option<ErrorStatus>,
    pub responses: HashMap<String, Execution>,
    pub failures: HashMap<String, ErrorStatus>,
    pub next_insert_id: i64,
}

impl DriverState {
    /// How many times `sql` reached the driver.
    pub fn executions_of(&self, sql: &str) -> usize {
        self.executed.iter().filter(|s| s.as_str() == sql).count()
    }
}

pub type SharedState = Arc<Mutex<DriverState>>;

#[derive(Debug)]
pub struct ScriptedDriver {
    dialect: DatabaseType,
    state: SharedState,
    last_insert_id: i64,
}

impl ScriptedDriver {
    pub fn new(dialect: DatabaseType, state: SharedState) -> Self {
        Self {
            dialect,
            state,
            last_insert_id: 0,
        }
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    async fn open(&mut self, _params: &ConnectionParams) -> Result<(), ErrorStatus> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        if let Some(status) = state.connect_error.clone() {
            state.handle = false;
            state.alive = false;
            return Err(status);
        }
        state.handle = true;
        state.alive = true;
        Ok(())
    }

    fn has_handle(&self) -> bool {
        self.state.lock().unwrap().handle
    }

    async fn is_alive(&mut self) -> bool {
        let state = self.state.lock().unwrap();
        state.handle && state.alive
    }

    async fn close(&mut self) -> Result<(), ErrorStatus> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.handle = false;
        state.alive = false;
        match state.close_error.clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, sql: &str) -> Execution {
        let mut state = self.state.lock().unwrap();
        if !state.alive {
            return Execution::failed(ErrorStatus::new(CLIENT_SERVER_LOST, "server has gone away"));
        }
        state.executed.push(sql.to_string());

        if let Some(status) = state.failures.get(sql) {
            return Execution::failed(status.clone());
        }
        if let Some(execution) = state.responses.get(sql) {
            return execution.clone();
        }
        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            state.next_insert_id += 1;
            self.last_insert_id = state.next_insert_id;
            return Execution {
                rows_affected: 1,
                last_insert_id: state.next_insert_id,
                ..Execution::default()
            };
        }
        Execution::default()
    }

    fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }
}

/// Registry whose `driver://` backends are scripted drivers. Every driver the
/// factory builds is recorded with the database name from its URI.
pub struct Harness {
    pub registry: ConnectionRegistry,
    drivers: Arc<Mutex<Vec<(Option<String>, SharedState)>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_dialect(DatabaseType::MySQL)
    }

    pub fn with_dialect(dialect: DatabaseType) -> Self {
        let drivers: Arc<Mutex<Vec<(Option<String>, SharedState)>>> = Arc::default();
        let log = Arc::clone(&drivers);

        let mut factory = DriverFactory::new();
        factory.register(SCHEME, move |params: &ConnectionParams| {
            let state = SharedState::default();
            log.lock()
                .unwrap()
                .push((params.database.clone(), Arc::clone(&state)));
            Ok(Box::new(ScriptedDriver::new(dialect, state)) as Box<dyn Driver>)
        });

        Self {
            registry: ConnectionRegistry::new(factory),
            drivers,
        }
    }

    /// State of the most recent driver built for `database`.
    pub fn state(&self, database: &str) -> SharedState {
        let drivers = self.drivers.lock().unwrap();
        drivers
            .iter()
            .rev()
            .find(|(db, _)| db.as_deref() == Some(database))
            .map(|(_, state)| Arc::clone(state))
            .unwrap_or_else(|| panic!("no driver built for database '{database}'"))
    }

    /// Number of drivers built so far.
    pub fn built(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }
}

/// A scripted response carrying rows.
pub fn rows_response(rows: Vec<serde_json::Value>) -> Execution {
    Execution {
        rows: rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map as Row),
                _ => None,
            })
            .collect(),
        ..Execution::default()
    }
}

pub fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
