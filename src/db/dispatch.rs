//! Typed operations that can be routed to a backend.
//!
//! [`Operation`] is the closed set of backend operations; [`Operation::parse`]
//! builds one from a loosely typed name and string arguments (the shape used
//! by the command line), and [`Operation::apply`] runs it against a backend.

use crate::db::backend::Backend;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionParams, QueryResult};
use serde::Serialize;

/// A backend operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    SetConnectionUri { uri: String },
    Connect,
    IsConnected,
    Disconnect,
    Query { sql: String, use_cache: bool },
    LastInsertId,
    Escape { text: String },
    Quote { text: String },
    StartTransaction,
    EndTransaction { commit: bool },
    CommitTransaction,
    RollbackTransaction,
}

impl Operation {
    /// Build an operation from its name and arguments.
    ///
    /// Names match case-insensitively, with or without underscores
    /// (`startTransaction`, `start_transaction`). `lastId` is accepted as an
    /// alias of `lastInsertId`.
    pub fn parse(name: &str, args: &[String]) -> DbResult<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        let op = match normalized.as_str() {
            "setconnectionuri" => {
                arity(name, args, 1, 1)?;
                Self::SetConnectionUri { uri: args[0].clone() }
            }
            "connect" => no_args(name, args, Self::Connect)?,
            "isconnected" => no_args(name, args, Self::IsConnected)?,
            "disconnect" => no_args(name, args, Self::Disconnect)?,
            "query" => {
                arity(name, args, 1, 2)?;
                let use_cache = match args.get(1) {
                    Some(value) => parse_bool(value)?,
                    None => true,
                };
                Self::Query { sql: args[0].clone(), use_cache }
            }
            "lastinsertid" | "lastid" => no_args(name, args, Self::LastInsertId)?,
            "escape" => {
                arity(name, args, 1, 1)?;
                Self::Escape { text: args[0].clone() }
            }
            "quote" => {
                arity(name, args, 1, 1)?;
                Self::Quote { text: args[0].clone() }
            }
            "starttransaction" => no_args(name, args, Self::StartTransaction)?,
            "endtransaction" => {
                arity(name, args, 0, 1)?;
                let commit = match args.first() {
                    Some(value) => parse_bool(value)?,
                    None => true,
                };
                Self::EndTransaction { commit }
            }
            "committransaction" => no_args(name, args, Self::CommitTransaction)?,
            "rollbacktransaction" => no_args(name, args, Self::RollbackTransaction)?,
            _ => return Err(DbError::unsupported_operation(name)),
        };
        Ok(op)
    }

    /// Canonical operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetConnectionUri { .. } => "setConnectionUri",
            Self::Connect => "connect",
            Self::IsConnected => "isConnected",
            Self::Disconnect => "disconnect",
            Self::Query { .. } => "query",
            Self::LastInsertId => "lastInsertId",
            Self::Escape { .. } => "escape",
            Self::Quote { .. } => "quote",
            Self::StartTransaction => "startTransaction",
            Self::EndTransaction { .. } => "endTransaction",
            Self::CommitTransaction => "commitTransaction",
            Self::RollbackTransaction => "rollbackTransaction",
        }
    }

    /// Run the operation on a backend.
    pub async fn apply(self, backend: &mut Backend) -> DbResult<Outcome> {
        let outcome = match self {
            Self::SetConnectionUri { uri } => Outcome::Params(backend.set_connection_uri(&uri)?),
            Self::Connect => Outcome::Bool(backend.connect().await),
            Self::IsConnected => Outcome::Bool(backend.is_connected().await),
            Self::Disconnect => Outcome::Bool(backend.disconnect().await),
            Self::Query { sql, use_cache } => Outcome::Query(backend.query(&sql, use_cache).await?),
            Self::LastInsertId => Outcome::Id(backend.last_insert_id().await),
            Self::Escape { text } => Outcome::Text(backend.escape(&text).await?),
            Self::Quote { text } => Outcome::Text(backend.quote(&text).await?),
            Self::StartTransaction => Outcome::Bool(backend.start_transaction().await),
            Self::EndTransaction { commit } => Outcome::Bool(backend.end_transaction(commit).await),
            Self::CommitTransaction => Outcome::Bool(backend.commit_transaction().await),
            Self::RollbackTransaction => Outcome::Bool(backend.rollback_transaction().await),
        };
        Ok(outcome)
    }
}

/// Value produced by an [`Operation`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Params(ConnectionParams),
    Bool(bool),
    Query(QueryResult),
    Id(i64),
    Text(String),
}

impl Outcome {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_query(self) -> Option<QueryResult> {
        match self {
            Self::Query(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_params(self) -> Option<ConnectionParams> {
        match self {
            Self::Params(params) => Some(params),
            _ => None,
        }
    }
}

fn arity(name: &str, args: &[String], min: usize, max: usize) -> DbResult<()> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else {
        format!("{} to {}", min, max)
    };
    Err(DbError::invalid_input(format!(
        "{} expects {} argument(s), got {}",
        name,
        expected,
        args.len()
    )))
}

fn no_args(name: &str, args: &[String], op: Operation) -> DbResult<Operation> {
    arity(name, args, 0, 0)?;
    Ok(op)
}

fn parse_bool(value: &str) -> DbResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(DbError::invalid_input(format!("Expected a boolean, got '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_name_forms() {
        assert_eq!(
            Operation::parse("startTransaction", &[]).unwrap(),
            Operation::StartTransaction
        );
        assert_eq!(
            Operation::parse("start_transaction", &[]).unwrap(),
            Operation::StartTransaction
        );
        assert_eq!(Operation::parse("lastId", &[]).unwrap(), Operation::LastInsertId);
        assert_eq!(Operation::parse("LAST_INSERT_ID", &[]).unwrap(), Operation::LastInsertId);
    }

    #[test]
    fn test_parse_query_defaults_to_cache() {
        assert_eq!(
            Operation::parse("query", &args(&["SELECT 1"])).unwrap(),
            Operation::Query { sql: "SELECT 1".into(), use_cache: true }
        );
        assert_eq!(
            Operation::parse("query", &args(&["SELECT 1", "false"])).unwrap(),
            Operation::Query { sql: "SELECT 1".into(), use_cache: false }
        );
    }

    #[test]
    fn test_parse_end_transaction() {
        assert_eq!(
            Operation::parse("endTransaction", &[]).unwrap(),
            Operation::EndTransaction { commit: true }
        );
        assert_eq!(
            Operation::parse("endTransaction", &args(&["0"])).unwrap(),
            Operation::EndTransaction { commit: false }
        );
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = Operation::parse("dropEverything", &[]).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_parse_bad_arguments() {
        assert!(matches!(
            Operation::parse("query", &[]).unwrap_err(),
            DbError::InvalidInput { .. }
        ));
        assert!(Operation::parse("connect", &args(&["extra"])).is_err());
        assert!(Operation::parse("query", &args(&["SELECT 1", "maybe"])).is_err());
        assert!(Operation::parse("escape", &args(&["a", "b"])).is_err());
    }

    #[test]
    fn test_name_round_trips() {
        for op in [
            Operation::Connect,
            Operation::LastInsertId,
            Operation::CommitTransaction,
            Operation::EndTransaction { commit: true },
        ] {
            let parsed = Operation::parse(op.name(), &[]).unwrap();
            assert_eq!(parsed.name(), op.name());
        }
    }

    #[test]
    fn test_outcome_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Outcome::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Outcome::Id(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Outcome::Text("x".into())).unwrap(), "\"x\"");
        assert_eq!(Outcome::Id(7).as_id(), Some(7));
        assert_eq!(Outcome::Bool(true).as_id(), None);
    }
}
