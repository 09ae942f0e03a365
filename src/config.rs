//! Configuration handling for the db-router command line.
//!
//! Connections and logging are configured via CLI arguments and environment
//! variables; the operation to run is given positionally.

use clap::Parser;

/// Reference used when a connection spec names neither a reference nor a database.
pub const DEFAULT_REFERENCE: &str = "default";

/// One `-d` entry: a connection URI and the reference to register it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub reference: String,
    pub uri: String,
}

impl ConnectionSpec {
    /// Parse `uri` or `reference=uri`.
    ///
    /// Without an explicit reference the database name from the URI path is
    /// used, falling back to `default`.
    pub fn parse(s: &str) -> Result<Self, String> {
        // Split reference=uri format (only if '=' before the scheme separator)
        let scheme_pos = s.find(':').unwrap_or(s.len());
        let (explicit, uri) = match s[..scheme_pos].find('=') {
            Some(idx) => (Some(s[..idx].trim()), s[idx + 1..].trim()),
            None => (None, s.trim()),
        };

        if let Some(reference) = explicit {
            if reference.is_empty() {
                return Err("Connection reference before '=' cannot be empty".to_string());
            }
            if reference.eq_ignore_ascii_case(DEFAULT_REFERENCE) {
                return Err(format!(
                    "Reference '{}' is reserved for connections without a name. \
                    Choose a different reference or omit it to use the database name.",
                    DEFAULT_REFERENCE
                ));
            }
        }

        if uri.is_empty() {
            return Err("Connection URI cannot be empty".to_string());
        }

        // Reference priority: explicit > database name > "default"
        let reference = explicit
            .map(String::from)
            .or_else(|| db_name(uri))
            .unwrap_or_else(|| DEFAULT_REFERENCE.to_string());

        Ok(Self {
            reference,
            uri: uri.to_string(),
        })
    }
}

/// Last path segment of the URI, without SQLite file extensions.
fn db_name(uri: &str) -> Option<String> {
    let url = url::Url::parse(uri).ok()?;
    url.path()
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.starts_with(':'))
        .map(|s| s.trim_end_matches(".sqlite").trim_end_matches(".db"))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Command line configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-router",
    about = "Route SQL operations to named database connections",
    version,
    author
)]
pub struct Config {
    /// Database connections to register.
    /// Format: "uri" or "reference=uri".
    /// The first one registered becomes the default.
    #[arg(
        short = 'd',
        long = "database",
        value_name = "URI",
        env = "DB_ROUTER_DATABASE",
        value_delimiter = ','
    )]
    pub databases: Vec<String>,

    /// Reference to use as the default connection
    #[arg(long = "default", value_name = "REFERENCE", env = "DB_ROUTER_DEFAULT")]
    pub default_reference: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_ROUTER_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_ROUTER_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (off by default so stdout carries only results)
    #[arg(long, env = "DB_ROUTER_ENABLE_LOGS")]
    pub enable_logs: bool,

    /// Operation to run, e.g. query, escape, lastInsertId
    #[arg(value_name = "OPERATION")]
    pub operation: String,

    /// Operation arguments. A leading registered reference selects that
    /// connection instead of the default.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Config {
    /// Parse all connection specs.
    pub fn parse_databases(&self) -> Result<Vec<ConnectionSpec>, String> {
        self.databases
            .iter()
            .map(|s| ConnectionSpec::parse(s))
            .collect()
    }
}
