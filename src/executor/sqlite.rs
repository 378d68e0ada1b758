//! Built-in SQLite driver.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::types::ValueRef;
use tracing::{debug, warn};

use super::cancel::CancellationToken;
use super::connection::{Connection, ConnectionProvider, RawRows};
use super::error::{ExecutionError, ExecutionResult};
use crate::config::{Driver, Settings, SettingsError, DEFAULT_CONNECTION};
use crate::model::Value;

/// Virtual machine steps between cancellation polls.
const PROGRESS_OPS: i32 = 1_000;

#[derive(Debug, Clone)]
enum Source {
    /// Opened fresh for each execution.
    File(PathBuf),
    /// One connection shared by every execution (in-memory databases).
    Shared(Arc<Mutex<rusqlite::Connection>>),
}

/// Connections to SQLite databases, by name.
#[derive(Debug, Default)]
pub struct SqliteConnectionProvider {
    sources: HashMap<String, Source>,
}

impl SqliteConnectionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database file under `name`.
    pub fn with_database(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.sources.insert(name.to_string(), Source::File(path.into()));
        self
    }

    /// Share an already open connection under `name`.
    pub fn with_connection(mut self, name: &str, conn: rusqlite::Connection) -> Self {
        self.sources
            .insert(name.to_string(), Source::Shared(Arc::new(Mutex::new(conn))));
        self
    }

    /// Build from `[connections.*]`. `:memory:` databases are opened once and
    /// shared.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let mut provider = Self::new();
        for (name, connection) in &settings.connections {
            let Driver::Sqlite = connection.driver_type()?;
            let database = connection.resolved_database()?;
            provider = if database == ":memory:" {
                let conn = rusqlite::Connection::open_in_memory().map_err(|e| {
                    SettingsError::Invalid(format!("connection '{}': {}", name, e))
                })?;
                provider.with_connection(name, conn)
            } else {
                provider.with_database(name, database)
            };
        }
        Ok(provider)
    }

    fn source(&self, name: Option<&str>) -> ExecutionResult<(&str, &Source)> {
        let key = name.unwrap_or(DEFAULT_CONNECTION);
        if let Some((name, source)) = self.sources.get_key_value(key) {
            return Ok((name.as_str(), source));
        }
        // A single configured database serves as the default.
        if name.is_none() && self.sources.len() == 1 {
            if let Some((name, source)) = self.sources.iter().next() {
                return Ok((name.as_str(), source));
            }
        }
        Err(ExecutionError::UnknownConnection(key.to_string()))
    }
}

impl ConnectionProvider for SqliteConnectionProvider {
    fn connect(&self, name: Option<&str>) -> ExecutionResult<Box<dyn Connection>> {
        let (name, source) = self.source(name)?;
        let handle = match source {
            Source::File(path) => {
                let conn = rusqlite::Connection::open(path).map_err(|e| ExecutionError::Connect {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
                Handle::Owned(conn)
            }
            Source::Shared(conn) => Handle::Shared(Arc::clone(conn)),
        };
        debug!(connection = name, "opened sqlite connection");
        Ok(Box::new(SqliteConnection { handle }))
    }
}

enum Handle {
    Owned(rusqlite::Connection),
    Shared(Arc<Mutex<rusqlite::Connection>>),
}

pub struct SqliteConnection {
    handle: Handle,
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> ExecutionResult<RawRows> {
        match &self.handle {
            Handle::Owned(conn) => run(conn, sql, cancel),
            Handle::Shared(conn) => {
                let conn = conn.lock().map_err(|_| ExecutionError::Connect {
                    name: "shared".into(),
                    message: "connection lock poisoned".into(),
                })?;
                run(&conn, sql, cancel)
            }
        }
    }
}

fn run(conn: &rusqlite::Connection, sql: &str, cancel: &CancellationToken) -> ExecutionResult<RawRows> {
    let token = cancel.clone();
    conn.progress_handler(PROGRESS_OPS, Some(move || token.is_cancelled()));
    let outcome = read_rows(conn, sql);
    conn.progress_handler(0, None::<fn() -> bool>);

    outcome.map_err(|e| {
        if cancel.is_cancelled() {
            warn!("statement interrupted by cancellation");
            ExecutionError::Cancelled
        } else {
            ExecutionError::statement(sql, e)
        }
    })
}

fn read_rows(conn: &rusqlite::Connection, sql: &str) -> rusqlite::Result<RawRows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut out = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(to_value(row.get_ref(idx)?));
        }
        out.push(values);
    }
    Ok(RawRows { columns, rows: out })
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Decimal(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
