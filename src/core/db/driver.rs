/// Driver Module
///
/// The seam between the connection wrapper and a concrete database client.
/// Each backend turns `Params` into native bindings and rows into `Record`s;
/// the wrapper owns lifecycle, logging and validation.

use super::query::{Params, QueryResult, Record};
use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;

/// Supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    #[default]
    #[serde(alias = "sqlite3")]
    Sqlite,
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
}

impl DriverKind {
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Postgres => "postgres",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DriverKind::Sqlite => 0,
            DriverKind::Postgres => 5432,
        }
    }

    /// Whether this build carries the backend.
    pub fn is_available(&self) -> bool {
        match self {
            DriverKind::Sqlite => true,
            DriverKind::Postgres => cfg!(feature = "postgres"),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(DriverKind::Postgres),
            other => Err(DbError::Config(format!("unknown driver: {}", other))),
        }
    }
}

/// Callback used by `Driver::for_each_row`.
pub type RowVisitor<'a> = dyn FnMut(Record) -> Result<ControlFlow<()>> + 'a;

/// Core trait for backend connections.
///
/// Implementations must release every prepared statement and row cursor
/// before returning, on success and on error alike.
pub trait Driver: Send {
    fn kind(&self) -> DriverKind;

    /// Liveness round trip.
    fn ping(&mut self) -> Result<()>;

    /// Runs one statement and materializes all rows.
    fn query(&mut self, sql: &str, params: &Params) -> Result<QueryResult>;

    /// Streams rows to `visit` until it breaks or the rows run out.
    /// Returns the number of rows visited.
    fn for_each_row(&mut self, sql: &str, params: &Params, visit: &mut RowVisitor<'_>)
        -> Result<usize>;

    /// Runs one statement without a result set, returning affected rows.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64>;

    /// Runs several statements with no bindings.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Releases the underlying handle.
    fn close(self: Box<Self>) -> Result<()>;
}
