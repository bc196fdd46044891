/// Error Module
///
/// This module defines the error type shared by every sqlgate operation.
/// Driver failures keep their source error, everything else carries a
/// human-readable message.
use thiserror::Error;

/// Error type for sqlgate.
///
/// The variants cover:
/// - Driver errors (SQLite, and PostgreSQL when the `postgres` feature is on)
/// - Connection establishment and liveness failures
/// - Query preparation and execution failures, including parameter type mismatches
/// - Lookups that matched no row
/// - Use of a handle after it was closed
/// - Rejected identifiers, transactions and configuration
#[derive(Error, Debug)]
pub enum DbError {
    /// Errors surfaced by the SQLite driver
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors surfaced by the PostgreSQL driver
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    /// Opening the connection or the liveness round trip failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL preparation or execution errors
    #[error("Query error: {0}")]
    Query(String),

    /// A bound value cannot be converted to the type the server expects
    #[error("Query error: parameter ${position} expects {expected}, got {found}")]
    ParameterType {
        position: usize,
        expected: String,
        found: String,
    },

    /// A lookup returned no row
    #[error("No row in {table} with id {id}")]
    NotFound { table: String, id: String },

    /// The handle was closed before this call
    #[error("Connection is closed")]
    Closed,

    /// A table or column name failed validation
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Transaction misuse (nesting, control statements outside a scope)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl DbError {
    /// Returns `true` when a lookup matched no row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Returns `true` when the call hit a closed handle.
    pub fn is_closed(&self) -> bool {
        matches!(self, DbError::Closed)
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
