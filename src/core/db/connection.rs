/// Connection Management Module
///
/// `Database` owns exactly one driver handle. The handle is opened and
/// pinged by `Database::open`, released by `close` (or on drop), and every
/// call after that fails with `DbError::Closed`.

use super::driver::{Driver, DriverKind};
use super::ident::Identifier;
use super::query::{ensure_single_statement, Params, QueryResult, Record, StatementKind};
use super::sqlite::SqliteDriver;
use super::value::Value;
use crate::config::DbConfig;
use crate::core::{DbError, Result};
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No active transaction (autocommit mode)
    #[default]
    Autocommit,
    /// Transaction in progress
    Transaction,
    /// The last rollback failed; the next transaction rolls back first
    Failed,
}

/// Column looked up by `get_by_id`.
pub const DEFAULT_KEY_COLUMN: &str = "id";

/// An open (or closed) connection to one database.
///
/// Any holder of `&mut Database` can close it, including the closure passed
/// to `transaction`. A transaction whose closure closed the handle returns
/// `DbError::Closed` and nothing is committed.
pub struct Database {
    driver: Option<Box<dyn Driver>>,
    config: DbConfig,
    transaction_state: TransactionState,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.config.target())
            .field("open", &self.is_open())
            .field("transaction_state", &self.transaction_state)
            .finish()
    }
}

impl Database {
    /// Opens a connection described by `config` and verifies it with a
    /// round trip.
    ///
    /// # Errors
    ///
    /// `DbError::Config` for invalid settings or a backend missing from this
    /// build, `DbError::Connection` / `DbError::Database` when the driver
    /// cannot open the connection or the ping fails. There is no retry.
    pub fn open(config: DbConfig) -> Result<Self> {
        config.validate()?;
        if !config.driver.is_available() {
            return Err(DbError::Config(format!(
                "driver {} is not compiled in (enable the `{}` feature)",
                config.driver,
                config.driver.name()
            )));
        }

        let mut driver = connect_driver(&config)?;
        if let Err(e) = driver.ping() {
            warn!(db = %config.target(), error = %e, "liveness check failed");
            if let Err(close_err) = driver.close() {
                debug!(error = %close_err, "closing after failed ping also failed");
            }
            return Err(e);
        }

        info!(db = %config.target(), "database connection opened");
        Ok(Database {
            driver: Some(driver),
            config,
            transaction_state: TransactionState::default(),
        })
    }

    /// Opens a private in-memory SQLite database.
    pub fn open_in_memory() -> Result<Self> {
        Database::open(DbConfig::sqlite(":memory:"))
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.config.driver
    }

    pub fn is_open(&self) -> bool {
        self.driver.is_some()
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    fn driver_mut(&mut self) -> Result<&mut Box<dyn Driver>> {
        self.driver.as_mut().ok_or(DbError::Closed)
    }

    /// Checks the handle is open and `sql` is one statement that is not
    /// transaction control.
    fn checked(&mut self, sql: &str) -> Result<(&mut Box<dyn Driver>, StatementKind)> {
        let driver = self.driver.as_mut().ok_or(DbError::Closed)?;
        ensure_single_statement(sql)?;
        let kind = StatementKind::from_sql(sql);
        if kind == StatementKind::Transaction {
            return Err(DbError::Transaction(
                "use Database::transaction instead of transaction control statements".to_string(),
            ));
        }
        Ok((driver, kind))
    }

    /// Round trip against the open connection.
    pub fn ping(&mut self) -> Result<()> {
        self.driver_mut()?.ping()
    }

    /// Runs one statement with `params` bound to its `$N` placeholders and
    /// returns every row.
    ///
    /// Values are never spliced into `sql`. Text holding more than one
    /// statement is rejected before it reaches the driver.
    pub fn query(&mut self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        let params = params.into();
        let (driver, kind) = self.checked(sql)?;
        debug!(kind = kind.as_str(), params = params.len(), sql, "query");

        driver.query(sql, &params).map_err(|e| {
            warn!(kind = kind.as_str(), error = %e, "query failed");
            e
        })
    }

    /// Like `query` but returns the first row or `DbError::NotFound`.
    pub fn query_one(&mut self, sql: &str, params: impl Into<Params>) -> Result<Record> {
        self.query_opt(sql, params)?.ok_or_else(|| DbError::NotFound {
            table: "query".to_string(),
            id: "-".to_string(),
        })
    }

    /// Returns the first row, if any. Remaining rows are never decoded.
    pub fn query_opt(&mut self, sql: &str, params: impl Into<Params>) -> Result<Option<Record>> {
        let mut first = None;
        self.for_each_row(sql, params, |record| {
            first = Some(record);
            Ok(ControlFlow::Break(()))
        })?;
        Ok(first)
    }

    /// Streams rows to `visit` without materializing the result.
    ///
    /// SQLite steps the cursor once per row. PostgreSQL decodes each row as it
    /// arrives, and the server may already have sent rows a break skips.
    ///
    /// The cursor is released when this returns, whether `visit` finished,
    /// broke out early or returned an error.
    pub fn for_each_row<F>(&mut self, sql: &str, params: impl Into<Params>, mut visit: F) -> Result<usize>
    where
        F: FnMut(Record) -> Result<ControlFlow<()>>,
    {
        let params = params.into();
        let (driver, kind) = self.checked(sql)?;
        debug!(kind = kind.as_str(), params = params.len(), sql, "streaming query");

        driver.for_each_row(sql, &params, &mut visit).map_err(|e| {
            warn!(kind = kind.as_str(), error = %e, "streaming query failed");
            e
        })
    }

    /// Runs one statement that returns no rows; returns the affected row count.
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<u64> {
        let params = params.into();
        let (driver, kind) = self.checked(sql)?;
        debug!(kind = kind.as_str(), params = params.len(), sql, "execute");

        driver.execute(sql, &params).map_err(|e| {
            warn!(kind = kind.as_str(), error = %e, "execute failed");
            e
        })
    }

    /// Runs a multi-statement script such as schema setup.
    ///
    /// Only compile-time text is accepted, so runtime input cannot reach it.
    pub fn execute_batch(&mut self, script: &'static str) -> Result<()> {
        let driver = self.driver_mut()?;
        debug!(bytes = script.len(), "execute batch");
        driver.execute_batch(script)
    }

    /// Fetches the row of `table` whose `id` column equals `id`.
    ///
    /// Returns `DbError::NotFound` when no row matches, and
    /// `DbError::InvalidIdentifier` when `table` is not a plain name.
    pub fn get_by_id(&mut self, table: &str, id: impl Into<Value>) -> Result<Record> {
        self.get_by_key(table, DEFAULT_KEY_COLUMN, id)
    }

    /// Fetches the first row of `table` whose `key_column` equals `id`.
    ///
    /// An `id` that cannot be converted to the column's type matches no row,
    /// so it is reported as `DbError::NotFound` like any other miss.
    pub fn get_by_key(&mut self, table: &str, key_column: &str, id: impl Into<Value>) -> Result<Record> {
        let table_ident = Identifier::parse(table)?;
        let key_ident = Identifier::parse(key_column)?;
        let id = id.into();

        let sql = format!("SELECT * FROM {} WHERE {} = $1", table_ident, key_ident);
        let found = absent_on_type_mismatch(self.query_opt(&sql, Params::new().push(id.clone())))?;
        match found {
            Some(record) => Ok(record),
            None => {
                debug!(table, "lookup matched no row");
                Err(DbError::NotFound {
                    table: table_ident.as_raw(),
                    id: id.to_string(),
                })
            }
        }
    }

    /// Fetches a row of the `users` table by id.
    pub fn get_user(&mut self, id: impl Into<Value>) -> Result<Record> {
        self.get_by_id("users", id)
    }

    /// Runs `f` inside a transaction: commits when it returns `Ok`, rolls back
    /// when it returns `Err`.
    ///
    /// # Errors
    ///
    /// `DbError::Transaction` when a transaction is already in progress on
    /// this handle; otherwise the error from `f` or from COMMIT.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        match self.transaction_state {
            TransactionState::Transaction => {
                return Err(DbError::Transaction("Transaction already in progress".to_string()));
            }
            TransactionState::Failed => {
                // Clear whatever the failed rollback left behind
                if let Err(e) = self.driver_mut()?.execute_batch("ROLLBACK") {
                    warn!(error = %e, "recovery rollback failed, starting transaction anyway");
                }
                self.transaction_state = TransactionState::Autocommit;
            }
            TransactionState::Autocommit => {}
        }

        self.driver_mut()?.execute_batch("BEGIN")?;
        self.transaction_state = TransactionState::Transaction;
        debug!("transaction started");

        let outcome = f(self);
        if !self.is_open() {
            // `f` closed the handle; the server discards the transaction
            self.transaction_state = TransactionState::Autocommit;
            return match outcome {
                Ok(_) => Err(DbError::Closed),
                Err(e) => Err(e),
            };
        }

        match outcome {
            Ok(value) => match self.driver_mut()?.execute_batch("COMMIT") {
                Ok(()) => {
                    self.transaction_state = TransactionState::Autocommit;
                    debug!("transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(error = %e, "commit failed, rolling back");
                    self.rollback();
                    Err(e)
                }
            },
            Err(e) => {
                debug!(error = %e, "transaction body failed, rolling back");
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        let result = match self.driver.as_mut() {
            Some(driver) => driver.execute_batch("ROLLBACK"),
            None => Err(DbError::Closed),
        };
        self.transaction_state = match result {
            Ok(()) => TransactionState::Autocommit,
            Err(e) => {
                warn!(error = %e, "rollback failed");
                TransactionState::Failed
            }
        };
    }

    /// Releases the connection handle.
    ///
    /// The first call closes the connection; any later call, like every
    /// other operation on a closed handle, returns `DbError::Closed`.
    pub fn close(&mut self) -> Result<()> {
        let driver = self.driver.take().ok_or(DbError::Closed)?;
        self.transaction_state = TransactionState::Autocommit;
        driver.close()?;
        info!(db = %self.config.target(), "database connection closed");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            match driver.close() {
                Ok(()) => debug!(db = %self.config.target(), "database connection closed on drop"),
                Err(e) => warn!(error = %e, "failed to close database connection on drop"),
            }
        }
    }
}

/// A key value the server cannot convert to the key column's type equals no
/// row.
fn absent_on_type_mismatch(result: Result<Option<Record>>) -> Result<Option<Record>> {
    match result {
        Err(DbError::ParameterType { position, expected, found }) => {
            debug!(position, expected = %expected, found = %found, "key type mismatch");
            Ok(None)
        }
        other => other,
    }
}

fn connect_driver(config: &DbConfig) -> Result<Box<dyn Driver>> {
    match config.driver {
        DriverKind::Sqlite => Ok(Box::new(SqliteDriver::open(config)?)),
        #[cfg(feature = "postgres")]
        DriverKind::Postgres => Ok(Box::new(super::postgres::PostgresDriver::connect(config)?)),
        #[allow(unreachable_patterns)]
        other => Err(DbError::Config(format!("driver {} is not compiled in", other))),
    }
}
