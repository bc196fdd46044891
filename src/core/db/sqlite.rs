/// SQLite Driver
///
/// Backend built on rusqlite. Statements are prepared per call and dropped
/// at the end of it, which finalizes the cursor on every return path.

use super::driver::{Driver, DriverKind, RowVisitor};
use super::query::{Params, QueryResult, Record};
use super::value::Value;
use crate::config::DbConfig;
use crate::core::{DbError, Result};
use rusqlite::{Connection, Row, Statement};
use std::time::Duration;
use tracing::debug;

pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Opens the database file named by `config.dbname`, or an in-memory
    /// database for `:memory:`.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let conn = if config.dbname == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.dbname)?
        };

        conn.busy_timeout(Duration::from_secs(config.connect_timeout_secs))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        debug!(path = %config.dbname, "opened sqlite database");
        Ok(SqliteDriver { conn })
    }

    fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        self.conn
            .prepare(sql)
            .map_err(|e| DbError::Query(format!("Failed to prepare statement: {}", e)))
    }
}

/// Binds value `i` to the placeholder named `$i`.
///
/// SQLite numbers `$N` parameters by first appearance, not by N, so binding
/// positionally would misassign values whenever placeholders are out of order
/// or repeated. Every value needs its `$N` and every parameter needs a value.
fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    let expected = stmt.parameter_count();
    if expected != params.len() {
        return Err(DbError::Query(format!(
            "statement expects {} parameters, got {}",
            expected,
            params.len()
        )));
    }

    for (i, value) in params.iter().enumerate() {
        let name = format!("${}", i + 1);
        let index = stmt
            .parameter_index(&name)?
            .ok_or_else(|| DbError::Query(format!("statement has no placeholder {}", name)))?;
        stmt.raw_bind_parameter(index, value)?;
    }
    Ok(())
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn record_from_row(columns: &[String], row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (i, name) in columns.iter().enumerate() {
        record.insert(name.clone(), Value::from(row.get_ref(i)?));
    }
    Ok(record)
}

impl Driver for SqliteDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Sqlite
    }

    fn ping(&mut self) -> Result<()> {
        let one: i64 = self
            .conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| DbError::Connection(format!("ping failed: {}", e)))?;
        if one != 1 {
            return Err(DbError::Connection(format!("ping returned {}", one)));
        }
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<QueryResult> {
        let mut stmt = self.prepare(sql)?;
        let columns = column_names(&stmt);
        bind_params(&mut stmt, params)?;

        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DbError::Query(format!("Query execution failed: {}", e)))?
        {
            records.push(record_from_row(&columns, row)?);
        }

        Ok(QueryResult::new(columns, records))
    }

    fn for_each_row(
        &mut self,
        sql: &str,
        params: &Params,
        visit: &mut RowVisitor<'_>,
    ) -> Result<usize> {
        let mut stmt = self.prepare(sql)?;
        let columns = column_names(&stmt);
        bind_params(&mut stmt, params)?;
        let mut rows = stmt.raw_query();

        let mut visited = 0;
        while let Some(row) = rows
            .next()
            .map_err(|e| DbError::Query(format!("Query execution failed: {}", e)))?
        {
            let record = record_from_row(&columns, row)?;
            visited += 1;
            if visit(record)?.is_break() {
                break;
            }
        }
        Ok(visited)
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64> {
        let mut stmt = self.prepare(sql)?;
        bind_params(&mut stmt, params)?;
        let affected = stmt
            .raw_execute()
            .map_err(|e| DbError::Query(format!("Statement execution failed: {}", e)))?;
        Ok(affected as u64)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DbError::Query(format!("Batch execution failed: {}", e)))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| DbError::Database(e))
    }
}
