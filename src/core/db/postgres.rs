//! PostgreSQL driver implementation
//!
//! Compiled with the `postgres` feature. The client is configured field by
//! field through `postgres::Config`, so credentials never pass through a
//! formatted connection string. Bound values are converted to the parameter
//! types the server reports for the prepared statement.

use super::driver::{Driver, DriverKind, RowVisitor};
use super::query::{Params, QueryResult, Record};
use super::value::Value;
use crate::config::DbConfig;
use crate::core::{DbError, Result};
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls, Row, Statement};
use std::time::Duration;
use tracing::debug;

type Bound = Box<dyn ToSql + Sync>;

pub struct PostgresDriver {
    client: Client,
}

impl PostgresDriver {
    pub fn connect(config: &DbConfig) -> Result<Self> {
        let mut pg = postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .dbname(&config.dbname)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(password) = &config.password {
            pg.password(password);
        }
        if let Some(name) = &config.application_name {
            pg.application_name(name);
        }

        let client = pg
            .connect(NoTls)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        debug!(host = %config.host, port = config.port, "connected to postgres");
        Ok(PostgresDriver { client })
    }

    fn prepare(&mut self, sql: &str) -> Result<Statement> {
        self.client
            .prepare(sql)
            .map_err(|e| DbError::Query(format!("Failed to prepare statement: {}", e)))
    }

    /// Prepares `sql` and converts `params` to the types the server reports.
    fn prepare_bound(&mut self, sql: &str, params: &Params) -> Result<(Statement, Vec<Bound>)> {
        let stmt = self.prepare(sql)?;
        let bound = bind_all(params, stmt.params())?;
        Ok((stmt, bound))
    }
}

fn column_names(stmt: &Statement) -> Vec<String> {
    stmt.columns().iter().map(|c| c.name().to_string()).collect()
}

fn as_refs(bound: &[Bound]) -> Vec<&(dyn ToSql + Sync)> {
    bound.iter().map(|b| &**b).collect()
}

fn bind_all(params: &Params, types: &[Type]) -> Result<Vec<Bound>> {
    if params.len() != types.len() {
        return Err(DbError::Query(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (value, ty))| bind(i + 1, value, ty))
        .collect()
}

fn bind(position: usize, value: &Value, ty: &Type) -> Result<Bound> {
    let mismatch = || DbError::ParameterType {
        position,
        expected: ty.name().to_string(),
        found: value.type_name().to_string(),
    };

    let bound: Bound = match value {
        Value::Null => typed_null(ty),
        Value::Bool(b) if *ty == Type::BOOL => Box::new(*b),
        Value::Integer(_) | Value::Bool(_) if is_integer(ty) || is_float(ty) || is_text(ty) => {
            let i = value.as_i64().ok_or_else(mismatch)?;
            if *ty == Type::INT2 {
                Box::new(i16::try_from(i).map_err(|_| mismatch())?)
            } else if *ty == Type::INT4 {
                Box::new(i32::try_from(i).map_err(|_| mismatch())?)
            } else if *ty == Type::INT8 {
                Box::new(i)
            } else if *ty == Type::FLOAT4 {
                Box::new(i as f32)
            } else if *ty == Type::FLOAT8 {
                Box::new(i as f64)
            } else {
                Box::new(i.to_string())
            }
        }
        Value::Real(r) if *ty == Type::FLOAT4 => Box::new(*r as f32),
        Value::Real(r) if *ty == Type::FLOAT8 => Box::new(*r),
        Value::Text(s) if is_text(ty) => Box::new(s.clone()),
        // A text value against a numeric column must parse cleanly, never coerce
        Value::Text(s) if *ty == Type::INT2 => Box::new(s.parse::<i16>().map_err(|_| mismatch())?),
        Value::Text(s) if *ty == Type::INT4 => Box::new(s.parse::<i32>().map_err(|_| mismatch())?),
        Value::Text(s) if *ty == Type::INT8 => Box::new(s.parse::<i64>().map_err(|_| mismatch())?),
        Value::Blob(b) if *ty == Type::BYTEA => Box::new(b.clone()),
        _ => return Err(mismatch()),
    };
    Ok(bound)
}

fn typed_null(ty: &Type) -> Bound {
    if *ty == Type::BOOL {
        Box::new(None::<bool>)
    } else if *ty == Type::INT2 {
        Box::new(None::<i16>)
    } else if *ty == Type::INT4 {
        Box::new(None::<i32>)
    } else if *ty == Type::INT8 {
        Box::new(None::<i64>)
    } else if *ty == Type::FLOAT4 {
        Box::new(None::<f32>)
    } else if *ty == Type::FLOAT8 {
        Box::new(None::<f64>)
    } else if *ty == Type::BYTEA {
        Box::new(None::<Vec<u8>>)
    } else {
        Box::new(None::<String>)
    }
}

fn is_integer(ty: &Type) -> bool {
    [Type::INT2, Type::INT4, Type::INT8].contains(ty)
}

fn is_float(ty: &Type) -> bool {
    [Type::FLOAT4, Type::FLOAT8].contains(ty)
}

fn is_text(ty: &Type) -> bool {
    [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty)
}

fn decode(row: &Row, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_();
    let value: Value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.into()
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into()
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into()
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.into()
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into()
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.into()
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx)?.into()
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.into(),
            Err(_) => Value::Text(format!("<unsupported type {}>", ty.name())),
        }
    };
    Ok(value)
}

fn record_from_row(columns: &[String], row: &Row) -> Result<Record> {
    let mut record = Record::new();
    for (i, name) in columns.iter().enumerate() {
        record.insert(name.clone(), decode(row, i)?);
    }
    Ok(record)
}

impl Driver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn ping(&mut self) -> Result<()> {
        let row = self
            .client
            .query_one("SELECT 1", &[])
            .map_err(|e| DbError::Connection(format!("ping failed: {}", e)))?;
        let one: i32 = row.try_get(0)?;
        if one != 1 {
            return Err(DbError::Connection(format!("ping returned {}", one)));
        }
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<QueryResult> {
        let (stmt, bound) = self.prepare_bound(sql, params)?;
        let columns = column_names(&stmt);
        let rows = self
            .client
            .query(&stmt, &as_refs(&bound))
            .map_err(|e| DbError::Query(format!("Query execution failed: {}", e)))?;
        let records = rows
            .iter()
            .map(|row| record_from_row(&columns, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryResult::new(columns, records))
    }

    fn for_each_row(
        &mut self,
        sql: &str,
        params: &Params,
        visit: &mut RowVisitor<'_>,
    ) -> Result<usize> {
        let (stmt, bound) = self.prepare_bound(sql, params)?;
        let columns = column_names(&stmt);
        let refs = as_refs(&bound);

        // Rows are decoded one at a time as the server sends them. Breaking
        // out drops the iterator and the client discards the rest.
        let mut rows = self
            .client
            .query_raw(&stmt, refs.iter().copied())
            .map_err(|e| DbError::Query(format!("Query execution failed: {}", e)))?;
        let mut visited = 0;
        while let Some(row) = rows
            .next()
            .map_err(|e| DbError::Query(format!("Query execution failed: {}", e)))?
        {
            visited += 1;
            if visit(record_from_row(&columns, &row)?)?.is_break() {
                break;
            }
        }
        Ok(visited)
    }

    fn execute(&mut self, sql: &str, params: &Params) -> Result<u64> {
        let (stmt, bound) = self.prepare_bound(sql, params)?;
        self.client
            .execute(&stmt, &as_refs(&bound))
            .map_err(|e| DbError::Query(format!("Statement execution failed: {}", e)))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .map_err(|e| DbError::Query(format!("Batch execution failed: {}", e)))
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.client.close()?;
        Ok(())
    }
}
