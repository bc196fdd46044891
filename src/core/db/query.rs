/// Query Module
///
/// Types that flow through query execution: bound parameters, materialized
/// rows and results, and the lightweight statement inspection used to keep
/// one statement per call and transaction control inside `transaction`.

use super::value::Value;
use crate::core::{DbError, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Positional bind values for `$1`, `$2`, ... placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the value for the next placeholder.
    pub fn push(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params { values }
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

/// Builds `Params` from a list of expressions convertible into `Value`.
///
/// ```
/// use sqlgate::params;
/// let p = params![1, "alice", true];
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::core::db::query::Params::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::core::db::query::Params::new()$(.push($value))+
    };
}

/// One row, keyed by column name, in result-set column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    /// Value of the first column named `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Represents the result of a SQL query execution
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows in result order
    pub rows: Vec<Record>,
    /// Number of rows returned
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        let row_count = rows.len();
        QueryResult {
            columns,
            rows,
            row_count,
        }
    }

    /// Consumes the result, keeping only the first row.
    pub fn into_first(self) -> Option<Record> {
        self.rows.into_iter().next()
    }
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    /// BEGIN/COMMIT/ROLLBACK and savepoint commands
    Transaction,
    Other,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = first_keyword(sql).to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" | "VALUES" => StatementKind::Select,
            "INSERT" | "REPLACE" => StatementKind::Insert,
            "UPDATE" => StatementKind::Update,
            "DELETE" => StatementKind::Delete,
            "CREATE" => StatementKind::Create,
            "DROP" => StatementKind::Drop,
            "ALTER" => StatementKind::Alter,
            "BEGIN" | "START" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Transaction
            }
            _ => StatementKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Create => "create",
            StatementKind::Drop => "drop",
            StatementKind::Alter => "alter",
            StatementKind::Transaction => "transaction",
            StatementKind::Other => "other",
        }
    }
}

fn first_keyword(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    // Skip leading comments
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |i| &after[i + 1..]).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]).trim_start();
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Rejects text holding more than one statement.
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// count; a single trailing semicolon is allowed.
pub fn ensure_single_statement(sql: &str) -> Result<()> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut terminated = false;

    while i < bytes.len() {
        let c = bytes[i];
        if terminated {
            if c.is_ascii_whitespace() || c == b';' {
                i += 1;
                continue;
            }
            if bytes[i..].starts_with(b"--") || bytes[i..].starts_with(b"/*") {
                i = skip_comment(bytes, i);
                continue;
            }
            return Err(DbError::Query(
                "multiple statements are not allowed in a single call".to_string(),
            ));
        }
        match c {
            b'\'' | b'"' => i = skip_quoted(bytes, i, c),
            b'-' if bytes[i..].starts_with(b"--") => i = skip_comment(bytes, i),
            b'/' if bytes[i..].starts_with(b"/*") => i = skip_comment(bytes, i),
            b';' => {
                terminated = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Returns the index just past the closing quote; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    if bytes[start..].starts_with(b"--") {
        bytes[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |p| start + p + 1)
    } else {
        bytes[start + 2..]
            .windows(2)
            .position(|w| w == b"*/")
            .map_or(bytes.len(), |p| start + 2 + p + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind_classification() {
        assert_eq!(StatementKind::from_sql("SELECT * FROM users"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("  select 1"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("WITH t AS (SELECT 1) SELECT * FROM t"), StatementKind::Select);
        assert_eq!(StatementKind::from_sql("INSERT INTO users VALUES (1, 'test')"), StatementKind::Insert);
        assert_eq!(StatementKind::from_sql("UPDATE users SET name = 'new'"), StatementKind::Update);
        assert_eq!(StatementKind::from_sql("DELETE FROM users WHERE id = 1"), StatementKind::Delete);
        assert_eq!(StatementKind::from_sql("CREATE TABLE test (id INTEGER)"), StatementKind::Create);
        assert_eq!(StatementKind::from_sql("DROP TABLE test"), StatementKind::Drop);
        assert_eq!(StatementKind::from_sql("BEGIN"), StatementKind::Transaction);
        assert_eq!(StatementKind::from_sql("commit;"), StatementKind::Transaction);
        assert_eq!(StatementKind::from_sql("ROLLBACK TO SAVEPOINT a"), StatementKind::Transaction);
        assert_eq!(StatementKind::from_sql("-- note\nBEGIN"), StatementKind::Transaction);
        assert_eq!(StatementKind::from_sql("/* c */ DELETE FROM t"), StatementKind::Delete);
        assert_eq!(StatementKind::from_sql("PRAGMA foreign_keys = ON"), StatementKind::Other);
        assert_eq!(StatementKind::from_sql(""), StatementKind::Other);
    }

    #[test]
    fn test_single_statement_accepted() {
        assert!(ensure_single_statement("SELECT 1").is_ok());
        assert!(ensure_single_statement("SELECT 1;").is_ok());
        assert!(ensure_single_statement("SELECT 1;  -- trailing note\n").is_ok());
        assert!(ensure_single_statement("SELECT 'a;b' FROM t").is_ok());
        assert!(ensure_single_statement("SELECT 'it''s; fine'").is_ok());
        assert!(ensure_single_statement("SELECT \"odd;name\" FROM t").is_ok());
        assert!(ensure_single_statement("SELECT 1 -- ; DROP TABLE t\n").is_ok());
        assert!(ensure_single_statement("SELECT /* ; */ 1").is_ok());
    }

    #[test]
    fn test_stacked_statements_rejected() {
        for sql in [
            "SELECT 1; DROP TABLE users",
            "SELECT * FROM users WHERE id = 1; DELETE FROM users;",
            "SELECT 'x'; SELECT 'y'",
        ] {
            match ensure_single_statement(sql) {
                Err(DbError::Query(msg)) => assert!(msg.contains("multiple statements")),
                other => panic!("{:?} should be rejected, got {:?}", sql, other),
            }
        }
    }

    #[test]
    fn test_params_macro() {
        let p = crate::params![1, "alice", None::<i64>];
        assert_eq!(
            p.as_slice(),
            &[Value::Integer(1), Value::Text("alice".into()), Value::Null]
        );
        assert!(crate::params![].is_empty());
    }

    #[test]
    fn test_record_preserves_column_order() {
        let mut record = Record::new();
        record.insert("id", Value::Integer(1));
        record.insert("name", Value::Text("Alice".into()));

        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(record.get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(record.get("missing"), None);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":1,"name":"Alice"}"#
        );
    }
}
