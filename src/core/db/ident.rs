/// Identifier Module
///
/// Table and column names cannot be bound as parameters, so they are
/// validated against a strict pattern and always emitted double-quoted.

use crate::core::{DbError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Optional schema qualifier, each part at most 63 bytes (the PostgreSQL limit).
static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(\.[A-Za-z_][A-Za-z0-9_]{0,62})?$")
        .expect("identifier pattern is valid")
});

/// A validated SQL identifier, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    parts: Vec<String>,
}

impl Identifier {
    /// Validates `name`, returning `DbError::InvalidIdentifier` when it
    /// contains anything besides ASCII letters, digits, underscores and a
    /// single schema dot.
    pub fn parse(name: &str) -> Result<Self> {
        if !IDENTIFIER_RE.is_match(name) {
            return Err(DbError::InvalidIdentifier(name.to_string()));
        }
        Ok(Identifier {
            parts: name.split('.').map(str::to_string).collect(),
        })
    }

    /// The unquoted name, as given.
    pub fn as_raw(&self) -> String {
        self.parts.join(".")
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.parts.iter().map(|p| quote_ident(p)).collect();
        write!(f, "{}", quoted.join("."))
    }
}

/// Quote a SQL identifier using ANSI double-quoting, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
