// Core infrastructure modules
pub mod config;
pub mod core;

#[cfg(test)]
mod test_utils;

pub use crate::config::DbConfig;
pub use crate::core::db::{Database, Params, QueryResult, Record, Value};
pub use crate::core::{DbError, Result};
