/// Core Module for sqlgate
///
/// Shared infrastructure: the connection wrapper and its drivers, query
/// and value types, and the error type every operation returns.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbError, Result};
