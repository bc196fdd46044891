/// Database Module
///
/// ## Architecture
///
/// - **Connection** (`connection.rs`): the `Database` handle, its open/closed
///   lifecycle and transaction scopes
/// - **Drivers** (`driver.rs`, `sqlite.rs`, `postgres.rs`): backend clients
///   behind the `Driver` trait
/// - **Queries** (`query.rs`, `value.rs`): bound parameters, rows and results
/// - **Identifiers** (`ident.rs`): validated table and column names
///
/// All operations return `DbError` through the crate `Result` alias.
pub mod connection;
pub mod driver;
pub mod ident;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod sqlite;
pub mod value;

pub use connection::{Database, TransactionState};
pub use driver::{Driver, DriverKind};
pub use ident::Identifier;
pub use query::{Params, QueryResult, Record, StatementKind};
pub use value::Value;
