/// # Test Utilities Module
///
/// Fixtures for unit tests: isolated in-memory databases with a small
/// users/posts/categories schema, plus assertion helpers for `DbError`.

use crate::core::db::{Database, Value};
use crate::params;

const STANDARD_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        active BOOLEAN DEFAULT TRUE
    );

    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        published BOOLEAN DEFAULT FALSE,
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
    );

    CREATE TABLE categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE post_categories (
        post_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        PRIMARY KEY (post_id, category_id),
        FOREIGN KEY (post_id) REFERENCES posts (id) ON DELETE CASCADE,
        FOREIGN KEY (category_id) REFERENCES categories (id) ON DELETE CASCADE
    );
";

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub db: Database,
}

impl DatabaseFixture {
    /// Fresh in-memory database with the standard schema and no rows.
    pub fn new() -> Self {
        let mut db = Database::open_in_memory().expect("open in-memory database");
        db.execute_batch(STANDARD_SCHEMA).expect("create standard schema");
        DatabaseFixture { db }
    }

    /// Standard schema populated with three users, three posts and three categories.
    pub fn with_sample_data() -> Self {
        let mut fixture = Self::new();
        fixture.populate_sample_data();
        fixture
    }

    fn populate_sample_data(&mut self) {
        for (username, email) in [
            ("alice", "alice@example.com"),
            ("bob", "bob@example.com"),
            ("charlie", "charlie@example.com"),
        ] {
            self.db
                .execute(
                    "INSERT INTO users (username, email) VALUES ($1, $2)",
                    params![username, email],
                )
                .expect("insert user");
        }

        for name in ["Technology", "Travel", "Food"] {
            self.db
                .execute("INSERT INTO categories (name) VALUES ($1)", params![name])
                .expect("insert category");
        }

        for (user_id, title, published) in [
            (1, "Welcome to Rust", true),
            (2, "My Trip to Paris", false),
            (1, "Binding Parameters", true),
        ] {
            self.db
                .execute(
                    "INSERT INTO posts (user_id, title, published) VALUES ($1, $2, $3)",
                    params![user_id, title, published],
                )
                .expect("insert post");
        }

        self.db
            .execute(
                "INSERT INTO post_categories (post_id, category_id) VALUES ($1, $2)",
                params![1, 1],
            )
            .expect("insert post category");
    }

    /// Number of rows currently in `users`.
    pub fn user_count(&mut self) -> i64 {
        self.db
            .query_one("SELECT COUNT(*) AS n FROM users", ())
            .expect("count users")
            .get("n")
            .and_then(Value::as_i64)
            .expect("integer count")
    }
}

/// Error testing utilities
pub mod error_testing {
    use crate::core::DbError;

    /// Asserts that `result` failed with an error matching `expected_variant`.
    pub fn assert_error_type<T: std::fmt::Debug>(
        result: &std::result::Result<T, DbError>,
        expected_variant: fn(&DbError) -> bool,
        message: &str,
    ) {
        match result {
            Err(err) => assert!(expected_variant(err), "{}: got {:?}", message, err),
            Ok(value) => panic!("{}: expected an error, got {:?}", message, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_is_isolated() {
        let mut populated = DatabaseFixture::with_sample_data();
        let mut empty = DatabaseFixture::new();

        assert_eq!(populated.user_count(), 3);
        assert_eq!(empty.user_count(), 0);
    }

    #[test]
    fn test_fixture_foreign_keys_enforced() {
        let mut fixture = DatabaseFixture::with_sample_data();
        let result = fixture.db.execute(
            "INSERT INTO posts (user_id, title) VALUES ($1, $2)",
            params![99, "orphan"],
        );
        error_testing::assert_error_type(
            &result,
            |e| matches!(e, crate::core::DbError::Query(msg) if msg.contains("FOREIGN KEY")),
            "foreign key violation",
        );
    }
}
