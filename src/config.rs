use crate::core::db::DriverKind;
use crate::core::{DbError, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read by `DbConfig::apply_env`.
pub const ENV_PREFIX: &str = "SQLGATE_";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DbConfig,
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `sqlgate=debug`.
    pub level: Option<String>,
}

/// Connection settings, consumed once by `Database::open`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub driver: DriverKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    /// Database name for PostgreSQL, file path (or `:memory:`) for SQLite.
    pub dbname: String,
    pub connect_timeout_secs: u64,
    pub application_name: Option<String>,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            driver: DriverKind::Sqlite,
            host: "localhost".to_string(),
            port: DriverKind::Postgres.default_port(),
            user: String::new(),
            password: None,
            dbname: String::new(),
            connect_timeout_secs: 10,
            application_name: Some("sqlgate".to_string()),
        }
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl DbConfig {
    /// SQLite configuration for a file path or `:memory:`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        DbConfig {
            driver: DriverKind::Sqlite,
            dbname: path.into(),
            ..DbConfig::default()
        }
    }

    /// PostgreSQL configuration on the default port.
    pub fn postgres(host: impl Into<String>, user: impl Into<String>, dbname: impl Into<String>) -> Self {
        DbConfig {
            driver: DriverKind::Postgres,
            host: host.into(),
            user: user.into(),
            dbname: dbname.into(),
            ..DbConfig::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Checks the fields the selected driver needs.
    pub fn validate(&self) -> Result<()> {
        if self.dbname.trim().is_empty() {
            return Err(DbError::Config("dbname must not be empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(DbError::Config("connect_timeout_secs must be positive".to_string()));
        }
        if self.driver == DriverKind::Postgres {
            if self.host.trim().is_empty() {
                return Err(DbError::Config("host must not be empty".to_string()));
            }
            if self.port == 0 {
                return Err(DbError::Config("port must be between 1 and 65535".to_string()));
            }
            if self.user.trim().is_empty() {
                return Err(DbError::Config("user must not be empty for postgres".to_string()));
            }
        }
        Ok(())
    }

    /// Where the connection goes, without credentials.
    pub fn target(&self) -> String {
        match self.driver {
            DriverKind::Sqlite => format!("sqlite:{}", self.dbname),
            DriverKind::Postgres => {
                format!("postgres://{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
            }
        }
    }

    /// Applies `SQLGATE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the full variable name
    /// (`SQLGATE_HOST`, `SQLGATE_PORT`, `SQLGATE_USER`, `SQLGATE_PASSWORD`,
    /// `SQLGATE_DBNAME`, `SQLGATE_DRIVER`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(driver) = var("DRIVER") {
            self.driver = driver.parse()?;
        }
        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = port
                .parse()
                .map_err(|_| DbError::Config(format!("invalid {}PORT: {}", ENV_PREFIX, port)))?;
        }
        if let Some(user) = var("USER") {
            self.user = user;
        }
        if let Some(password) = var("PASSWORD") {
            self.password = Some(password);
        }
        if let Some(dbname) = var("DBNAME") {
            self.dbname = dbname;
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = sqlgate::config::load_config("sqlgate.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// `<config dir>/sqlgate/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlgate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
[database]
driver = "postgres"
host = "db.internal"
port = 6543
user = "app"
password = "s3cret"
dbname = "inventory"

[logging]
level = "debug"
"#;

    #[test]
    fn test_parse_config_from_str() {
        let config = parse_config(SAMPLE_CONFIG).expect("Failed to parse sample config");
        let db = &config.database;
        assert_eq!(db.driver, DriverKind::Postgres);
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 6543);
        assert_eq!(db.user, "app");
        assert_eq!(db.password.as_deref(), Some("s3cret"));
        assert_eq!(db.dbname, "inventory");
        assert_eq!(db.connect_timeout_secs, 10);
        assert_eq!(config.logging.unwrap().level.as_deref(), Some("debug"));
        assert!(db.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_sparse_config() {
        let config = parse_config("[database]\ndbname = \"app.db\"\n").unwrap();
        assert_eq!(config.database.driver, DriverKind::Sqlite);
        assert_eq!(config.database.dbname, "app.db");
        assert!(config.logging.is_none());

        let empty = parse_config("").unwrap();
        assert!(empty.database.dbname.is_empty());
    }

    #[test]
    fn test_driver_aliases_match_env_names() {
        for (name, kind) in [
            ("sqlite3", DriverKind::Sqlite),
            ("pg", DriverKind::Postgres),
            ("postgresql", DriverKind::Postgres),
        ] {
            let config = parse_config(&format!("[database]\ndriver = \"{}\"\n", name)).unwrap();
            assert_eq!(config.database.driver, kind);
            assert_eq!(name.parse::<DriverKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_driver_rejected() {
        match parse_config("[database]\ndriver = \"oracle\"\n") {
            Err(DbError::Toml(_)) => {}
            other => panic!("Expected TOML error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.dbname, "inventory");

        match load_config("/nonexistent/sqlgate.toml") {
            Err(DbError::Io(_)) => {}
            other => panic!("Expected IO error, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DbConfig::postgres("localhost", "app", "inventory").with_password("hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
        assert!(!config.target().contains("hunter2"));
        assert_eq!(config.target(), "postgres://app@localhost:5432/inventory");
    }

    #[test]
    fn test_validation() {
        assert!(DbConfig::sqlite(":memory:").validate().is_ok());
        assert!(matches!(DbConfig::sqlite("").validate(), Err(DbError::Config(_))));
        assert!(matches!(
            DbConfig::postgres("localhost", "", "inventory").validate(),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            DbConfig::postgres("localhost", "app", "inventory").with_port(0).validate(),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn test_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("SQLGATE_DRIVER", "postgres"),
            ("SQLGATE_HOST", "override.host"),
            ("SQLGATE_PORT", "7000"),
            ("SQLGATE_PASSWORD", "from-env"),
        ]
        .into_iter()
        .collect();

        let mut config = DbConfig::sqlite("app.db");
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.driver, DriverKind::Postgres);
        assert_eq!(config.host, "override.host");
        assert_eq!(config.port, 7000);
        assert_eq!(config.password.as_deref(), Some("from-env"));
        assert_eq!(config.dbname, "app.db");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = DbConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "SQLGATE_PORT").then(|| "not-a-port".to_string())
        });
        match result {
            Err(DbError::Config(msg)) => assert!(msg.contains("SQLGATE_PORT")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }
}
