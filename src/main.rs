use sqlgate::config::{default_config_path, load_config, Config};
use sqlgate::{Database, DbError, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sqlgate [--config PATH] <table> <id>";

/// Parsed command line.
#[derive(Debug, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    table: String,
    id: String,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option: {}", flag)),
            _ => positional.push(arg.clone()),
        }
    }

    match <[String; 2]>::try_from(positional) {
        Ok([table, id]) => Ok(Invocation { config, table, id }),
        Err(_) => Err(USAGE.to_string()),
    }
}

/// Integers are bound as integers, everything else as text.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::Integer)
        .unwrap_or_else(|_| Value::Text(id.to_string()))
}

fn load(invocation: &Invocation) -> sqlgate::Result<Config> {
    let mut config = match &invocation.config {
        Some(path) => load_config(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => load_config(path)?,
            None => Config::default(),
        },
    };
    config.database.apply_env()?;
    Ok(config)
}

/// Logs go to stderr so stdout carries only the JSON row.
fn init_logging(config: &Config) {
    let level = config
        .logging
        .as_ref()
        .and_then(|l| l.level.clone())
        .unwrap_or_else(|| "warn".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(invocation: &Invocation, config: Config) -> sqlgate::Result<String> {
    let mut db = Database::open(config.database)?;
    let record = db.get_by_id(&invocation.table, id_value(&invocation.id));
    db.close()?;
    Ok(serde_json::to_string(&record?)?)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(1);
        }
    };

    let config = match load(&invocation) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(1);
        }
    };
    init_logging(&config);
    info!(table = %invocation.table, "starting lookup");

    match run(&invocation, config) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e @ DbError::NotFound { .. }) => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "lookup failed");
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_positional() {
        let invocation = parse_args(&args(&["users", "7"])).unwrap();
        assert_eq!(invocation.table, "users");
        assert_eq!(invocation.id, "7");
        assert_eq!(invocation.config, None);
    }

    #[test]
    fn test_parse_config_flag() {
        let invocation = parse_args(&args(&["--config", "/tmp/c.toml", "users", "7"])).unwrap();
        assert_eq!(invocation.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["users"])).is_err());
        assert!(parse_args(&args(&["users", "1", "extra"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["--verbose", "users", "1"])).is_err());
    }

    #[test]
    fn test_id_value() {
        assert_eq!(id_value("42"), Value::Integer(42));
        assert_eq!(id_value("1 OR 1=1"), Value::Text("1 OR 1=1".to_string()));
    }
}
