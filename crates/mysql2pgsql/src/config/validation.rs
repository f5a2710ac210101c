//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.mysql.hostname.is_empty() && config.mysql.socket.is_none() {
        return Err(MigrateError::Config(
            "mysql.hostname or mysql.socket is required".into(),
        ));
    }
    if config.mysql.database.is_empty() {
        return Err(MigrateError::Config("mysql.database is required".into()));
    }
    if config.mysql.username.is_empty() {
        return Err(MigrateError::Config("mysql.username is required".into()));
    }

    // Destination validation: exactly one of file / postgres
    match (&config.destination.file, &config.destination.postgres) {
        (None, None) => {
            return Err(MigrateError::Config(
                "destination.file or destination.postgres is required".into(),
            ));
        }
        (Some(_), Some(_)) => {
            return Err(MigrateError::Config(
                "destination.file and destination.postgres are mutually exclusive".into(),
            ));
        }
        (Some(path), None) => {
            if path.as_os_str().is_empty() {
                return Err(MigrateError::Config(
                    "destination.file must not be empty".into(),
                ));
            }
        }
        (None, Some(pg)) => {
            if pg.hostname.is_empty() {
                return Err(MigrateError::Config(
                    "destination.postgres.hostname is required".into(),
                ));
            }
            if pg.database.is_empty() {
                return Err(MigrateError::Config(
                    "destination.postgres.database is required".into(),
                ));
            }
            if pg.username.is_empty() {
                return Err(MigrateError::Config(
                    "destination.postgres.username is required".into(),
                ));
            }
        }
    }

    if config.batch_size == 0 {
        return Err(MigrateError::Config("batch_size must be at least 1".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationConfig, PostgresConfig, SourceConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            mysql: SourceConfig {
                hostname: "localhost".to_string(),
                port: 3306,
                socket: None,
                username: "mysql2psql".to_string(),
                password: Some("password".to_string()),
                database: "mysql2psql_test".to_string(),
                charset: "utf8mb4".to_string(),
                compress: false,
            },
            destination: DestinationConfig {
                file: Some(PathBuf::from("out.sql")),
                postgres: None,
            },
            only_tables: vec![],
            exclude_tables: vec![],
            supress_data: false,
            supress_ddl: false,
            force_truncate: false,
            fail_fast: false,
            batch_size: 10_000,
        }
    }

    fn pg_destination() -> DestinationConfig {
        DestinationConfig {
            file: None,
            postgres: Some(PostgresConfig {
                hostname: "localhost".to_string(),
                port: 5432,
                username: "mysql2psql".to_string(),
                password: None,
                database: "mysql2psql_test".to_string(),
            }),
        }
    }

    #[test]
    fn test_valid_file_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_valid_postgres_config() {
        let mut config = valid_config();
        config.destination = pg_destination();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_destination() {
        let mut config = valid_config();
        config.destination.file = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_both_destinations() {
        let mut config = valid_config();
        config.destination.postgres = pg_destination().postgres;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_source_database() {
        let mut config = valid_config();
        config.mysql.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_socket_without_hostname() {
        let mut config = valid_config();
        config.mysql.hostname = "".to_string();
        config.mysql.socket = Some(PathBuf::from("/tmp/mysql.sock"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.mysql.password = Some("super_secret_password_123".to_string());
        let debug_output = format!("{:?}", config.mysql);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }
}
