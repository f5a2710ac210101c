//! Error types for the conversion library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for conversion operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fresh configuration template was written; the user must edit it first.
    #[error("No configuration file found.\nA new file has been initialized at: {}\nPlease review the configuration and retry...", .0.display())]
    ConfigInitialized(PathBuf),

    /// Column declaration outside the supported MySQL type vocabulary
    #[error("Unsupported MySQL type '{type_name}' for column {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        type_name: String,
    },

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Writing a specific table failed
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Conversion was cancelled (SIGINT, etc.)
    #[error("Conversion cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create an UnsupportedType error
    pub fn unsupported_type(
        table: impl Into<String>,
        column: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        MigrateError::UnsupportedType {
            table: table.into(),
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::ConfigInitialized(_) => 3,
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            _ => 1,
        }
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            MigrateError::ConfigInitialized(PathBuf::from("a.yaml")).exit_code(),
            3
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), 1);
        assert_eq!(
            MigrateError::unsupported_type("t", "c", "geometry").exit_code(),
            1
        );
    }

    #[test]
    fn test_unsupported_type_message_names_table_and_column() {
        let err = MigrateError::unsupported_type("users", "shape", "geometry");
        let msg = err.to_string();
        assert!(msg.contains("users.shape"));
        assert!(msg.contains("geometry"));
    }
}
