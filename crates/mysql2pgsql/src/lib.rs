//! # mysql2pgsql
//!
//! One-shot MySQL to PostgreSQL migration library.
//!
//! Reads a MySQL database's schema and data and converts both to
//! PostgreSQL, either as a psql-loadable SQL file or straight into a
//! live database:
//!
//! - **Type mapping** over a closed MySQL type vocabulary, with
//!   boolean/serial/SET/BIT normalization
//! - **Bulk loading** through the PostgreSQL COPY protocol
//! - **Deferred indexes and foreign keys**, applied after all data
//! - **Per-table transactions** with failures recorded, not fatal
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql2pgsql::{Config, Converter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql2pgsql::Result<()> {
//!     let config = Config::load("mysql2pgsql.yaml")?;
//!     let converter = Converter::new(config).await?;
//!     let report = converter.run(CancellationToken::new()).await?;
//!     println!("Converted {} rows", report.total_rows);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod ddl;
pub mod error;
pub mod reader;
pub mod schema;
pub mod sink;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, DestinationConfig, PostgresConfig, SourceConfig, CONFIG_TEMPLATE};
pub use convert::{ConversionReport, Converter, Step, TableReport};
pub use error::{MigrateError, Result};
pub use reader::MysqlReader;
pub use schema::{Column, ForeignKey, Index, Table};
pub use sink::{FileSink, PostgresSink, Sink};
pub use typemap::{map_column, MappedColumn, SourceType};
pub use value::{Batch, SqlValue, ValueKind};
