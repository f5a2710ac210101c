//! Output sinks: SQL file or live PostgreSQL database.

mod file;
mod postgres;

pub use file::FileSink;
pub use postgres::PostgresSink;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::schema::Table;
use crate::typemap::MappedColumn;
use crate::value::{Batch, SqlValue};

/// Destination for converted schema and data.
///
/// The converter drives one table at a time: `begin_table`, DDL, rows,
/// then `commit_table` (or `rollback_table` on failure). Index and
/// constraint statements arrive through `write_ddl` after every table's
/// data is in place.
#[async_trait]
pub trait Sink: Send {
    async fn begin_table(&mut self, table: &Table) -> Result<()>;

    async fn write_ddl(&mut self, statements: &[String]) -> Result<()>;

    /// Drain the batch receiver into the destination. Returns the number
    /// of rows written. Stops early with `Cancelled` when the token fires.
    async fn write_rows(
        &mut self,
        table: &Table,
        mapped: &[MappedColumn],
        rx: &mut mpsc::Receiver<Result<Batch>>,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    async fn commit_table(&mut self, table: &Table) -> Result<()>;

    async fn rollback_table(&mut self, table: &Table) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Encode rows as COPY text lines: tab-separated fields, one row per line.
pub(crate) fn rows_to_copy_text(rows: &[Vec<SqlValue>]) -> String {
    let mut out = String::with_capacity(rows.len() * 64);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            out.push_str(&value.to_copy_field());
        }
        out.push('\n');
    }
    out
}

/// COPY statement header for a table.
pub(crate) fn copy_statement(table: &Table, mapped: &[MappedColumn]) -> String {
    let cols: Vec<String> = mapped
        .iter()
        .map(|c| crate::ddl::quote_ident(&c.name))
        .collect();
    format!(
        "COPY {} ({}) FROM stdin;",
        crate::ddl::quote_ident(&table.name),
        cols.join(", ")
    )
}
