//! SQL file sink.
//!
//! Writes a psql-loadable dump: session settings, DDL statements, then
//! one contiguous COPY block per table terminated by `\.`.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{copy_statement, rows_to_copy_text, Sink};
use crate::error::{MigrateError, Result};
use crate::schema::Table;
use crate::typemap::MappedColumn;
use crate::value::Batch;

const FILE_HEADER: &str = "\
-- MySQL to PostgreSQL dump

SET client_encoding = 'UTF8';
SET standard_conforming_strings = off;
SET check_function_bodies = false;
SET client_min_messages = warning;

";

pub struct FileSink {
    writer: BufWriter<File>,
    /// True while a COPY block is open and unterminated.
    in_copy: bool,
}

impl FileSink {
    /// Create the output file and write the session header.
    pub async fn new(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(FILE_HEADER.as_bytes()).await?;
        info!("Writing output to {}", path.display());
        Ok(Self {
            writer,
            in_copy: false,
        })
    }

    /// Terminate an open COPY block so later statements stay parseable.
    async fn end_copy(&mut self) -> Result<()> {
        if self.in_copy {
            self.writer.write_all(b"\\.\n\n").await?;
            self.in_copy = false;
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn begin_table(&mut self, table: &Table) -> Result<()> {
        self.writer
            .write_all(format!("-- Table: {}\n\n", table.name).as_bytes())
            .await?;
        Ok(())
    }

    async fn write_ddl(&mut self, statements: &[String]) -> Result<()> {
        for stmt in statements {
            self.writer.write_all(stmt.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
        }
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn write_rows(
        &mut self,
        table: &Table,
        mapped: &[MappedColumn],
        rx: &mut mpsc::Receiver<Result<Batch>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.writer
            .write_all(copy_statement(table, mapped).as_bytes())
            .await?;
        self.writer.write_all(b"\n").await?;
        self.in_copy = true;

        let mut rows_written: u64 = 0;
        while let Some(batch) = rx.recv().await {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let batch = batch?;
            rows_written += batch.rows.len() as u64;
            self.writer
                .write_all(rows_to_copy_text(&batch.rows).as_bytes())
                .await?;
            if batch.is_last {
                break;
            }
        }

        self.end_copy().await?;
        debug!("Wrote {} rows for table {}", rows_written, table.name);
        Ok(rows_written)
    }

    async fn commit_table(&mut self, _table: &Table) -> Result<()> {
        Ok(())
    }

    async fn rollback_table(&mut self, table: &Table) -> Result<()> {
        if self.in_copy {
            self.end_copy().await?;
            self.writer
                .write_all(
                    format!("-- Data for table {} is incomplete\n\n", table.name).as_bytes(),
                )
                .await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.end_copy().await?;
        self.writer.flush().await?;
        Ok(())
    }
}
