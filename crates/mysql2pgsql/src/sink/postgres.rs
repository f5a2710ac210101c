//! Live PostgreSQL sink.
//!
//! One connection, one transaction per table, rows loaded through the
//! COPY text protocol.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio_postgres::{Client, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{rows_to_copy_text, Sink};
use crate::config::PostgresConfig;
use crate::ddl::quote_ident;
use crate::error::{MigrateError, Result};
use crate::schema::Table;
use crate::typemap::MappedColumn;
use crate::value::Batch;

pub struct PostgresSink {
    client: Client,
    connection_task: tokio::task::JoinHandle<()>,
}

impl PostgresSink {
    /// Connect to the target database.
    pub async fn new(config: &PostgresConfig) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(&config.connection_string(), NoTls).await?;

        // The connection object drives the socket until the client drops.
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.hostname, config.port, config.database
        );

        Ok(Self {
            client,
            connection_task,
        })
    }
}

#[async_trait]
impl Sink for PostgresSink {
    async fn begin_table(&mut self, _table: &Table) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn write_ddl(&mut self, statements: &[String]) -> Result<()> {
        for stmt in statements {
            debug!("Executing: {}", stmt);
            self.client.batch_execute(stmt).await?;
        }
        Ok(())
    }

    async fn write_rows(
        &mut self,
        table: &Table,
        mapped: &[MappedColumn],
        rx: &mut mpsc::Receiver<Result<Batch>>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let cols: Vec<String> = mapped.iter().map(|c| quote_ident(&c.name)).collect();
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            quote_ident(&table.name),
            cols.join(", ")
        );

        let start = Instant::now();
        let sink = self.client.copy_in(&copy_sql).await?;
        tokio::pin!(sink);

        let mut rows_sent: u64 = 0;
        while let Some(batch) = rx.recv().await {
            if cancel.is_cancelled() {
                // Dropping the unfinished sink aborts the COPY.
                return Err(MigrateError::Cancelled);
            }
            let batch = batch?;
            rows_sent += batch.rows.len() as u64;
            if !batch.rows.is_empty() {
                sink.send(Bytes::from(rows_to_copy_text(&batch.rows)))
                    .await?;
            }
            if batch.is_last {
                break;
            }
        }

        let rows_written = sink.finish().await?;
        if rows_written != rows_sent {
            return Err(MigrateError::write(
                &table.name,
                format!("sent {} rows but COPY reported {}", rows_sent, rows_written),
            ));
        }

        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Loaded {} rows into {} in {:.2}s ({:.0} rows/sec)",
            rows_written,
            table.name,
            elapsed,
            if elapsed > 0.0 {
                rows_written as f64 / elapsed
            } else {
                rows_written as f64
            }
        );
        Ok(rows_written)
    }

    async fn commit_table(&mut self, _table: &Table) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback_table(&mut self, table: &Table) -> Result<()> {
        if let Err(e) = self.client.batch_execute("ROLLBACK").await {
            warn!("Rollback failed for table {}: {}", table.name, e);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connection_task.abort();
        Ok(())
    }
}
