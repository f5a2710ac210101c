//! Conversion orchestration.
//!
//! Drives the whole run: schema extraction, per-table DDL and data in a
//! transaction, then indexes and finally foreign keys once every table's
//! data is in place.

use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::ddl;
use crate::error::{MigrateError, Result};
use crate::reader::{table_included, MysqlReader, ReadOptions};
use crate::schema::Table;
use crate::sink::{FileSink, PostgresSink, Sink};
use crate::typemap::{map_column, MappedColumn};
use crate::value::{Batch, ValueKind};

/// Per-table progress step, recorded on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    SchemaMapped,
    DdlWritten,
    DataLoaded,
    IndexesWritten,
    ConstraintsWritten,
    Done,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::SchemaMapped => "schema_mapped",
            Step::DdlWritten => "ddl_written",
            Step::DataLoaded => "data_loaded",
            Step::IndexesWritten => "indexes_written",
            Step::ConstraintsWritten => "constraints_written",
            Step::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub tables: Vec<TableReport>,
    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,
    pub total_rows: u64,
    pub duration_seconds: f64,
}

impl ConversionReport {
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.success)
            .map(|t| t.table.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A table with its mapped target shape, ready to convert.
struct PlannedTable {
    table: Table,
    mapped: Vec<MappedColumn>,
}

/// One-shot MySQL to PostgreSQL conversion.
pub struct Converter {
    config: Config,
    reader: MysqlReader,
    sink: Box<dyn Sink>,
}

impl Converter {
    /// Connect both ends according to the configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let reader = MysqlReader::new(&config.mysql).await?;

        let sink: Box<dyn Sink> = match (&config.destination.file, &config.destination.postgres) {
            (Some(path), _) => Box::new(FileSink::new(path).await?),
            (None, Some(pg)) => Box::new(PostgresSink::new(pg).await?),
            (None, None) => {
                return Err(MigrateError::Config(
                    "destination.file or destination.postgres is required".into(),
                ));
            }
        };

        Ok(Self {
            config,
            reader,
            sink,
        })
    }

    /// Run the conversion to completion.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ConversionReport> {
        let start = Instant::now();
        let mut reports: Vec<TableReport> = Vec::new();

        let names: Vec<String> = self
            .reader
            .table_names()
            .await?
            .into_iter()
            .filter(|n| {
                table_included(&self.config.only_tables, &self.config.exclude_tables, n)
            })
            .collect();
        info!("Converting {} tables", names.len());

        // Phase 0: extract and map schemas. A table whose declaration
        // falls outside the supported vocabulary fails here, before
        // anything is written.
        let mut planned: Vec<PlannedTable> = Vec::new();
        for name in &names {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let table = self.reader.load_table(name).await?;
            match map_table(&table) {
                Ok(mapped) => {
                    for warning in mapped.iter().filter_map(|c| c.warning.as_deref()) {
                        warn!("{}", warning);
                    }
                    planned.push(PlannedTable { table, mapped });
                }
                Err(e) => {
                    error!("Skipping table {}: {}", name, e);
                    if self.config.fail_fast {
                        return Err(e);
                    }
                    reports.push(TableReport {
                        table: name.clone(),
                        rows: 0,
                        success: false,
                        failed_step: Some(Step::SchemaMapped),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // Phase 1: per table, DDL and data inside one transaction.
        let mut loaded: Vec<PlannedTable> = Vec::new();
        for plan in planned {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            match self.convert_table(&plan, &cancel).await {
                Ok(rows) => {
                    reports.push(TableReport {
                        table: plan.table.name.clone(),
                        rows,
                        success: true,
                        failed_step: None,
                        error: None,
                    });
                    loaded.push(plan);
                }
                Err((step, e)) => {
                    self.sink.rollback_table(&plan.table).await?;
                    if matches!(e, MigrateError::Cancelled) {
                        return Err(e);
                    }
                    error!("Table {} failed at {}: {}", plan.table.name, step, e);
                    if self.config.fail_fast {
                        return Err(e);
                    }
                    reports.push(TableReport {
                        table: plan.table.name.clone(),
                        rows: 0,
                        success: false,
                        failed_step: Some(step),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // Phases 2 and 3: indexes, then foreign keys. Both wait until all
        // data is loaded so constraints cannot reject rows mid-stream.
        if finalize_enabled(self.config.supress_ddl, self.config.force_truncate) {
            self.finalize_phase(&loaded, &cancel, Step::IndexesWritten, &mut reports, |t| {
                ddl::index_ddl(t)
            })
            .await?;
            self.finalize_phase(
                &loaded,
                &cancel,
                Step::ConstraintsWritten,
                &mut reports,
                |t| ddl::constraint_ddl(t),
            )
            .await?;
        }

        self.sink.close().await?;
        self.reader.close().await;

        let tables_failed = reports.iter().filter(|r| !r.success).count();
        let report = ConversionReport {
            tables_total: reports.len(),
            tables_success: reports.len() - tables_failed,
            tables_failed,
            total_rows: reports.iter().map(|r| r.rows).sum(),
            duration_seconds: start.elapsed().as_secs_f64(),
            tables: reports,
        };

        info!(
            "Conversion finished: {}/{} tables, {} rows in {:.2}s",
            report.tables_success,
            report.tables_total,
            report.total_rows,
            report.duration_seconds
        );
        Ok(report)
    }

    /// Convert one table: DDL plus data in a single transaction. Returns
    /// the failing step alongside the error so the report can name it.
    async fn convert_table(
        &mut self,
        plan: &PlannedTable,
        cancel: &CancellationToken,
    ) -> std::result::Result<u64, (Step, MigrateError)> {
        let table = &plan.table;
        info!("Converting table {}", table.name);

        let stmts = table_statements(
            self.config.supress_ddl,
            self.config.force_truncate,
            table,
            &plan.mapped,
        );

        let mut rx = if self.config.supress_data {
            None
        } else {
            let opts = ReadOptions {
                table: table.name.clone(),
                columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                kinds: plan.mapped.iter().map(|c| c.kind).collect(),
                keyset_pk: keyset_pk(table, &plan.mapped),
                order_by: if table.primary_key.is_empty() {
                    table.columns.iter().map(|c| c.name.clone()).collect()
                } else {
                    table.primary_key.clone()
                },
                batch_size: self.config.batch_size,
            };
            Some(self.reader.read_table(opts))
        };

        write_table(
            self.sink.as_mut(),
            table,
            &plan.mapped,
            &stmts,
            rx.as_mut(),
            cancel,
        )
        .await
    }

    /// Run one finalize phase (indexes or constraints) over the loaded
    /// tables, downgrading an already-successful report entry on failure.
    async fn finalize_phase<F>(
        &mut self,
        loaded: &[PlannedTable],
        cancel: &CancellationToken,
        step: Step,
        reports: &mut [TableReport],
        stmts_for: F,
    ) -> Result<()>
    where
        F: Fn(&Table) -> Vec<String>,
    {
        for plan in loaded {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            let stmts = stmts_for(&plan.table);
            if stmts.is_empty() {
                continue;
            }
            if let Err(e) = self.sink.write_ddl(&stmts).await {
                if matches!(e, MigrateError::Cancelled) {
                    return Err(e);
                }
                error!("Table {} failed at {}: {}", plan.table.name, step, e);
                if self.config.fail_fast {
                    return Err(e);
                }
                if let Some(report) = reports.iter_mut().find(|r| r.table == plan.table.name) {
                    report.success = false;
                    report.failed_step = Some(step);
                    report.error = Some(e.to_string());
                }
            }
        }
        Ok(())
    }
}

/// Statements that prepare a table for its data. `force_truncate`
/// replaces drop/create entirely: the table is kept and only truncated,
/// with its sequence reseeded. `supress_ddl` alone emits nothing.
fn table_statements(
    supress_ddl: bool,
    force_truncate: bool,
    table: &Table,
    mapped: &[MappedColumn],
) -> Vec<String> {
    if force_truncate {
        ddl::truncate_ddl(table, mapped)
    } else if !supress_ddl {
        ddl::table_ddl(table, mapped)
    } else {
        Vec::new()
    }
}

/// Whether the index/constraint phases run. Truncate mode keeps the
/// existing table, so its indexes and constraints are already in place.
fn finalize_enabled(supress_ddl: bool, force_truncate: bool) -> bool {
    !supress_ddl && !force_truncate
}

/// Drive one table through the sink: begin, DDL, optional data, commit.
/// `rows` is None when data is suppressed.
async fn write_table(
    sink: &mut dyn Sink,
    table: &Table,
    mapped: &[MappedColumn],
    stmts: &[String],
    rows: Option<&mut mpsc::Receiver<Result<Batch>>>,
    cancel: &CancellationToken,
) -> std::result::Result<u64, (Step, MigrateError)> {
    sink.begin_table(table)
        .await
        .map_err(|e| (Step::DdlWritten, e))?;

    if !stmts.is_empty() {
        sink.write_ddl(stmts)
            .await
            .map_err(|e| (Step::DdlWritten, e))?;
    }

    let mut rows_written = 0;
    if let Some(rx) = rows {
        rows_written = sink
            .write_rows(table, mapped, rx, cancel)
            .await
            .map_err(|e| (Step::DataLoaded, e))?;
    }

    sink.commit_table(table)
        .await
        .map_err(|e| (Step::DataLoaded, e))?;
    Ok(rows_written)
}

/// Map every column of a table, failing on the first unsupported type.
fn map_table(table: &Table) -> Result<Vec<MappedColumn>> {
    table
        .columns
        .iter()
        .map(|c| map_column(&table.name, c))
        .collect()
}

/// Single-column integer primary key usable for keyset pagination.
fn keyset_pk(table: &Table, mapped: &[MappedColumn]) -> Option<String> {
    if table.primary_key.len() != 1 {
        return None;
    }
    let pk = &table.primary_key[0];
    let col = mapped.iter().find(|c| &c.name == pk)?;
    match col.kind {
        ValueKind::I8
        | ValueKind::U8
        | ValueKind::I16
        | ValueKind::U16
        | ValueKind::I32
        | ValueKind::U32
        | ValueKind::I64 => Some(pk.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::{make_column, make_table};
    use crate::value::SqlValue;
    use async_trait::async_trait;

    fn mapped_for(table: &Table) -> Vec<MappedColumn> {
        map_table(table).unwrap()
    }

    fn serial_table() -> Table {
        let mut id = make_column("id", "int(11)", 1);
        id.is_primary_key = true;
        id.is_auto_increment = true;
        id.is_nullable = false;
        id.max_value = Some(2);
        make_table("users", vec![id, make_column("name", "varchar(50)", 2)])
    }

    /// Sink that records the call sequence instead of writing anywhere.
    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
        fail_rows: bool,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn begin_table(&mut self, table: &Table) -> Result<()> {
            self.calls.push(format!("begin {}", table.name));
            Ok(())
        }

        async fn write_ddl(&mut self, statements: &[String]) -> Result<()> {
            for stmt in statements {
                self.calls.push(format!("ddl {}", stmt));
            }
            Ok(())
        }

        async fn write_rows(
            &mut self,
            table: &Table,
            _mapped: &[MappedColumn],
            rx: &mut mpsc::Receiver<Result<Batch>>,
            _cancel: &CancellationToken,
        ) -> Result<u64> {
            if self.fail_rows {
                return Err(MigrateError::write(&table.name, "boom"));
            }
            let mut rows = 0;
            while let Some(batch) = rx.recv().await {
                let batch = batch?;
                rows += batch.rows.len() as u64;
                if batch.is_last {
                    break;
                }
            }
            self.calls.push(format!("rows {} {}", table.name, rows));
            Ok(rows)
        }

        async fn commit_table(&mut self, table: &Table) -> Result<()> {
            self.calls.push(format!("commit {}", table.name));
            Ok(())
        }

        async fn rollback_table(&mut self, table: &Table) -> Result<()> {
            self.calls.push(format!("rollback {}", table.name));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.calls.push("close".to_string());
            Ok(())
        }
    }

    async fn feed_rows(rows: Vec<Vec<SqlValue>>) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Batch { rows, is_last: true })).await.unwrap();
        rx
    }

    #[test]
    fn test_table_statements_normal_run_recreates() {
        let table = serial_table();
        let stmts = table_statements(false, false, &table, &mapped_for(&table));
        assert!(stmts.iter().any(|s| s.starts_with("DROP TABLE")));
        assert!(stmts.iter().any(|s| s.starts_with("CREATE TABLE")));
    }

    #[test]
    fn test_table_statements_force_truncate_never_recreates() {
        let table = serial_table();
        let mapped = mapped_for(&table);

        // with and without supress_ddl, truncate mode is TRUNCATE + setval only
        for supress_ddl in [false, true] {
            let stmts = table_statements(supress_ddl, true, &table, &mapped);
            assert_eq!(stmts[0], "TRUNCATE \"users\" CASCADE;");
            assert_eq!(
                stmts[1],
                "SELECT pg_catalog.setval('\"users_id_seq\"', 3, true);"
            );
            assert!(stmts.iter().all(|s| !s.contains("DROP")));
            assert!(stmts.iter().all(|s| !s.contains("CREATE")));
        }
    }

    #[test]
    fn test_table_statements_supress_ddl_emits_nothing() {
        let table = serial_table();
        assert!(table_statements(true, false, &table, &mapped_for(&table)).is_empty());
    }

    #[test]
    fn test_finalize_disabled_for_supress_ddl_and_truncate() {
        assert!(finalize_enabled(false, false));
        assert!(!finalize_enabled(true, false));
        assert!(!finalize_enabled(false, true));
        assert!(!finalize_enabled(true, true));
    }

    #[tokio::test]
    async fn test_write_table_sequence() {
        let table = serial_table();
        let mapped = mapped_for(&table);
        let stmts = table_statements(false, false, &table, &mapped);
        let mut sink = RecordingSink::default();
        let mut rx = feed_rows(vec![
            vec![SqlValue::I32(1), SqlValue::Text("a".to_string())],
            vec![SqlValue::I32(2), SqlValue::Text("b".to_string())],
        ])
        .await;

        let rows = write_table(
            &mut sink,
            &table,
            &mapped,
            &stmts,
            Some(&mut rx),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(rows, 2);
        assert_eq!(sink.calls.first().unwrap(), "begin users");
        assert_eq!(sink.calls.last().unwrap(), "commit users");
        let rows_pos = sink.calls.iter().position(|c| c == "rows users 2").unwrap();
        let ddl_pos = sink
            .calls
            .iter()
            .position(|c| c.starts_with("ddl CREATE TABLE"))
            .unwrap();
        assert!(ddl_pos < rows_pos);
    }

    #[tokio::test]
    async fn test_write_table_supress_data_writes_no_rows() {
        let table = serial_table();
        let mapped = mapped_for(&table);
        let stmts = table_statements(false, false, &table, &mapped);
        let mut sink = RecordingSink::default();

        write_table(
            &mut sink,
            &table,
            &mapped,
            &stmts,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(sink.calls.iter().all(|c| !c.starts_with("rows")));
        assert!(sink.calls.contains(&"commit users".to_string()));
    }

    #[tokio::test]
    async fn test_write_table_supress_ddl_writes_no_statements() {
        let table = serial_table();
        let mapped = mapped_for(&table);
        let stmts = table_statements(true, false, &table, &mapped);
        let mut sink = RecordingSink::default();
        let mut rx = feed_rows(vec![vec![SqlValue::I32(1), SqlValue::Null]]).await;

        let rows = write_table(
            &mut sink,
            &table,
            &mapped,
            &stmts,
            Some(&mut rx),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(rows, 1);
        assert!(sink.calls.iter().all(|c| !c.starts_with("ddl")));
    }

    #[tokio::test]
    async fn test_write_table_reports_failing_step() {
        let table = serial_table();
        let mapped = mapped_for(&table);
        let stmts = table_statements(false, false, &table, &mapped);
        let mut sink = RecordingSink {
            fail_rows: true,
            ..Default::default()
        };
        let mut rx = feed_rows(vec![vec![SqlValue::I32(1), SqlValue::Null]]).await;

        let (step, err) = write_table(
            &mut sink,
            &table,
            &mapped,
            &stmts,
            Some(&mut rx),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(step, Step::DataLoaded);
        assert!(matches!(err, MigrateError::Write { .. }));
        assert!(!sink.calls.contains(&"commit users".to_string()));
    }

    #[test]
    fn test_keyset_pk_integer() {
        let mut id = make_column("id", "int(11)", 1);
        id.is_primary_key = true;
        let table = make_table("t", vec![id]);
        assert_eq!(keyset_pk(&table, &mapped_for(&table)), Some("id".to_string()));
    }

    #[test]
    fn test_keyset_pk_rejects_text_and_composite() {
        let mut code = make_column("code", "varchar(10)", 1);
        code.is_primary_key = true;
        let table = make_table("t", vec![code]);
        assert_eq!(keyset_pk(&table, &mapped_for(&table)), None);

        let mut a = make_column("a", "int(11)", 1);
        a.is_primary_key = true;
        let mut b = make_column("b", "int(11)", 2);
        b.is_primary_key = true;
        let table = make_table("t", vec![a, b]);
        assert_eq!(keyset_pk(&table, &mapped_for(&table)), None);
    }

    #[test]
    fn test_map_table_fails_on_unknown_type() {
        let table = make_table(
            "places",
            vec![make_column("id", "int(11)", 1), make_column("shape", "geometry", 2)],
        );
        assert!(map_table(&table).is_err());
    }

    #[test]
    fn test_report_json_shape() {
        let report = ConversionReport {
            tables: vec![TableReport {
                table: "users".to_string(),
                rows: 2,
                success: true,
                failed_step: None,
                error: None,
            }],
            tables_total: 1,
            tables_success: 1,
            tables_failed: 0,
            total_rows: 2,
            duration_seconds: 0.5,
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"users\""));
        assert!(json.contains("\"tables_success\": 1"));
        // succeeded tables carry no failure fields
        assert!(!json.contains("failed_step"));
    }

    #[test]
    fn test_failed_tables() {
        let report = ConversionReport {
            tables: vec![
                TableReport {
                    table: "a".to_string(),
                    rows: 1,
                    success: true,
                    failed_step: None,
                    error: None,
                },
                TableReport {
                    table: "b".to_string(),
                    rows: 0,
                    success: false,
                    failed_step: Some(Step::DataLoaded),
                    error: Some("boom".to_string()),
                },
            ],
            tables_total: 2,
            tables_success: 1,
            tables_failed: 1,
            total_rows: 1,
            duration_seconds: 1.0,
        };
        assert_eq!(report.failed_tables(), vec!["b"]);
    }
}
