//! MySQL source reader.
//!
//! Schema extraction through INFORMATION_SCHEMA and batched row streaming
//! over a bounded channel. Uses SQLx for connection pooling and async
//! query execution.

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Row, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::schema::{Column, ForeignKey, Index, Table};
use crate::value::{bits_to_string, Batch, SqlValue, ValueKind};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a table passes the include/exclude filters. A non-empty
/// `only` list is authoritative: a table listed there is converted even
/// when `exclude` also names it.
pub fn table_included(only: &[String], exclude: &[String], name: &str) -> bool {
    if !only.is_empty() {
        only.iter().any(|t| t == name)
    } else {
        !exclude.iter().any(|t| t == name)
    }
}

/// Options for streaming one table's rows.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub table: String,
    /// Column names in ordinal order.
    pub columns: Vec<String>,
    /// Decode kind per column, same order as `columns`.
    pub kinds: Vec<ValueKind>,
    /// Single-column integer primary key usable for keyset pagination.
    pub keyset_pk: Option<String>,
    /// Sort columns for OFFSET pagination: the full primary key, or all
    /// columns when the table has none. Batches from separate statements
    /// are only stable under a deterministic ORDER BY.
    pub order_by: Vec<String>,
    pub batch_size: usize,
}

/// MySQL source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect to the source database.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.hostname)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .charset(&config.charset);

        if let Some(ref password) = config.password {
            options = options.password(password);
        }
        if let Some(ref socket) = config.socket {
            options = options.socket(socket);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.hostname, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Base table names in deterministic (lexical) order.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        // CAST to CHAR to handle collation differences where
        // information_schema may return VARBINARY instead of VARCHAR
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("TABLE_NAME"))
            .collect())
    }

    /// Load full metadata for one table.
    pub async fn load_table(&self, name: &str) -> Result<Table> {
        let mut table = Table {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        };

        self.load_columns(&mut table).await?;
        self.load_primary_key(&mut table).await?;
        self.load_indexes(&mut table).await?;
        self.load_foreign_keys(&mut table).await?;
        self.load_serial_max(&mut table).await?;

        debug!(
            "Loaded table {}: {} columns, {} indexes, {} foreign keys",
            table.name,
            table.columns.len(),
            table.indexes.len(),
            table.foreign_keys.len()
        );
        Ok(table)
    }

    async fn load_columns(&self, table: &mut Table) -> Result<()> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(COLUMN_DEFAULT AS CHAR(255)) AS COLUMN_DEFAULT,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(COLUMN_KEY = 'PRI', 1, 0) AS is_primary,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_auto_increment,
                CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            table.columns.push(Column {
                name: row.get::<String, _>("COLUMN_NAME"),
                column_type: row.get::<String, _>("COLUMN_TYPE"),
                default: row.get::<Option<String>, _>("COLUMN_DEFAULT"),
                is_nullable: row.get::<i32, _>("is_nullable") == 1,
                is_primary_key: row.get::<i32, _>("is_primary") == 1,
                is_auto_increment: row.get::<i32, _>("is_auto_increment") == 1,
                ordinal_pos: row.get::<i64, _>("ORDINAL_POSITION") as i32,
                max_value: None,
            });
        }

        Ok(())
    }

    async fn load_primary_key(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            table.primary_key.push(row.get::<String, _>("COLUMN_NAME"));
        }

        Ok(())
    }

    async fn load_indexes(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                GROUP_CONCAT(CAST(COLUMN_NAME AS CHAR(255)) ORDER BY SEQ_IN_INDEX) AS columns,
                IF(NON_UNIQUE = 0, 1, 0) AS is_unique
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let columns_str: String = row.get("columns");
            table.indexes.push(Index {
                name: row.get::<String, _>("INDEX_NAME"),
                columns: columns_str.split(',').map(|s| s.to_string()).collect(),
                is_unique: row.get::<i32, _>("is_unique") == 1,
            });
        }

        Ok(())
    }

    async fn load_foreign_keys(&self, table: &mut Table) -> Result<()> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.DELETE_RULE AS CHAR(255)) AS DELETE_RULE,
                CAST(rc.UPDATE_RULE AS CHAR(255)) AS UPDATE_RULE
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await?;

        for row in rows {
            let name: String = row.get("CONSTRAINT_NAME");
            let column: String = row.get("COLUMN_NAME");
            let ref_column: String = row.get("REFERENCED_COLUMN_NAME");

            // Rows for a multi-column key arrive adjacent thanks to the
            // ORDER BY, so extend the previous entry when the name matches.
            if let Some(fk) = table.foreign_keys.last_mut() {
                if fk.name == name {
                    fk.columns.push(column);
                    fk.ref_columns.push(ref_column);
                    continue;
                }
            }

            table.foreign_keys.push(ForeignKey {
                name,
                columns: vec![column],
                ref_table: row.get("REFERENCED_TABLE_NAME"),
                ref_columns: vec![ref_column],
                on_delete: row.get::<Option<String>, _>("DELETE_RULE"),
                on_update: row.get::<Option<String>, _>("UPDATE_RULE"),
            });
        }

        Ok(())
    }

    /// Observe MAX() of the auto-increment column, if any, so the target
    /// sequence can be seeded past it.
    async fn load_serial_max(&self, table: &mut Table) -> Result<()> {
        let serial = match table.columns.iter().position(|c| c.is_auto_increment) {
            Some(idx) => idx,
            None => return Ok(()),
        };

        let query = format!(
            "SELECT CAST(MAX({}) AS SIGNED) AS max_value FROM {}",
            Self::quote_ident(&table.columns[serial].name),
            Self::quote_ident(&table.name)
        );

        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        table.columns[serial].max_value = row.get::<Option<i64>, _>("max_value");

        Ok(())
    }

    /// Stream a table's rows in batches through a bounded channel.
    pub fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(4);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let result = Self::read_table_impl(pool, opts, tx.clone()).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn read_table_impl(
        pool: MySqlPool,
        opts: ReadOptions,
        tx: mpsc::Sender<Result<Batch>>,
    ) -> Result<()> {
        let pk_idx = opts
            .keyset_pk
            .as_deref()
            .and_then(|pk| opts.columns.iter().position(|c| c == pk));

        let mut last_pk: Option<i64> = None;
        let mut offset: usize = 0;
        let mut decode_failures: u64 = 0;

        loop {
            let query = build_batch_query(&opts, pk_idx.and(opts.keyset_pk.as_deref()), last_pk, offset);

            let rows: Vec<MySqlRow> = sqlx::query(&query).fetch_all(&pool).await?;

            if rows.is_empty() {
                let _ = tx
                    .send(Ok(Batch {
                        rows: Vec::new(),
                        is_last: true,
                    }))
                    .await;
                break;
            }

            let batch_rows: Vec<Vec<SqlValue>> = rows
                .iter()
                .map(|row| decode_row(row, &opts.kinds, &mut decode_failures))
                .collect();

            if let Some(idx) = pk_idx {
                last_pk = batch_rows.last().and_then(|row| match &row[idx] {
                    SqlValue::I16(v) => Some(*v as i64),
                    SqlValue::I32(v) => Some(*v as i64),
                    SqlValue::I64(v) => Some(*v),
                    _ => None,
                });
            } else {
                offset += batch_rows.len();
            }

            let is_last = batch_rows.len() < opts.batch_size;
            let batch = Batch {
                rows: batch_rows,
                is_last,
            };

            if tx.send(Ok(batch)).await.is_err() {
                break; // Receiver dropped
            }

            if is_last {
                break;
            }
        }

        if let Some(msg) = decode_failure_warning(&opts.table, decode_failures) {
            warn!("{}", msg);
        }

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Build one pagination SELECT. Keyset pagination filters and orders on
/// the integer primary key; the OFFSET fallback orders on `order_by` so
/// consecutive statements see a stable row sequence.
fn build_batch_query(
    opts: &ReadOptions,
    keyset_pk: Option<&str>,
    last_pk: Option<i64>,
    offset: usize,
) -> String {
    let col_list = opts
        .columns
        .iter()
        .map(|c| MysqlReader::quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut query = format!(
        "SELECT {} FROM {}",
        col_list,
        MysqlReader::quote_ident(&opts.table)
    );

    match keyset_pk {
        Some(pk) => {
            if let Some(v) = last_pk {
                query.push_str(&format!(" WHERE {} > {}", MysqlReader::quote_ident(pk), v));
            }
            query.push_str(&format!(
                " ORDER BY {} LIMIT {}",
                MysqlReader::quote_ident(pk),
                opts.batch_size
            ));
        }
        None => {
            if !opts.order_by.is_empty() {
                let order_list = opts
                    .order_by
                    .iter()
                    .map(|c| MysqlReader::quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                query.push_str(&format!(" ORDER BY {}", order_list));
            }
            query.push_str(&format!(" LIMIT {} OFFSET {}", opts.batch_size, offset));
        }
    }

    query
}

/// Warning emitted after a table whose rows contained values the driver
/// could not decode (MySQL zero-dates, corrupt values). Those were
/// written as NULL; the substitution is reported, never silent.
fn decode_failure_warning(table: &str, failures: u64) -> Option<String> {
    if failures == 0 {
        return None;
    }
    Some(format!(
        "table {}: {} values could not be decoded and were written as NULL",
        table, failures
    ))
}

/// Decode one MySQL row following the per-column kinds. Output width is
/// always `kinds.len()`; a value the driver cannot decode becomes NULL
/// and is tallied in `failures` so the caller can report it.
pub fn decode_row(row: &MySqlRow, kinds: &[ValueKind], failures: &mut u64) -> Vec<SqlValue> {
    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            let is_null: bool = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
            if is_null {
                return SqlValue::Null;
            }

            let decoded: std::result::Result<SqlValue, sqlx::Error> = match kind {
                ValueKind::Bool => row.try_get::<i8, _>(i).map(|v| SqlValue::Bool(v != 0)),
                ValueKind::BitBool => row
                    .try_get::<Vec<u8>, _>(i)
                    .map(|b| SqlValue::Bool(b.iter().any(|byte| *byte != 0))),
                ValueKind::Bits(width) => row
                    .try_get::<Vec<u8>, _>(i)
                    .map(|b| SqlValue::Text(bits_to_string(&b, *width))),
                ValueKind::I8 => row.try_get::<i8, _>(i).map(|v| SqlValue::I16(v as i16)),
                ValueKind::U8 => row.try_get::<u8, _>(i).map(|v| SqlValue::I16(v as i16)),
                ValueKind::I16 => row.try_get::<i16, _>(i).map(SqlValue::I16),
                ValueKind::U16 => row.try_get::<u16, _>(i).map(|v| SqlValue::I32(v as i32)),
                ValueKind::I32 => row.try_get::<i32, _>(i).map(SqlValue::I32),
                ValueKind::U32 => row.try_get::<u32, _>(i).map(|v| SqlValue::I64(v as i64)),
                ValueKind::I64 => row.try_get::<i64, _>(i).map(SqlValue::I64),
                ValueKind::U64 => row
                    .try_get::<u64, _>(i)
                    .map(|v| SqlValue::Decimal(rust_decimal::Decimal::from(v))),
                ValueKind::F32 => row.try_get::<f32, _>(i).map(SqlValue::F32),
                ValueKind::F64 => row.try_get::<f64, _>(i).map(SqlValue::F64),
                ValueKind::Decimal => row
                    .try_get::<rust_decimal::Decimal, _>(i)
                    .map(SqlValue::Decimal),
                ValueKind::Text => row.try_get::<String, _>(i).map(SqlValue::Text),
                ValueKind::Bytes => row.try_get::<Vec<u8>, _>(i).map(SqlValue::Bytes),
                ValueKind::Date => row.try_get::<chrono::NaiveDate, _>(i).map(SqlValue::Date),
                ValueKind::Time => row.try_get::<chrono::NaiveTime, _>(i).map(SqlValue::Time),
                ValueKind::DateTime => row
                    .try_get::<chrono::NaiveDateTime, _>(i)
                    .map(SqlValue::DateTime),
                ValueKind::TimestampUtc => row
                    .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .map(|dt| SqlValue::DateTime(dt.naive_utc())),
            };

            match decoded {
                Ok(value) => value,
                Err(_) => {
                    *failures += 1;
                    SqlValue::Null
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(MysqlReader::quote_ident("name"), "`name`");
        assert_eq!(MysqlReader::quote_ident("table`name"), "`table``name`");
    }

    #[test]
    fn test_table_filter_exclude() {
        let exclude = vec!["cache".to_string(), "sessions".to_string()];
        assert!(table_included(&[], &exclude, "users"));
        assert!(!table_included(&[], &exclude, "cache"));
    }

    #[test]
    fn test_table_filter_only_wins_over_exclude() {
        let only = vec!["users".to_string()];
        let exclude = vec!["users".to_string(), "cache".to_string()];
        assert!(table_included(&only, &exclude, "users"));
        assert!(!table_included(&only, &exclude, "orders"));
        assert!(!table_included(&only, &exclude, "cache"));
    }

    fn opts(keyset_pk: Option<&str>, order_by: &[&str]) -> ReadOptions {
        ReadOptions {
            table: "events".to_string(),
            columns: vec!["id".to_string(), "kind".to_string(), "at".to_string()],
            kinds: vec![ValueKind::I32, ValueKind::Text, ValueKind::DateTime],
            keyset_pk: keyset_pk.map(|s| s.to_string()),
            order_by: order_by.iter().map(|s| s.to_string()).collect(),
            batch_size: 100,
        }
    }

    #[test]
    fn test_keyset_query() {
        let o = opts(Some("id"), &[]);
        assert_eq!(
            build_batch_query(&o, Some("id"), None, 0),
            "SELECT `id`, `kind`, `at` FROM `events` ORDER BY `id` LIMIT 100"
        );
        assert_eq!(
            build_batch_query(&o, Some("id"), Some(42), 0),
            "SELECT `id`, `kind`, `at` FROM `events` WHERE `id` > 42 ORDER BY `id` LIMIT 100"
        );
    }

    #[test]
    fn test_offset_query_is_ordered() {
        // composite or text keys paginate by OFFSET over the full key
        let o = opts(None, &["kind", "at"]);
        assert_eq!(
            build_batch_query(&o, None, None, 200),
            "SELECT `id`, `kind`, `at` FROM `events` ORDER BY `kind`, `at` LIMIT 100 OFFSET 200"
        );
    }

    #[test]
    fn test_keyless_offset_query_orders_on_all_columns() {
        let o = opts(None, &["id", "kind", "at"]);
        assert_eq!(
            build_batch_query(&o, None, None, 0),
            "SELECT `id`, `kind`, `at` FROM `events` ORDER BY `id`, `kind`, `at` LIMIT 100 OFFSET 0"
        );
    }

    #[test]
    fn test_decode_failure_warning() {
        assert_eq!(decode_failure_warning("users", 0), None);
        let msg = decode_failure_warning("users", 3).unwrap();
        assert!(msg.contains("users"));
        assert!(msg.contains("3 values"));
        assert!(msg.contains("NULL"));
    }
}
