//! PostgreSQL DDL generation.
//!
//! Pure string builders over the extracted schema and its mapped columns.
//! Statement order matters: sequences come before the tables that use
//! them, and index/constraint statements are produced separately so the
//! caller can defer them until after all data is loaded.

use crate::schema::{ForeignKey, Index, Table};
use crate::typemap::MappedColumn;

/// Quote a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sequence name for a serial column.
pub fn sequence_name(table: &str, column: &str) -> String {
    format!("{}_{}_seq", table, column)
}

/// One column definition inside CREATE TABLE.
fn column_def(col: &MappedColumn) -> String {
    let mut def = format!("{} {}", quote_ident(&col.name), col.pg_type);
    if let Some(ref default) = col.default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    if col.not_null {
        def.push_str(" NOT NULL");
    }
    def
}

/// setval() statement seeding a serial column's sequence. The sequence is
/// set past the observed maximum so the next insert does not collide;
/// an empty table seeds at 1.
fn setval_statement(table: &Table, col_name: &str) -> String {
    let max = table
        .column(col_name)
        .and_then(|c| c.max_value)
        .map(|m| m + 1)
        .unwrap_or(1);
    format!(
        "SELECT pg_catalog.setval('{}', {}, true);",
        quote_ident(&sequence_name(&table.name, col_name)),
        max
    )
}

/// Drop/create statements for one table, sequences first.
pub fn table_ddl(table: &Table, mapped: &[MappedColumn]) -> Vec<String> {
    let mut stmts = Vec::new();

    for col in mapped.iter().filter(|c| c.identity) {
        let seq = quote_ident(&sequence_name(&table.name, &col.name));
        stmts.push(format!("DROP SEQUENCE IF EXISTS {} CASCADE;", seq));
        stmts.push(format!(
            "CREATE SEQUENCE {} INCREMENT BY 1 NO MAXVALUE NO MINVALUE CACHE 1;",
            seq
        ));
        stmts.push(setval_statement(table, &col.name));
    }

    stmts.push(format!(
        "DROP TABLE IF EXISTS {} CASCADE;",
        quote_ident(&table.name)
    ));

    let cols: Vec<String> = mapped.iter().map(column_def).collect();
    stmts.push(format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_ident(&table.name),
        cols.join(",\n    ")
    ));

    stmts
}

/// Truncate statements for one table: TRUNCATE plus sequence reseed, no
/// drop/create. Used when loading into an existing schema.
pub fn truncate_ddl(table: &Table, mapped: &[MappedColumn]) -> Vec<String> {
    let mut stmts = vec![format!(
        "TRUNCATE {} CASCADE;",
        quote_ident(&table.name)
    )];
    for col in mapped.iter().filter(|c| c.identity) {
        stmts.push(setval_statement(table, &col.name));
    }
    stmts
}

/// Index name derived from the member columns.
fn index_name(table: &str, index: &Index) -> String {
    format!("{}_{}_idx", table, index.columns.join("_"))
}

/// Primary key constraint and secondary index statements for one table.
pub fn index_ddl(table: &Table) -> Vec<String> {
    let mut stmts = Vec::new();

    if !table.primary_key.is_empty() {
        let cols: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
        stmts.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
            quote_ident(&table.name),
            quote_ident(&format!("{}_pkey", table.name)),
            cols.join(", ")
        ));
    }

    for index in &table.indexes {
        let name = index_name(&table.name, index);
        let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
        stmts.push(format!("DROP INDEX IF EXISTS {};", quote_ident(&name)));
        stmts.push(format!(
            "CREATE {}INDEX {} ON {} ({});",
            if index.is_unique { "UNIQUE " } else { "" },
            quote_ident(&name),
            quote_ident(&table.name),
            cols.join(", ")
        ));
    }

    stmts
}

fn foreign_key_clause(fk: &ForeignKey) -> String {
    let cols: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
    let ref_cols: Vec<String> = fk.ref_columns.iter().map(|c| quote_ident(c)).collect();
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        cols.join(", "),
        quote_ident(&fk.ref_table),
        ref_cols.join(", ")
    );
    if let Some(ref action) = fk.on_delete {
        if action != "NO ACTION" {
            clause.push_str(&format!(" ON DELETE {}", action));
        }
    }
    if let Some(ref action) = fk.on_update {
        if action != "NO ACTION" {
            clause.push_str(&format!(" ON UPDATE {}", action));
        }
    }
    clause
}

/// Foreign key statements for one table. Emitted last, after every
/// referenced table has its data and primary key in place.
pub fn constraint_ddl(table: &Table) -> Vec<String> {
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "ALTER TABLE {} ADD {};",
                quote_ident(&table.name),
                foreign_key_clause(fk)
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::{make_column, make_table};
    use crate::schema::{ForeignKey, Index};
    use crate::typemap::map_column;

    fn users_table() -> Table {
        let mut id = make_column("id", "int(11)", 1);
        id.is_primary_key = true;
        id.is_auto_increment = true;
        id.is_nullable = false;
        id.max_value = Some(2);
        let flags = make_column("flags", "set('a','b','c')", 2);
        let mut active = make_column("active", "bit(1)", 3);
        active.is_nullable = false;
        make_table("users", vec![id, flags, active])
    }

    fn mapped(table: &Table) -> Vec<MappedColumn> {
        table
            .columns
            .iter()
            .map(|c| map_column(&table.name, c).unwrap())
            .collect()
    }

    #[test]
    fn test_serial_table_ddl() {
        let table = users_table();
        let stmts = table_ddl(&table, &mapped(&table));

        assert_eq!(stmts[0], "DROP SEQUENCE IF EXISTS \"users_id_seq\" CASCADE;");
        assert_eq!(
            stmts[1],
            "CREATE SEQUENCE \"users_id_seq\" INCREMENT BY 1 NO MAXVALUE NO MINVALUE CACHE 1;"
        );
        // max id is 2, so the sequence starts handing out 3
        assert_eq!(
            stmts[2],
            "SELECT pg_catalog.setval('\"users_id_seq\"', 3, true);"
        );
        assert_eq!(stmts[3], "DROP TABLE IF EXISTS \"users\" CASCADE;");

        let create = &stmts[4];
        assert!(create.contains(
            "\"id\" integer DEFAULT nextval('\"users_id_seq\"'::regclass) NOT NULL"
        ));
        assert!(create.contains("\"flags\" text"));
        assert!(create.contains("\"active\" boolean NOT NULL"));
    }

    #[test]
    fn test_empty_table_sequence_starts_at_one() {
        let mut table = users_table();
        table.columns[0].max_value = None;
        let stmts = table_ddl(&table, &mapped(&table));
        assert_eq!(
            stmts[2],
            "SELECT pg_catalog.setval('\"users_id_seq\"', 1, true);"
        );
    }

    #[test]
    fn test_truncate_ddl_has_no_drop() {
        let table = users_table();
        let stmts = truncate_ddl(&table, &mapped(&table));
        assert_eq!(stmts[0], "TRUNCATE \"users\" CASCADE;");
        assert_eq!(
            stmts[1],
            "SELECT pg_catalog.setval('\"users_id_seq\"', 3, true);"
        );
        assert!(stmts.iter().all(|s| !s.contains("DROP")));
        assert!(stmts.iter().all(|s| !s.contains("CREATE")));
    }

    #[test]
    fn test_index_ddl() {
        let mut table = users_table();
        table.indexes.push(Index {
            name: "idx_flags".to_string(),
            columns: vec!["flags".to_string()],
            is_unique: false,
        });
        table.indexes.push(Index {
            name: "uniq_active_flags".to_string(),
            columns: vec!["active".to_string(), "flags".to_string()],
            is_unique: true,
        });

        let stmts = index_ddl(&table);
        assert_eq!(
            stmts[0],
            "ALTER TABLE \"users\" ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\");"
        );
        assert_eq!(stmts[1], "DROP INDEX IF EXISTS \"users_flags_idx\";");
        assert_eq!(
            stmts[2],
            "CREATE INDEX \"users_flags_idx\" ON \"users\" (\"flags\");"
        );
        assert_eq!(
            stmts[4],
            "CREATE UNIQUE INDEX \"users_active_flags_idx\" ON \"users\" (\"active\", \"flags\");"
        );
    }

    #[test]
    fn test_constraint_ddl() {
        let mut table = make_table("orders", vec![make_column("user_id", "int(11)", 1)]);
        table.foreign_keys.push(ForeignKey {
            name: "fk_user".to_string(),
            columns: vec!["user_id".to_string()],
            ref_table: "users".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: Some("CASCADE".to_string()),
            on_update: Some("NO ACTION".to_string()),
        });

        let stmts = constraint_ddl(&table);
        assert_eq!(
            stmts[0],
            "ALTER TABLE \"orders\" ADD FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE;"
        );
    }

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
