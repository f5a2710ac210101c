//! Schema metadata extracted from the source database.

use serde::{Deserialize, Serialize};

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
    /// Secondary indexes (primary key excluded).
    pub indexes: Vec<Index>,
    /// Outgoing foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The auto-increment column, if the table has one.
    pub fn auto_increment_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_auto_increment)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Raw MySQL declaration, e.g. `int(10) unsigned` or `enum('a','b')`.
    pub column_type: String,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Default literal as reported by the catalog.
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
    /// Whether the column is AUTO_INCREMENT.
    pub is_auto_increment: bool,
    /// 1-based ordinal position.
    pub ordinal_pos: i32,
    /// Observed MAX() of an auto-increment column, used to seed the
    /// target sequence. None when the table is empty or not serial.
    pub max_value: Option<i64>,
}

/// Secondary index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name on the source side.
    pub name: String,
    /// Member columns in index order.
    pub columns: Vec<String>,
    /// Whether the index is UNIQUE.
    pub is_unique: bool,
}

/// Foreign key metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name on the source side.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub ref_table: String,
    /// Referenced columns.
    pub ref_columns: Vec<String>,
    /// ON DELETE action (RESTRICT, CASCADE, SET NULL, NO ACTION).
    pub on_delete: Option<String>,
    /// ON UPDATE action.
    pub on_update: Option<String>,
}
