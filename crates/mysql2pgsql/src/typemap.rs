//! MySQL to PostgreSQL type mapping.
//!
//! The source vocabulary is a closed enum parsed from the raw column
//! declaration (`COLUMN_TYPE`, e.g. `int(10) unsigned` or `enum('a','b')`).
//! Declarations outside the vocabulary are a hard error naming the table,
//! column and offending type, never a silent passthrough.

use crate::error::{MigrateError, Result};
use crate::schema::Column;
use crate::value::ValueKind;

/// Parsed MySQL column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceType {
    TinyInt { unsigned: bool, width: Option<u16> },
    SmallInt { unsigned: bool },
    MediumInt { unsigned: bool },
    Int { unsigned: bool },
    BigInt { unsigned: bool },
    Decimal { precision: u32, scale: u32 },
    Float,
    Double,
    Bit { bits: u16 },
    Char { len: u32 },
    VarChar { len: u32 },
    TinyText,
    Text,
    MediumText,
    LongText,
    Binary { len: u32 },
    VarBinary { len: u32 },
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    Date,
    Time,
    DateTime,
    Timestamp,
    Year,
    Enum { labels: Vec<String> },
    Set { labels: Vec<String> },
    Json,
}

impl SourceType {
    /// Parse a raw MySQL column declaration. Returns None for anything
    /// outside the supported vocabulary.
    pub fn parse(decl: &str) -> Option<SourceType> {
        let decl = decl.trim();
        let (base, args, rest) = split_declaration(decl);
        let base = base.to_ascii_lowercase();
        let unsigned = rest.to_ascii_lowercase().contains("unsigned");

        match base.as_str() {
            "tinyint" => Some(SourceType::TinyInt {
                unsigned,
                width: args.and_then(|a| a.trim().parse().ok()),
            }),
            "bool" | "boolean" => Some(SourceType::TinyInt {
                unsigned: false,
                width: Some(1),
            }),
            "smallint" => Some(SourceType::SmallInt { unsigned }),
            "mediumint" => Some(SourceType::MediumInt { unsigned }),
            "int" | "integer" => Some(SourceType::Int { unsigned }),
            "bigint" => Some(SourceType::BigInt { unsigned }),
            "decimal" | "numeric" => {
                let (precision, scale) = match args {
                    Some(a) => {
                        let mut parts = a.splitn(2, ',');
                        let p = parts.next()?.trim().parse().ok()?;
                        let s = match parts.next() {
                            Some(s) => s.trim().parse().ok()?,
                            None => 0,
                        };
                        (p, s)
                    }
                    None => (10, 0),
                };
                Some(SourceType::Decimal { precision, scale })
            }
            "float" => Some(SourceType::Float),
            "double" | "real" => Some(SourceType::Double),
            "bit" => Some(SourceType::Bit {
                bits: args.and_then(|a| a.trim().parse().ok()).unwrap_or(1),
            }),
            "char" => Some(SourceType::Char {
                len: args.and_then(|a| a.trim().parse().ok()).unwrap_or(1),
            }),
            "varchar" => Some(SourceType::VarChar {
                len: args.and_then(|a| a.trim().parse().ok())?,
            }),
            "tinytext" => Some(SourceType::TinyText),
            "text" => Some(SourceType::Text),
            "mediumtext" => Some(SourceType::MediumText),
            "longtext" => Some(SourceType::LongText),
            "binary" => Some(SourceType::Binary {
                len: args.and_then(|a| a.trim().parse().ok()).unwrap_or(1),
            }),
            "varbinary" => Some(SourceType::VarBinary {
                len: args.and_then(|a| a.trim().parse().ok())?,
            }),
            "tinyblob" => Some(SourceType::TinyBlob),
            "blob" => Some(SourceType::Blob),
            "mediumblob" => Some(SourceType::MediumBlob),
            "longblob" => Some(SourceType::LongBlob),
            "date" => Some(SourceType::Date),
            "time" => Some(SourceType::Time),
            "datetime" => Some(SourceType::DateTime),
            "timestamp" => Some(SourceType::Timestamp),
            "year" => Some(SourceType::Year),
            "enum" => Some(SourceType::Enum {
                labels: parse_labels(args?),
            }),
            "set" => Some(SourceType::Set {
                labels: parse_labels(args?),
            }),
            "json" => Some(SourceType::Json),
            _ => None,
        }
    }

    /// Whether the mapped value is boolean (tinyint(1) or bit(1)).
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            SourceType::TinyInt {
                unsigned: false,
                width: Some(1)
            } | SourceType::Bit { bits: 1 }
        )
    }
}

/// Split `base(args) rest` into its three pieces.
fn split_declaration(decl: &str) -> (&str, Option<&str>, &str) {
    match decl.find('(') {
        Some(open) => {
            let base = decl[..open].trim();
            match decl.rfind(')') {
                Some(close) if close > open => {
                    (base, Some(&decl[open + 1..close]), decl[close + 1..].trim())
                }
                _ => (base, None, ""),
            }
        }
        None => match decl.find(' ') {
            Some(space) => (&decl[..space], None, decl[space + 1..].trim()),
            None => (decl, None, ""),
        },
    }
}

/// Parse enum/set labels: `'a','b','it''s'` with doubled-quote unescaping.
fn parse_labels(args: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut chars = args.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut label = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    label.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                label.push(c);
            }
        }
        labels.push(label);
    }
    labels
}

/// A column mapped to its PostgreSQL shape.
#[derive(Debug, Clone)]
pub struct MappedColumn {
    /// Column name (unchanged).
    pub name: String,
    /// Target type, e.g. `character varying(255)`.
    pub pg_type: String,
    /// Translated DEFAULT clause body, already quoted where needed.
    pub default: Option<String>,
    /// Whether NOT NULL applies.
    pub not_null: bool,
    /// Whether the column is serial (auto-increment on the source).
    pub identity: bool,
    /// How to decode and transform row values for this column.
    pub kind: ValueKind,
    /// Degradation note, e.g. a default that could not be carried over.
    pub warning: Option<String>,
}

/// Map a source column to its PostgreSQL counterpart.
pub fn map_column(table: &str, col: &Column) -> Result<MappedColumn> {
    let source = SourceType::parse(&col.column_type).ok_or_else(|| {
        MigrateError::unsupported_type(table, &col.name, &col.column_type)
    })?;

    let (pg_type, kind) = target_type(&source);

    let mut warning = None;
    let default = if col.is_auto_increment {
        Some(format!(
            "nextval({}::regclass)",
            quote_literal(&format!("\"{}_{}_seq\"", table, col.name))
        ))
    } else {
        match &col.default {
            Some(raw) => {
                let (translated, warn) = translate_default(&source, raw);
                if let Some(w) = warn {
                    warning = Some(format!("column {}.{}: {}", table, col.name, w));
                }
                translated
            }
            None => None,
        }
    };

    Ok(MappedColumn {
        name: col.name.clone(),
        pg_type,
        default,
        not_null: col.is_auto_increment || !col.is_nullable,
        identity: col.is_auto_increment,
        kind,
        warning,
    })
}

/// Target type name and value kind for a parsed source type.
fn target_type(source: &SourceType) -> (String, ValueKind) {
    match source {
        SourceType::TinyInt {
            unsigned: false,
            width: Some(1),
        } => ("boolean".into(), ValueKind::Bool),
        SourceType::TinyInt { unsigned: true, .. } => ("smallint".into(), ValueKind::U8),
        SourceType::TinyInt { .. } => ("smallint".into(), ValueKind::I8),
        SourceType::SmallInt { unsigned: false } => ("smallint".into(), ValueKind::I16),
        SourceType::SmallInt { unsigned: true } => ("integer".into(), ValueKind::U16),
        SourceType::MediumInt { unsigned: false } => ("integer".into(), ValueKind::I32),
        SourceType::MediumInt { unsigned: true } => ("integer".into(), ValueKind::U32),
        SourceType::Int { unsigned: false } => ("integer".into(), ValueKind::I32),
        SourceType::Int { unsigned: true } => ("bigint".into(), ValueKind::U32),
        SourceType::BigInt { unsigned: false } => ("bigint".into(), ValueKind::I64),
        SourceType::BigInt { unsigned: true } => ("numeric(20, 0)".into(), ValueKind::U64),
        SourceType::Decimal { precision, scale } => (
            format!("numeric({}, {})", precision, scale),
            ValueKind::Decimal,
        ),
        SourceType::Float => ("real".into(), ValueKind::F32),
        SourceType::Double => ("double precision".into(), ValueKind::F64),
        SourceType::Bit { bits: 1 } => ("boolean".into(), ValueKind::BitBool),
        SourceType::Bit { bits } => (format!("bit varying({})", bits), ValueKind::Bits(*bits)),
        SourceType::Char { len } => (format!("character({})", len), ValueKind::Text),
        SourceType::VarChar { len } => {
            (format!("character varying({})", len), ValueKind::Text)
        }
        SourceType::TinyText
        | SourceType::Text
        | SourceType::MediumText
        | SourceType::LongText => ("text".into(), ValueKind::Text),
        SourceType::Binary { .. }
        | SourceType::VarBinary { .. }
        | SourceType::TinyBlob
        | SourceType::Blob
        | SourceType::MediumBlob
        | SourceType::LongBlob => ("bytea".into(), ValueKind::Bytes),
        SourceType::Date => ("date".into(), ValueKind::Date),
        SourceType::Time => ("time without time zone".into(), ValueKind::Time),
        SourceType::DateTime => {
            ("timestamp without time zone".into(), ValueKind::DateTime)
        }
        SourceType::Timestamp => (
            "timestamp without time zone".into(),
            ValueKind::TimestampUtc,
        ),
        SourceType::Year => ("smallint".into(), ValueKind::U16),
        SourceType::Enum { .. } | SourceType::Set { .. } => ("text".into(), ValueKind::Text),
        SourceType::Json => ("jsonb".into(), ValueKind::Text),
    }
}

/// Translate a MySQL default literal to a PostgreSQL DEFAULT clause body.
/// Returns the translated body (or None when the default cannot be carried
/// over) plus an optional degradation warning.
fn translate_default(source: &SourceType, raw: &str) -> (Option<String>, Option<String>) {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("null") {
        return (None, None);
    }

    if source.is_boolean() {
        return match raw {
            "1" | "b'1'" => (Some("true".into()), None),
            "0" | "b'0'" | "" => (Some("false".into()), None),
            other => (
                None,
                Some(format!("dropped untranslatable boolean default '{}'", other)),
            ),
        };
    }

    match source {
        SourceType::TinyInt { .. }
        | SourceType::SmallInt { .. }
        | SourceType::MediumInt { .. }
        | SourceType::Int { .. }
        | SourceType::BigInt { .. }
        | SourceType::Decimal { .. }
        | SourceType::Float
        | SourceType::Double
        | SourceType::Year => {
            if raw.parse::<f64>().is_ok() {
                (Some(raw.to_string()), None)
            } else {
                (
                    None,
                    Some(format!("dropped non-numeric default '{}'", raw)),
                )
            }
        }
        SourceType::Bit { .. } => {
            let body = raw.trim_start_matches("b'").trim_end_matches('\'');
            if !body.is_empty() && body.chars().all(|c| c == '0' || c == '1') {
                (Some(format!("B'{}'", body)), None)
            } else {
                (None, Some(format!("dropped untranslatable bit default '{}'", raw)))
            }
        }
        SourceType::DateTime | SourceType::Timestamp => {
            if raw.eq_ignore_ascii_case("current_timestamp")
                || raw.eq_ignore_ascii_case("current_timestamp()")
                || raw.eq_ignore_ascii_case("now()")
            {
                (Some("CURRENT_TIMESTAMP".into()), None)
            } else if raw.starts_with("0000-00-00") {
                // MySQL zero-dates have no PostgreSQL representation
                (Some("'1970-01-01 00:00:00'".into()), None)
            } else {
                (Some(quote_literal(raw)), None)
            }
        }
        SourceType::Date => {
            if raw == "0000-00-00" {
                (Some("'1970-01-01'".into()), None)
            } else {
                (Some(quote_literal(raw)), None)
            }
        }
        SourceType::Time => (Some(quote_literal(raw)), None),
        SourceType::Binary { .. }
        | SourceType::VarBinary { .. }
        | SourceType::TinyBlob
        | SourceType::Blob
        | SourceType::MediumBlob
        | SourceType::LongBlob => (
            None,
            Some("dropped binary default".to_string()),
        ),
        SourceType::Char { .. }
        | SourceType::VarChar { .. }
        | SourceType::TinyText
        | SourceType::Text
        | SourceType::MediumText
        | SourceType::LongText
        | SourceType::Enum { .. }
        | SourceType::Set { .. }
        | SourceType::Json => (Some(quote_literal(raw)), None),
    }
}

/// Single-quote a literal, doubling embedded quotes.
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
