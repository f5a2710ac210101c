//! Row values and their PostgreSQL COPY text encoding.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// An owned SQL value after source-side decoding and transform.
///
/// By the time a value lands here it is already in target shape: booleans
/// are booleans, SET members are comma-joined text, BIT(n) is a binary
/// digit string. Encoding to COPY text is the only step left.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Encode for the COPY text protocol. NULL is `\N`; embedded
    /// backslash, tab, newline and carriage return are escaped; NUL
    /// bytes are stripped since PostgreSQL text cannot hold them.
    pub fn to_copy_field(&self) -> String {
        match self {
            SqlValue::Null => "\\N".to_string(),
            SqlValue::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(s) => escape_copy_text(s),
            SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
            SqlValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            SqlValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        }
    }
}

/// Escape a text value for COPY.
pub fn escape_copy_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Render a packed MySQL BIT value as a binary digit string of exactly
/// `width` characters, as `bit varying` input expects. MySQL packs bits
/// big-endian into the minimum number of bytes.
pub fn bits_to_string(bytes: &[u8], width: u16) -> String {
    let width = width as usize;
    let mut digits = String::with_capacity(bytes.len() * 8);
    for byte in bytes {
        for shift in (0..8).rev() {
            digits.push(if byte >> shift & 1 == 1 { '1' } else { '0' });
        }
    }
    if digits.len() >= width {
        digits.split_off(digits.len() - width)
    } else {
        // Source value narrower than the declared width; left-pad.
        let mut padded = "0".repeat(width - digits.len());
        padded.push_str(&digits);
        padded
    }
}

/// How to decode and transform a source column's values.
///
/// One kind per mapped column; `reader::decode_row` follows this list so
/// row width always equals column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// tinyint(1): decoded as i8, emitted as boolean.
    Bool,
    /// bit(1): decoded as packed bytes, emitted as boolean.
    BitBool,
    /// bit(n), n > 1: decoded as packed bytes, emitted as a digit string.
    Bits(u16),
    /// tinyint: i8 widened to smallint.
    I8,
    /// tinyint unsigned: u8 widened to smallint.
    U8,
    I16,
    /// smallint unsigned and year: u16 widened to integer.
    U16,
    /// mediumint and int.
    I32,
    /// mediumint unsigned and int unsigned: u32 widened to bigint.
    U32,
    I64,
    /// bigint unsigned: u64 carried as numeric.
    U64,
    F32,
    F64,
    Decimal,
    /// char, varchar, text family, enum, set, json.
    Text,
    /// binary, varbinary, blob family.
    Bytes,
    Date,
    Time,
    DateTime,
    /// timestamp: decoded as UTC, emitted as a naive UTC timestamp.
    TimestampUtc,
}

/// A batch of decoded rows from the source.
#[derive(Debug)]
pub struct Batch {
    pub rows: Vec<Vec<SqlValue>>,
    pub is_last: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_bool_encoding() {
        assert_eq!(SqlValue::Null.to_copy_field(), "\\N");
        assert_eq!(SqlValue::Bool(true).to_copy_field(), "t");
        assert_eq!(SqlValue::Bool(false).to_copy_field(), "f");
    }

    #[test]
    fn test_text_escaping() {
        let v = SqlValue::Text("a\tb\nc\\d\re\0f".to_string());
        assert_eq!(v.to_copy_field(), "a\\tb\\nc\\\\d\\ref");
    }

    #[test]
    fn test_bytes_hex_encoding() {
        let v = SqlValue::Bytes(vec![0xde, 0xad, 0x00, 0xef]);
        assert_eq!(v.to_copy_field(), "\\\\xdead00ef");
    }

    #[test]
    fn test_datetime_encoding() {
        let dt = NaiveDate::from_ymd_opt(2011, 4, 2)
            .unwrap()
            .and_hms_opt(13, 30, 5)
            .unwrap();
        assert_eq!(SqlValue::DateTime(dt).to_copy_field(), "2011-04-02 13:30:05");
        assert_eq!(
            SqlValue::Date(dt.date()).to_copy_field(),
            "2011-04-02"
        );
    }

    #[test]
    fn test_bits_to_string() {
        // bit(3) value 0b101, packed into one byte
        assert_eq!(bits_to_string(&[0b0000_0101], 3), "101");
        // bit(10) spanning two bytes
        assert_eq!(bits_to_string(&[0b0000_0010, 0b1000_0001], 10), "1010000001");
        // narrower payload than declared width gets left-padded
        assert_eq!(bits_to_string(&[0b0000_0001], 12), "000000000001");
    }

    #[test]
    fn test_set_text_passes_through() {
        assert_eq!(SqlValue::Text("a,c".to_string()).to_copy_field(), "a,c");
        assert_eq!(SqlValue::Text(String::new()).to_copy_field(), "");
    }
}
