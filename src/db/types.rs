//! Row decoding into JSON objects.
//!
//! Column values are decoded in two phases:
//! 1. `categorize_type` classifies the column's declared type
//! 2. a decoder for that category pulls the value out of the row
//!
//! Decoders shared by every engine are generic over the sqlx row type; only
//! the engine-specific corners (unsigned integers, exact decimals, native
//! JSON) are written out per database.

use crate::models::{DatabaseType, Row};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Text,
}

/// Integer type names across engines, after `base_type_name`.
const INTEGER_TYPES: &[&str] = &[
    "tinyint",
    "smallint",
    "mediumint",
    "int",
    "integer",
    "bigint",
    "big int",
    "int2",
    "int4",
    "int8",
    "serial",
    "smallserial",
    "bigserial",
    "serial2",
    "serial4",
    "serial8",
];

/// Lowercased type name without its length and sign modifiers,
/// so `INT(11) UNSIGNED` reads as `int`.
fn base_type_name(type_name: &str) -> String {
    let lower = type_name.to_lowercase();
    let head = lower.split('(').next().unwrap_or_default();
    head.split_whitespace()
        .filter(|word| !matches!(*word, "unsigned" | "signed" | "zerofill"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = base_type_name(type_name);

    // Checked first: "numeric" would otherwise never be reached
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is a float
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if INTEGER_TYPES.contains(&lower.as_str()) {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // varchar, text, char, date, time, uuid, ...
    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Encode binary column data as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        decode_columns(self, DatabaseType::MySQL, |row, idx, category| match category {
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .map(JsonValue::from)
                .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from))
                .or_else(|| decode_common(row, idx, TypeCategory::Text)),
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|d| JsonValue::String(d.0)),
            TypeCategory::Json => get::<_, JsonValue>(row, idx),
            _ => decode_common(row, idx, category),
        })
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        decode_columns(self, DatabaseType::PostgreSQL, |row, idx, category| match category {
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .or_else(|| get::<_, i32>(row, idx).map(i64::from))
                .or_else(|| get::<_, i16>(row, idx).map(i64::from))
                .map(JsonValue::from)
                .or_else(|| decode_common(row, idx, TypeCategory::Text)),
            TypeCategory::Decimal => get::<_, RawDecimal>(row, idx).map(|d| JsonValue::String(d.0)),
            TypeCategory::Json => get::<_, JsonValue>(row, idx),
            _ => decode_common(row, idx, category),
        })
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        decode_columns(self, DatabaseType::SQLite, |row, idx, category| match category {
            TypeCategory::Integer => get::<_, i64>(row, idx).map(JsonValue::from),
            _ => decode_common(row, idx, category),
        })
    }
}

/// Walk the columns of a row, decoding each one with `decode`.
/// Undecodable values become `null`.
fn decode_columns<R, F>(row: &R, db: DatabaseType, decode: F) -> Row
where
    R: sqlx::Row,
    F: Fn(&R, usize, TypeCategory) -> Option<JsonValue>,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), db);
            let value = decode(row, idx, category).unwrap_or(JsonValue::Null);
            (col.name().to_string(), value)
        })
        .collect()
}

/// Decoders that read the same way on every engine.
fn decode_common<R>(row: &R, idx: usize, category: TypeCategory) -> Option<JsonValue>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    for<'r> Option<bool>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f32>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<Vec<u8>>: Decode<'r, R::Database> + Type<R::Database>,
{
    match category {
        TypeCategory::Boolean => get::<_, bool>(row, idx)
            .map(JsonValue::Bool)
            .or_else(|| get::<_, i64>(row, idx).map(|v| JsonValue::Bool(v != 0))),
        TypeCategory::Integer => get::<_, i64>(row, idx).map(JsonValue::from),
        TypeCategory::Float | TypeCategory::Decimal => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(float_value),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v)),
        TypeCategory::Json => get::<_, String>(row, idx)
            .map(|s| serde_json::from_str(&s).unwrap_or(JsonValue::String(s))),
        TypeCategory::Text => get::<_, String>(row, idx)
            .map(JsonValue::String)
            .or_else(|| get::<_, i64>(row, idx).map(JsonValue::from))
            .or_else(|| get::<_, f64>(row, idx).map(float_value))
            .or_else(|| get::<_, Vec<u8>>(row, idx).map(|v| encode_binary(&v))),
    }
}

/// Read a nullable column value; NULL and type mismatches both yield `None`.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    Option<T>: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT", DatabaseType::PostgreSQL), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("INTEGER", DatabaseType::SQLite), TypeCategory::Integer);
        assert_eq!(categorize_type("INT UNSIGNED", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("INT(11)", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8", DatabaseType::PostgreSQL), TypeCategory::Integer);
        assert_eq!(categorize_type("UNSIGNED BIG INT", DatabaseType::SQLite), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_int_lookalikes() {
        assert_eq!(categorize_type("TINYTEXT", DatabaseType::MySQL), TypeCategory::Text);
        assert_eq!(categorize_type("TINYBLOB", DatabaseType::MySQL), TypeCategory::Binary);
        assert_eq!(categorize_type("INTERVAL", DatabaseType::PostgreSQL), TypeCategory::Text);
        assert_eq!(categorize_type("POINT", DatabaseType::PostgreSQL), TypeCategory::Text);
        assert_eq!(categorize_type("POINT", DatabaseType::MySQL), TypeCategory::Text);
    }

    #[test]
    fn test_base_type_name() {
        assert_eq!(base_type_name("INT(11) UNSIGNED ZEROFILL"), "int");
        assert_eq!(base_type_name("DOUBLE PRECISION"), "double precision");
        assert_eq!(base_type_name("VARCHAR(255)"), "varchar");
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL", DatabaseType::MySQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", DatabaseType::PostgreSQL), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC", DatabaseType::SQLite), TypeCategory::Float);
    }

    #[test]
    fn test_categorize_type_other() {
        assert_eq!(categorize_type("BOOLEAN", DatabaseType::SQLite), TypeCategory::Boolean);
        assert_eq!(categorize_type("jsonb", DatabaseType::PostgreSQL), TypeCategory::Json);
        assert_eq!(categorize_type("BLOB", DatabaseType::SQLite), TypeCategory::Binary);
        assert_eq!(categorize_type("REAL", DatabaseType::SQLite), TypeCategory::Float);
        assert_eq!(categorize_type("VARCHAR", DatabaseType::MySQL), TypeCategory::Text);
        assert_eq!(categorize_type("NULL", DatabaseType::SQLite), TypeCategory::Text);
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(
            encode_binary(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
