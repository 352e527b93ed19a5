//! Result normalization: PostgreSQL rows to ordered JSON objects

use std::time::Duration;

use serde_json::{json, Value};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Decode, Postgres, Row as _, TypeInfo, ValueRef};

use crate::error::GatewayError;
use crate::types::{QueryOutput, Row};

/// Assemble the success payload. `row_count` is always `rows.len()`.
pub fn normalize(rows: Vec<Row>, elapsed: Duration) -> QueryOutput {
    QueryOutput {
        row_count: rows.len(),
        rows,
        execution_time_ms: elapsed.as_millis() as u64,
    }
}

/// Convert one driver row, preserving the engine's column order
pub fn pg_row_to_json(row: &PgRow) -> Result<Row, GatewayError> {
    let mut map = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        let raw = row
            .try_get_raw(column.ordinal())
            .map_err(|e| GatewayError::Internal(format!("Failed to read column '{}': {}", column.name(), e)))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_info = raw.type_info().into_owned();
            decode_value(raw, &type_info).map_err(|e| {
                GatewayError::Internal(format!(
                    "Failed to decode column '{}' of type {}: {}",
                    column.name(),
                    type_info.name(),
                    e
                ))
            })?
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

type DecodeResult = Result<Value, BoxDynError>;

fn decode<'r, T: Decode<'r, Postgres>>(raw: PgValueRef<'r>) -> Result<T, BoxDynError> {
    T::decode(raw)
}

fn decode_value(raw: PgValueRef<'_>, type_info: &PgTypeInfo) -> DecodeResult {
    match type_info.kind() {
        PgTypeKind::Domain(base) => return decode_value(raw, base),
        PgTypeKind::Enum(_) => return Ok(Value::String(decode::<String>(raw)?)),
        _ => {}
    }

    let value = match type_info.name() {
        "BOOL" => Value::Bool(decode(raw)?),
        "INT2" => json!(decode::<i16>(raw)?),
        "INT4" => json!(decode::<i32>(raw)?),
        "INT8" => json!(decode::<i64>(raw)?),
        "OID" => json!(decode::<Oid>(raw)?.0),
        "FLOAT4" => float_value(decode::<f32>(raw)? as f64),
        "FLOAT8" => float_value(decode::<f64>(raw)?),
        "NUMERIC" => numeric_value(raw)?,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            Value::String(decode(raw)?)
        }
        "JSON" | "JSONB" => decode::<Value>(raw)?,
        "UUID" => Value::String(decode::<Uuid>(raw)?.to_string()),
        "TIMESTAMPTZ" => Value::String(decode::<DateTime<Utc>>(raw)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(decode::<NaiveDateTime>(raw)?.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        "DATE" => Value::String(decode::<NaiveDate>(raw)?.to_string()),
        "TIME" => Value::String(decode::<NaiveTime>(raw)?.to_string()),
        "INTERVAL" => interval_value(&decode::<PgInterval>(raw)?),
        "BYTEA" => bytea_placeholder(decode::<Vec<u8>>(raw)?.len()),
        "VOID" => Value::Null,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => json!(decode::<Vec<Option<String>>>(raw)?),
        "INT2[]" => json!(decode::<Vec<Option<i16>>>(raw)?),
        "INT4[]" => json!(decode::<Vec<Option<i32>>>(raw)?),
        "INT8[]" => json!(decode::<Vec<Option<i64>>>(raw)?),
        "FLOAT4[]" => float_array(decode::<Vec<Option<f32>>>(raw)?.into_iter().map(|f| f.map(f64::from))),
        "FLOAT8[]" => float_array(decode::<Vec<Option<f64>>>(raw)?.into_iter()),
        "BOOL[]" => json!(decode::<Vec<Option<bool>>>(raw)?),
        "UUID[]" => Value::Array(
            decode::<Vec<Option<Uuid>>>(raw)?
                .into_iter()
                .map(|u| u.map_or(Value::Null, |u| Value::String(u.to_string())))
                .collect(),
        ),
        "NUMERIC[]" => Value::Array(
            decode::<Vec<Option<BigDecimal>>>(raw)?
                .into_iter()
                .map(|d| d.map_or(Value::Null, |d| Value::String(d.normalized().to_plain_string())))
                .collect(),
        ),
        "JSON[]" | "JSONB[]" => Value::Array(
            decode::<Vec<Option<Value>>>(raw)?
                .into_iter()
                .map(|v| v.unwrap_or(Value::Null))
                .collect(),
        ),
        other => unsupported(other),
    };
    Ok(value)
}

// Sign words of the binary NUMERIC header
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// NUMERIC as a string at the value's display scale: `12.50` stays `"12.50"`
fn numeric_value(raw: PgValueRef<'_>) -> DecodeResult {
    if raw.format() == PgValueFormat::Text {
        return Ok(Value::String(raw.as_str()?.to_string()));
    }

    let (sign, display_scale) = numeric_header(raw.as_bytes()?)?;
    if let Some(special) = numeric_special(sign) {
        return Ok(Value::String(special.to_string()));
    }

    let decimal = decode::<BigDecimal>(raw)?;
    Ok(Value::String(
        decimal.with_scale(i64::from(display_scale)).to_plain_string(),
    ))
}

/// `(sign, dscale)` from the `ndigits, weight, sign, dscale` header
fn numeric_header(bytes: &[u8]) -> Result<(u16, i16), BoxDynError> {
    match bytes {
        [_, _, _, _, s0, s1, d0, d1, ..] => Ok((
            u16::from_be_bytes([*s0, *s1]),
            i16::from_be_bytes([*d0, *d1]),
        )),
        _ => Err("NUMERIC value is shorter than its header".into()),
    }
}

fn numeric_special(sign: u16) -> Option<&'static str> {
    match sign {
        NUMERIC_NAN => Some("NaN"),
        NUMERIC_PINF => Some("Infinity"),
        NUMERIC_NINF => Some("-Infinity"),
        _ => None,
    }
}

/// NaN and infinities have no JSON form
fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn float_array(values: impl Iterator<Item = Option<f64>>) -> Value {
    Value::Array(values.map(|f| f.map_or(Value::Null, float_value)).collect())
}

fn interval_value(interval: &PgInterval) -> Value {
    json!({
        "months": interval.months,
        "days": interval.days,
        "microseconds": interval.microseconds,
    })
}

fn bytea_placeholder(len: usize) -> Value {
    Value::String(format!("<bytea {} bytes>", len))
}

fn unsupported(type_name: &str) -> Value {
    Value::String(format!("<unsupported type {}>", type_name))
}
