//! Textual forms of scalar values, shared by the parameter binder, XML and map keys.
use crate::error::{CallError, EncodeError};
use crate::registry::TypeRegistry;
use crate::types::{DataType, NativeType, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const TRUE_TOKENS: [&str; 6] = ["true", "t", "yes", "y", "on", "1"];
const FALSE_TOKENS: [&str; 6] = ["false", "f", "no", "n", "off", "0"];

/// Parses a boolean token, case-insensitively.
pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if TRUE_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Some(true)
    } else if FALSE_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(text)) {
        Some(false)
    } else {
        None
    }
}

pub fn parse_date(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|_| "Expected an ISO-8601 date (YYYY-MM-DD)".to_string())
}

pub fn parse_time(text: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text.trim(), TIME_FORMAT)
        .map_err(|_| "Expected an ISO-8601 time (HH:MM:SS)".to_string())
}

pub fn parse_datetime(text: &str) -> Result<NaiveDateTime, String> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| "Expected an ISO-8601 datetime (YYYY-MM-DDTHH:MM:SS)".to_string())
}

/// Parses the textual form of a native scalar.
pub fn parse_text(native: NativeType, text: &str) -> Result<Value, String> {
    match native {
        NativeType::Text => Ok(Value::Text(text.to_string())),
        NativeType::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
        NativeType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| "Expected an integer".to_string()),
        NativeType::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| "Expected a number".to_string()),
        NativeType::Boolean => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| "Expected a boolean".to_string()),
        NativeType::Decimal => Decimal::from_str(text.trim())
            .map(Value::Decimal)
            .map_err(|_| "Expected a decimal number".to_string()),
        NativeType::Date => parse_date(text).map(Value::Date),
        NativeType::Time => parse_time(text).map(Value::Time),
        NativeType::DateTime => parse_datetime(text).map(Value::DateTime),
        NativeType::Binary => STANDARD
            .decode(text.trim())
            .map(Value::Binary)
            .map_err(|_| "Expected base64 encoded data".to_string()),
    }
}

/// Formats a native scalar value as text.
pub fn format_text(native: NativeType, value: &Value) -> Result<String, EncodeError> {
    let mismatch = || EncodeError::Mismatch {
        expected: native.name().to_string(),
        found: value.kind(),
    };
    match (native, value) {
        (NativeType::Text, Value::Text(s)) => Ok(s.clone()),
        (NativeType::Text, Value::Bytes(b)) | (NativeType::Bytes, Value::Bytes(b)) => {
            String::from_utf8(b.clone()).map_err(|_| EncodeError::InvalidUtf8)
        }
        (NativeType::Bytes, Value::Text(s)) => Ok(s.clone()),
        (NativeType::Integer, Value::Int(i)) => Ok(i.to_string()),
        (NativeType::Float, Value::Float(x)) => {
            if x.is_finite() {
                Ok(x.to_string())
            } else {
                Err(EncodeError::NonFiniteFloat(x.to_string()))
            }
        }
        (NativeType::Float, Value::Int(i)) => Ok(i.to_string()),
        (NativeType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
        (NativeType::Decimal, Value::Decimal(d)) => Ok(d.to_string()),
        (NativeType::Date, Value::Date(d)) => Ok(d.format(DATE_FORMAT).to_string()),
        (NativeType::Time, Value::Time(t)) => Ok(t.format(TIME_FORMAT).to_string()),
        (NativeType::DateTime, Value::DateTime(dt)) => Ok(dt.format(DATETIME_FORMAT).to_string()),
        (NativeType::Binary, Value::Binary(b) | Value::Bytes(b)) => Ok(STANDARD.encode(b)),
        _ => Err(mismatch()),
    }
}

/// Parses the textual form of a scalar data type (native or user type).
///
/// Errors are [`crate::error::ClientError::InvalidInput`] without a field name; callers
/// fill it in.
pub fn from_text(
    registry: &TypeRegistry,
    datatype: &DataType,
    text: &str,
) -> Result<Value, CallError> {
    match datatype {
        DataType::Native(native) => {
            parse_text(*native, text).map_err(|reason| CallError::invalid_input("", text, reason))
        }
        DataType::User(id) => {
            let user_type = registry.user_type(*id)?;
            let base = parse_text(user_type.base(), text)
                .map_err(|reason| CallError::invalid_input("", text, reason))?;
            user_type
                .from_base(base)
                .map_err(|reason| CallError::invalid_input("", text, reason))
        }
        other => Err(CallError::invalid_input(
            "",
            text,
            format!(
                "Cannot read a value of type '{}' from text",
                registry.type_name(other)
            ),
        )),
    }
}

/// Formats a scalar value (native or user type) as text.
pub fn to_text(
    registry: &TypeRegistry,
    datatype: &DataType,
    value: &Value,
) -> Result<String, CallError> {
    match datatype {
        DataType::Native(native) => Ok(format_text(*native, value)?),
        DataType::User(id) => {
            let user_type = registry.user_type(*id)?;
            let base = user_type
                .to_base(value.clone())
                .map_err(|reason| EncodeError::UserType {
                    name: user_type.name().to_string(),
                    reason,
                })?;
            Ok(format_text(user_type.base(), &base)?)
        }
        other => Err(EncodeError::Mismatch {
            expected: registry.type_name(other),
            found: value.kind(),
        }
        .into()),
    }
}
