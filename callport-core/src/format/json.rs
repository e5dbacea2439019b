//! # JSON Format
//!
//! Converts between native [`Value`]s and `serde_json::Value` trees, driven by the Type
//! Model node the value belongs to.
//!
//! ## How it works
//!
//! 1. **Encoding (native -> JSON)**:
//!    - Integers, floats and booleans become JSON numbers and booleans.
//!    - Decimals, dates, times, datetimes and binary blobs become strings (ISO-8601 and
//!      base64 forms).
//!    - User types are converted to their base type first.
//!    - Structured values become objects with one member per attribute that is not
//!      [`Value::Unset`]. Unset attributes are omitted, not written as `null`.
//!
//! 2. **Decoding (JSON -> native)**:
//!    - Every member of an object must name an attribute, otherwise the decode fails with
//!      an unknown attribute error that records the path to the offending object.
//!    - Mandatory attributes must be present, read-only ones must not.
//!    - The validation hook of the structured type runs last.
use super::DataFormat;
use super::scalar;
use crate::error::{CallError, ClientError, EncodeError, Fault};
use crate::function::{Arguments, FunctionDefinition};
use crate::registry::TypeRegistry;
use crate::types::{DataType, NativeType, Record, Value};
use rust_decimal::Decimal;
use serde_json::{Map, Number, json};
use std::str::FromStr;

/// The `application/json` data format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl DataFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn accept_content_types(&self) -> &'static [&'static str] {
        &["application/json", "text/javascript", "application/javascript"]
    }

    fn parse_arguments(
        &self,
        registry: &TypeRegistry,
        funcdef: &FunctionDefinition,
        body: &[u8],
    ) -> Result<Arguments, CallError> {
        let json: serde_json::Value = serde_json::from_slice(body).map_err(|_| {
            ClientError::BadRequest("Request is not in valid JSON format".to_string())
        })?;

        let mut arguments = Arguments::new();

        if let Some(arg) = funcdef.body_arg() {
            let value =
                from_json(registry, &arg.datatype, &json).map_err(|e| e.with_fieldname(&arg.name))?;
            arguments.insert(arg.name.clone(), value);
            return Ok(arguments);
        }

        let serde_json::Value::Object(members) = json else {
            return Err(ClientError::BadRequest(
                "Request body must be a JSON object of arguments".to_string(),
            )
            .into());
        };

        let mut unknown = Vec::new();
        for (name, member) in &members {
            let Some(arg) = funcdef.get_arg(name) else {
                unknown.push(name.clone());
                continue;
            };
            let value = from_json(registry, &arg.datatype, member)
                .map_err(|e| e.with_fieldname(name))?;
            arguments.insert(name.clone(), value);
        }
        if !unknown.is_empty() && !funcdef.ignore_extra_args {
            return Err(ClientError::UnknownArgument(unknown).into());
        }

        Ok(arguments)
    }

    fn encode_result(
        &self,
        registry: &TypeRegistry,
        datatype: &DataType,
        value: &Value,
        nest: bool,
    ) -> Result<Vec<u8>, CallError> {
        let mut json = to_json(registry, datatype, value)?;
        if nest {
            json = json!({ "result": json });
        }
        Ok(json.to_string().into_bytes())
    }

    fn encode_error(&self, fault: &Fault) -> Vec<u8> {
        json!({
            "faultcode": fault.faultcode.as_str(),
            "faultstring": fault.faultstring,
            "debuginfo": fault.debuginfo,
        })
        .to_string()
        .into_bytes()
    }
}

/// Encodes a native value of `datatype` as JSON.
pub fn to_json(
    registry: &TypeRegistry,
    datatype: &DataType,
    value: &Value,
) -> Result<serde_json::Value, CallError> {
    if value.is_unset() || value.is_null() {
        return Ok(serde_json::Value::Null);
    }

    let mismatch = || EncodeError::Mismatch {
        expected: registry.type_name(datatype),
        found: value.kind(),
    };

    match datatype {
        DataType::Native(native) => native_to_json(*native, value),
        DataType::User(id) => {
            let user_type = registry.user_type(*id)?;
            let base = user_type
                .to_base(value.clone())
                .map_err(|reason| EncodeError::UserType {
                    name: user_type.name().to_string(),
                    reason,
                })?;
            to_json(registry, &DataType::Native(user_type.base()), &base)
        }
        DataType::Array(item) => {
            let Value::Array(items) = value else {
                return Err(mismatch().into());
            };
            items
                .iter()
                .map(|v| to_json(registry, item, v))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array)
        }
        DataType::Map(key_type, value_type) => {
            let Value::Map(entries) = value else {
                return Err(mismatch().into());
            };
            let mut members = Map::new();
            for (key, entry) in entries {
                members.insert(
                    scalar::to_text(registry, key_type, key)?,
                    to_json(registry, value_type, entry)?,
                );
            }
            Ok(serde_json::Value::Object(members))
        }
        DataType::Struct(id) => {
            let Value::Struct(record) = value else {
                return Err(mismatch().into());
            };
            let struct_type = registry.struct_type(*id)?;
            let mut members = Map::new();
            for attr in struct_type.attributes() {
                let field = attr.read(record);
                if field.is_unset() {
                    continue;
                }
                members.insert(
                    attr.name().to_string(),
                    to_json(registry, attr.datatype(), &field)?,
                );
            }
            Ok(serde_json::Value::Object(members))
        }
    }
}

fn native_to_json(native: NativeType, value: &Value) -> Result<serde_json::Value, CallError> {
    match (native, value) {
        (NativeType::Integer, Value::Int(i)) | (NativeType::Float, Value::Int(i)) => Ok(json!(i)),
        (NativeType::Float, Value::Float(x)) => Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .ok_or_else(|| EncodeError::NonFiniteFloat(x.to_string()).into()),
        (NativeType::Boolean, Value::Bool(b)) => Ok(json!(b)),
        _ => Ok(serde_json::Value::String(scalar::format_text(native, value)?)),
    }
}

/// Decodes a JSON value as `datatype`.
///
/// Errors name no field at this level; enclosing members add theirs as the error
/// propagates outwards.
pub fn from_json(
    registry: &TypeRegistry,
    datatype: &DataType,
    json: &serde_json::Value,
) -> Result<Value, CallError> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    match datatype {
        DataType::Native(native) => native_from_json(*native, json),
        DataType::User(id) => {
            let user_type = registry.user_type(*id)?;
            let base = native_from_json(user_type.base(), json)?;
            user_type
                .from_base(base)
                .map_err(|reason| CallError::invalid_input("", display(json), reason))
        }
        DataType::Array(item) => {
            let serde_json::Value::Array(items) = json else {
                return Err(CallError::invalid_input("", display(json), "Expected an array"));
            };
            items
                .iter()
                .map(|v| from_json(registry, item, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        DataType::Map(key_type, value_type) => {
            let serde_json::Value::Object(members) = json else {
                return Err(CallError::invalid_input("", display(json), "Expected an object"));
            };
            let mut entries = Vec::with_capacity(members.len());
            for (key, member) in members {
                let entry_key = scalar::from_text(registry, key_type, key)
                    .map_err(|e| e.in_field(key))?;
                let entry_value =
                    from_json(registry, value_type, member).map_err(|e| e.with_fieldname(key))?;
                entries.push((entry_key, entry_value));
            }
            Ok(Value::map_from(entries))
        }
        DataType::Struct(id) => {
            let serde_json::Value::Object(members) = json else {
                return Err(CallError::invalid_input("", display(json), "Expected an object"));
            };
            let struct_type = registry.struct_type(*id)?;

            let unknown: Vec<String> = members
                .keys()
                .filter(|name| struct_type.attribute(name).is_none())
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ClientError::UnknownAttribute {
                    fieldpath: Vec::new(),
                    attributes: unknown,
                }
                .into());
            }

            let mut record = Record::new();
            for attr in struct_type.attributes() {
                let Some(member) = members.get(attr.name()) else {
                    if attr.is_mandatory() {
                        return Err(CallError::invalid_input(
                            attr.name(),
                            "",
                            "Mandatory field missing.",
                        ));
                    }
                    continue;
                };
                if attr.is_readonly() {
                    return Err(CallError::invalid_input(
                        attr.name(),
                        display(member),
                        "Cannot set read only field.",
                    ));
                }
                let value = from_json(registry, attr.datatype(), member)
                    .map_err(|e| e.with_fieldname(attr.name()))?;
                attr.write(&mut record, value).map_err(|reason| {
                    CallError::invalid_input(attr.name(), display(member), reason)
                })?;
            }

            struct_type
                .validate(Value::Struct(record))
                .map_err(|reason| CallError::invalid_input("", display(json), reason))
        }
    }
}

fn native_from_json(native: NativeType, json: &serde_json::Value) -> Result<Value, CallError> {
    let invalid = |reason: &str| CallError::invalid_input("", display(json), reason);

    match (native, json) {
        (NativeType::Integer, serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|x| x.fract() == 0.0 && x.abs() < i64::MAX as f64)
                    .map(|x| x as i64)
            })
            .map(Value::Int)
            .ok_or_else(|| invalid("Expected an integer")),
        (NativeType::Float, serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| invalid("Expected a number")),
        (NativeType::Boolean, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
        (NativeType::Boolean, serde_json::Value::Number(n)) => match n.as_i64() {
            Some(1) => Ok(Value::Bool(true)),
            Some(0) => Ok(Value::Bool(false)),
            _ => Err(invalid("Expected a boolean")),
        },
        (NativeType::Decimal, serde_json::Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Value::Decimal)
            .map_err(|_| invalid("Expected a decimal number")),
        (_, serde_json::Value::String(text)) => {
            scalar::parse_text(native, text).map_err(|reason| invalid(&reason))
        }
        (NativeType::Text | NativeType::Bytes, _) => Err(invalid("Expected a string")),
        (_, _) => Err(invalid(&format!("Expected a value of type '{}'", native.name()))),
    }
}

/// Text shown as the offending value in input errors.
fn display(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
