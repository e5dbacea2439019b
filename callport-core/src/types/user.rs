use super::{NativeType, Value};
use regex::Regex;
use std::fmt::Debug;
use std::sync::Arc;

type Converter = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// A named scalar carried on the wire as a native base type.
///
/// `to_base` turns a native value of this type into its base representation, and
/// `from_base` goes the other way (validating on the way in). For every valid `x`,
/// `from_base(to_base(x)) == x`.
#[derive(Clone)]
pub struct UserType {
    name: String,
    base: NativeType,
    to_base: Converter,
    from_base: Converter,
}

impl UserType {
    pub fn new(
        name: impl Into<String>,
        base: NativeType,
        to_base: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
        from_base: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            base,
            to_base: Arc::new(to_base),
            from_base: Arc::new(from_base),
        }
    }

    /// An enumeration: only the listed base values are accepted, in both directions.
    pub fn enumeration<I, V>(name: impl Into<String>, base: NativeType, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Arc<Vec<Value>> = Arc::new(values.into_iter().map(Into::into).collect());
        let check = {
            let values = Arc::clone(&values);
            move |value: Value| {
                if value.is_null() || values.contains(&value) {
                    Ok(value)
                } else {
                    let allowed: Vec<String> = values.iter().map(ToString::to_string).collect();
                    Err(format!(
                        "Value should be one of: {}",
                        allowed.join(", ")
                    ))
                }
            }
        };
        Self::new(name, base, check.clone(), check)
    }

    /// Text constrained by length bounds and an optional regular expression.
    pub fn string(
        name: impl Into<String>,
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<&str>,
    ) -> Result<Self, regex::Error> {
        let pattern = pattern.map(Regex::new).transpose()?;
        let check = move |value: Value| {
            let Value::Text(text) = &value else {
                return Ok(value);
            };
            let length = text.chars().count();
            if let Some(min) = min_length {
                if length < min {
                    return Err(format!(
                        "Value should have a minimum character requirement of {min}"
                    ));
                }
            }
            if let Some(max) = max_length {
                if length > max {
                    return Err(format!(
                        "Value should have a maximum character requirement of {max}"
                    ));
                }
            }
            if let Some(pattern) = &pattern {
                if !pattern.is_match(text) {
                    return Err(format!("Value should match the pattern {}", pattern.as_str()));
                }
            }
            Ok(value)
        };
        Ok(Self::new(name, NativeType::Text, Ok, check))
    }

    /// Integers constrained by inclusive bounds.
    pub fn integer(name: impl Into<String>, minimum: Option<i64>, maximum: Option<i64>) -> Self {
        let check = move |value: Value| {
            let Value::Int(i) = value else {
                return Ok(value);
            };
            if let Some(min) = minimum {
                if i < min {
                    return Err(format!("Value should be greater or equal to {min}"));
                }
            }
            if let Some(max) = maximum {
                if i > max {
                    return Err(format!("Value should be lower or equal to {max}"));
                }
            }
            Ok(value)
        };
        Self::new(name, NativeType::Integer, Ok, check)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> NativeType {
        self.base
    }

    pub fn to_base(&self, value: Value) -> Result<Value, String> {
        (self.to_base)(value)
    }

    pub fn from_base(&self, value: Value) -> Result<Value, String> {
        (self.from_base)(value)
    }
}

impl Debug for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserType")
            .field("name", &self.name)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_rejects_unknown_values() {
        let color = UserType::enumeration("Color", NativeType::Text, ["red", "green"]);

        assert_eq!(color.from_base(Value::from("red")), Ok(Value::from("red")));
        assert_eq!(
            color.from_base(Value::from("blue")),
            Err("Value should be one of: red, green".to_string())
        );
    }

    #[test]
    fn constrained_string() {
        let code = UserType::string("Code", Some(2), Some(4), Some("^[A-Z]+$")).unwrap();

        assert!(code.from_base(Value::from("ABC")).is_ok());
        assert!(code.from_base(Value::from("A")).is_err());
        assert!(code.from_base(Value::from("ABCDE")).is_err());
        assert!(code.from_base(Value::from("abc")).is_err());
    }

    #[test]
    fn constrained_integer() {
        let percent = UserType::integer("Percent", Some(0), Some(100));

        assert_eq!(percent.from_base(Value::Int(42)), Ok(Value::Int(42)));
        assert!(percent.from_base(Value::Int(101)).is_err());
        assert!(percent.from_base(Value::Int(-1)).is_err());
    }

    #[test]
    fn conversions_round_trip() {
        let celsius = UserType::new(
            "Celsius",
            NativeType::Float,
            |value| match value {
                Value::Float(c) => Ok(Value::Float(c * 10.0)),
                other => Ok(other),
            },
            |value| match value {
                Value::Float(d) => Ok(Value::Float(d / 10.0)),
                other => Ok(other),
            },
        );

        let base = celsius.to_base(Value::Float(21.5)).unwrap();
        assert_eq!(base, Value::Float(215.0));
        assert_eq!(celsius.from_base(base), Ok(Value::Float(21.5)));
    }
}
