//! # Argument Binder
//!
//! Rebuilds the argument values of a call from the untyped sources a request carries:
//!
//! * **Flat parameters** ([`Params`]): the query string and url-encoded form bodies. Nested
//!   values are addressed with paths: `person.name`, `tags[0]`, `counts[red]`,
//!   `people[1].address.city`.
//! * **The request body**, decoded by a [`DataFormat`].
//! * **Host arguments** ([`HostArguments`]): positional and keyword text values a host
//!   route extracted itself.
//!
//! Each source yields an [`Arguments`] map; [`combine`] merges them, [`check_arguments`]
//! enforces mandatory arguments and [`apply_defaults`] fills in declared defaults.
mod params;

pub use params::Params;

use crate::error::{CallError, ClientError};
use crate::format::DataFormat;
use crate::format::scalar;
use crate::function::{Arguments, FunctionDefinition};
use crate::registry::TypeRegistry;
use crate::types::{AttributeDescriptor, DataType, NativeType, Record, StructType, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// The parameter that carries a request body inside the query string.
pub const BODY_PARAM: &str = "__body__";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Positional and keyword arguments supplied in-process by a host route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostArguments {
    pub positional: Vec<String>,
    pub keyword: Vec<(String, String)>,
}

impl HostArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyword.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Converts a single textual value to a scalar.
///
/// An empty string reads as `Null` for every type whose base is not textual.
pub fn from_param(
    registry: &TypeRegistry,
    datatype: &DataType,
    text: &str,
) -> Result<Value, CallError> {
    if text.is_empty() && !is_textual(registry, datatype) {
        return Ok(Value::Null);
    }
    scalar::from_text(registry, datatype, text)
}

fn is_textual(registry: &TypeRegistry, datatype: &DataType) -> bool {
    match datatype {
        DataType::Native(native) => matches!(native, NativeType::Text | NativeType::Bytes),
        DataType::User(id) => registry
            .user_type(*id)
            .is_ok_and(|user| matches!(user.base(), NativeType::Text | NativeType::Bytes)),
        _ => false,
    }
}

/// Rebuilds a value of `datatype` from the parameters found under `path`.
///
/// Returns [`Value::Unset`] when no parameter addresses `path`.
pub fn from_params(
    registry: &TypeRegistry,
    datatype: &DataType,
    params: &Params,
    path: &str,
) -> Result<Value, CallError> {
    ParamsReader::new(registry, params).read(datatype, path)
}

/// Binds every declared argument from flat parameters.
///
/// Parameters that no argument consumed are reported as [`ClientError::UnknownArgument`]
/// unless the function ignores extra arguments.
pub fn args_from_params(
    registry: &TypeRegistry,
    funcdef: &FunctionDefinition,
    params: &Params,
) -> Result<Arguments, CallError> {
    let mut reader = ParamsReader::new(registry, params);
    let mut arguments = Arguments::new();

    for arg in &funcdef.arguments {
        let value = reader.read(&arg.datatype, &arg.name)?;
        if !value.is_unset() {
            arguments.insert(arg.name.clone(), value);
        }
    }

    let unknown: Vec<String> = params
        .keys()
        .into_iter()
        .filter(|key| *key != BODY_PARAM && !reader.hits.contains(*key))
        .map(str::to_string)
        .collect();
    if !unknown.is_empty() && !funcdef.ignore_extra_args {
        return Err(ClientError::UnknownArgument(unknown).into());
    }

    Ok(arguments)
}

/// Binds arguments from a request body.
///
/// An empty body or a url-encoded form (already merged into the parameters) binds
/// nothing. Otherwise the first data format accepting `mimetype` decodes it.
pub fn args_from_body(
    registry: &TypeRegistry,
    funcdef: &FunctionDefinition,
    body: &[u8],
    mimetype: Option<&str>,
    formats: &[Arc<dyn DataFormat>],
) -> Result<Arguments, CallError> {
    if body.is_empty() || mimetype == Some(FORM_CONTENT_TYPE) {
        return Ok(Arguments::new());
    }

    let mimetype = mimetype.unwrap_or_default();
    let format = formats
        .iter()
        .find(|format| format.accept_content_types().contains(&mimetype))
        .ok_or_else(|| ClientError::UnsupportedMediaType(mimetype.to_string()))?;

    format.parse_arguments(registry, funcdef, body)
}

/// Binds host supplied arguments, converting each text value through the scalar parser.
pub fn args_from_args(
    registry: &TypeRegistry,
    funcdef: &FunctionDefinition,
    host: &HostArguments,
) -> Result<Arguments, CallError> {
    let mut arguments = Arguments::new();

    if host.positional.len() > funcdef.arguments.len() {
        return Err(ClientError::BadRequest(format!(
            "{} takes at most {} arguments, {} given",
            funcdef.name,
            funcdef.arguments.len(),
            host.positional.len()
        ))
        .into());
    }

    for (arg, text) in funcdef.arguments.iter().zip(&host.positional) {
        let value = from_param(registry, &arg.datatype, text).map_err(|e| e.in_field(&arg.name))?;
        arguments.insert(arg.name.clone(), value);
    }

    let mut unknown = Vec::new();
    for (name, text) in &host.keyword {
        let Some(arg) = funcdef.get_arg(name) else {
            unknown.push(name.clone());
            continue;
        };
        if arguments.contains(name) {
            return Err(ClientError::SuppliedTwice(name.clone()).into());
        }
        let value = from_param(registry, &arg.datatype, text).map_err(|e| e.in_field(name))?;
        arguments.insert(name.clone(), value);
    }
    if !unknown.is_empty() && !funcdef.ignore_extra_args {
        return Err(ClientError::UnknownArgument(unknown).into());
    }

    Ok(arguments)
}

/// Merges argument sources left to right.
///
/// Without `allow_override`, an argument bound by two sources is rejected with
/// [`ClientError::SuppliedTwice`]; with it, later sources win.
pub fn combine<I>(sources: I, allow_override: bool) -> Result<Arguments, CallError>
where
    I: IntoIterator<Item = Arguments>,
{
    let mut combined = Arguments::new();
    for source in sources {
        for (name, value) in source {
            if !allow_override && combined.contains(&name) {
                return Err(ClientError::SuppliedTwice(name).into());
            }
            combined.insert(name, value);
        }
    }
    Ok(combined)
}

/// Checks the mandatory arguments.
///
/// An unbound one fails with [`ClientError::MissingArgument`], one explicitly bound to
/// `Null` with [`ClientError::InvalidInput`].
pub fn check_arguments(
    funcdef: &FunctionDefinition,
    arguments: &Arguments,
) -> Result<(), CallError> {
    for arg in funcdef.arguments.iter().filter(|arg| arg.mandatory) {
        match arguments.value(&arg.name) {
            None | Some(Value::Unset) => {
                return Err(ClientError::MissingArgument(arg.name.clone()).into());
            }
            Some(Value::Null) => {
                return Err(CallError::invalid_input(
                    &arg.name,
                    "",
                    "Mandatory argument cannot be null",
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Fills absent arguments with their declared defaults.
pub fn apply_defaults(funcdef: &FunctionDefinition, arguments: &mut Arguments) {
    for arg in &funcdef.arguments {
        if let Some(default) = &arg.default {
            if !arguments.contains(&arg.name) {
                arguments.insert(arg.name.clone(), default.clone());
            }
        }
    }
}

/// Walks the parameters for one binding pass, remembering which keys were consumed.
struct ParamsReader<'a> {
    registry: &'a TypeRegistry,
    params: &'a Params,
    hits: HashSet<String>,
}

impl<'a> ParamsReader<'a> {
    fn new(registry: &'a TypeRegistry, params: &'a Params) -> Self {
        Self {
            registry,
            params,
            hits: HashSet::new(),
        }
    }

    fn read(&mut self, datatype: &DataType, path: &str) -> Result<Value, CallError> {
        match datatype {
            DataType::Native(_) | DataType::User(_) => self.read_scalar(datatype, path),
            DataType::Array(item) => self.read_array(item, path),
            DataType::Map(key, value) => self.read_map(key, value, path),
            DataType::Struct(_) => self.read_struct(datatype, path),
        }
    }

    fn read_scalar(&mut self, datatype: &DataType, path: &str) -> Result<Value, CallError> {
        let Some(text) = self.params.last(path) else {
            return Ok(Value::Unset);
        };
        self.hits.insert(path.to_string());
        from_param(self.registry, datatype, text).map_err(|e| e.in_field(path))
    }

    fn read_array(&mut self, item: &DataType, path: &str) -> Result<Value, CallError> {
        let params = self.params;
        // Repeated exact key: one item per value.
        if params.contains_key(path) {
            self.hits.insert(path.to_string());
            let items = params
                .get_all(path)
                .into_iter()
                .map(|text| from_param(self.registry, item, text).map_err(|e| e.in_field(path)))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array(items));
        }

        if let DataType::Struct(_) = item {
            if let Some(items) = self.read_parallel_items(item, path)? {
                return Ok(Value::Array(items));
            }
        }

        let indexes: BTreeSet<usize> = params
            .keys()
            .into_iter()
            .filter_map(|key| bracketed_suffix(key, path))
            .filter_map(|index| index.parse().ok())
            .collect();
        if indexes.is_empty() {
            return Ok(Value::Unset);
        }

        let mut items = Vec::with_capacity(indexes.len());
        for index in indexes {
            let value = self.read(item, &format!("{path}[{index}]"))?;
            if !value.is_unset() {
                items.push(value);
            }
        }
        Ok(Value::Array(items))
    }

    /// `path.attr=a&path.attr=b` builds two structured items, one value per item.
    fn read_parallel_items(
        &mut self,
        item: &DataType,
        path: &str,
    ) -> Result<Option<Vec<Value>>, CallError> {
        let DataType::Struct(id) = item else {
            return Ok(None);
        };
        let params = self.params;
        let struct_type = self.registry.struct_type(*id)?;

        let columns: Vec<(usize, String, Vec<&str>)> = struct_type
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, attr)| attr.datatype().is_scalar())
            .map(|(i, attr)| {
                let key = format!("{path}.{}", attr.name());
                let values = params.get_all(&key);
                (i, key, values)
            })
            .filter(|(_, _, values)| !values.is_empty())
            .collect();
        let Some(count) = columns.iter().map(|(_, _, values)| values.len()).max() else {
            return Ok(None);
        };

        let mut items = Vec::with_capacity(count);
        for row in 0..count {
            let mut record = Record::new();
            for (i, key, values) in &columns {
                let Some(text) = values.get(row) else {
                    continue;
                };
                let attr = &struct_type.attributes()[*i];
                let value = from_param(self.registry, attr.datatype(), text)
                    .map_err(|e| e.in_field(key))?;
                self.write_attribute(attr, &mut record, value, key)?;
            }
            if let Some(missing) = struct_type
                .attributes()
                .iter()
                .find(|attr| attr.is_mandatory() && attr.read(&record).is_unset())
            {
                return Err(CallError::invalid_input(
                    format!("{path}.{}", missing.name()),
                    "",
                    "Mandatory field missing.",
                ));
            }
            items.push(self.finish_struct(struct_type, record, path)?);
        }
        for (_, key, _) in columns {
            self.hits.insert(key);
        }
        Ok(Some(items))
    }

    fn read_map(
        &mut self,
        key: &DataType,
        value: &DataType,
        path: &str,
    ) -> Result<Value, CallError> {
        let params = self.params;
        let keys: BTreeSet<&str> = params
            .keys()
            .into_iter()
            .filter_map(|k| bracketed_suffix(k, path))
            .collect();
        if keys.is_empty() {
            return Ok(Value::Unset);
        }

        let mut entries = Vec::with_capacity(keys.len());
        for text in keys {
            let entry_path = format!("{path}[{text}]");
            let entry_key = scalar::from_text(self.registry, key, text)
                .map_err(|e| e.in_field(&entry_path))?;
            let entry_value = self.read(value, &entry_path)?;
            if !entry_value.is_unset() {
                entries.push((entry_key, entry_value));
            }
        }
        Ok(Value::map_from(entries))
    }

    fn read_struct(&mut self, datatype: &DataType, path: &str) -> Result<Value, CallError> {
        let DataType::Struct(id) = datatype else {
            return Ok(Value::Unset);
        };
        let params = self.params;
        let prefix = format!("{path}.");
        let present = params
            .keys()
            .into_iter()
            .any(|key| key == path || key.starts_with(&prefix));
        if !present {
            return Ok(Value::Unset);
        }

        let struct_type = self.registry.struct_type(*id)?;
        let mut record = Record::new();
        for attr in struct_type.attributes() {
            let attr_path = format!("{prefix}{}", attr.name());
            let value = self.read(attr.datatype(), &attr_path)?;
            if value.is_unset() {
                if attr.is_mandatory() {
                    return Err(CallError::invalid_input(attr_path, "", "Mandatory field missing."));
                }
                continue;
            }
            self.write_attribute(attr, &mut record, value, &attr_path)?;
        }
        if params.contains_key(path) {
            self.hits.insert(path.to_string());
        }

        self.finish_struct(struct_type, record, path)
    }

    fn write_attribute(
        &self,
        attr: &AttributeDescriptor,
        record: &mut Record,
        value: Value,
        path: &str,
    ) -> Result<(), CallError> {
        if attr.is_readonly() {
            return Err(CallError::invalid_input(
                path,
                value.to_string(),
                "Cannot set read only field.",
            ));
        }
        let text = value.to_string();
        attr.write(record, value)
            .map_err(|reason| CallError::invalid_input(path, text, reason))
    }

    fn finish_struct(
        &self,
        struct_type: &StructType,
        record: Record,
        path: &str,
    ) -> Result<Value, CallError> {
        struct_type
            .validate(Value::Struct(record))
            .map_err(|reason| CallError::invalid_input(path, "", reason))
    }
}

/// Returns `K` when `key` is `path[K]` or starts with `path[K]`.
fn bracketed_suffix<'k>(key: &'k str, path: &str) -> Option<&'k str> {
    let rest = key.strip_prefix(path)?.strip_prefix('[')?;
    let end = rest.find(']')?;
    let inner = &rest[..end];
    (!inner.is_empty()).then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionDecl, Reply};
    use crate::types::{AttributeDecl, StructDecl};

    fn registry() -> (TypeRegistry, DataType) {
        let mut registry = TypeRegistry::new();
        let item = registry
            .register_struct(
                StructDecl::new("Item")
                    .attribute(AttributeDecl::new("value", NativeType::Text))
                    .attribute(AttributeDecl::new("rank", NativeType::Integer)),
            )
            .unwrap();
        (registry, item)
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().copied().collect()
    }

    #[test]
    fn indexed_array_items_follow_index_order() {
        let (registry, item) = registry();
        let datatype = DataType::array(item);

        let value = from_params(
            &registry,
            &datatype,
            &params(&[("q[1].value", "b"), ("q[0].value", "a")]),
            "q",
        )
        .unwrap();

        assert_eq!(
            value,
            Value::Array(vec![
                Value::Struct(Record::new().with("value", "a")),
                Value::Struct(Record::new().with("value", "b")),
            ])
        );
    }

    #[test]
    fn indexed_gaps_are_ignored() {
        let registry = TypeRegistry::new();
        let datatype = DataType::array(DataType::Native(NativeType::Integer));

        let value = from_params(
            &registry,
            &datatype,
            &params(&[("n[7]", "3"), ("n[2]", "1"), ("n[10]", "5")]),
            "n",
        )
        .unwrap();

        assert_eq!(value, Value::from(vec![1, 3, 5]));
    }

    #[test]
    fn repeated_key_wins_over_indexed_form() {
        let registry = TypeRegistry::new();
        let datatype = DataType::array(DataType::Native(NativeType::Text));

        let value = from_params(
            &registry,
            &datatype,
            &params(&[("t", "x"), ("t[0]", "ignored"), ("t", "y")]),
            "t",
        )
        .unwrap();

        assert_eq!(value, Value::from(vec!["x", "y"]));
    }

    #[test]
    fn parallel_attribute_arrays() {
        let (registry, item) = registry();
        let datatype = DataType::array(item);

        let value = from_params(
            &registry,
            &datatype,
            &params(&[("q.value", "a"), ("q.rank", "1"), ("q.value", "b")]),
            "q",
        )
        .unwrap();

        assert_eq!(
            value,
            Value::Array(vec![
                Value::Struct(Record::new().with("value", "a").with("rank", 1)),
                Value::Struct(Record::new().with("value", "b")),
            ])
        );
    }

    #[test]
    fn maps_parse_keys_through_the_key_type() {
        let registry = TypeRegistry::new();
        let datatype = DataType::map(
            DataType::Native(NativeType::Integer),
            DataType::Native(NativeType::Text),
        );

        let value = from_params(
            &registry,
            &datatype,
            &params(&[("m[2]", "two"), ("m[1]", "one")]),
            "m",
        )
        .unwrap();

        assert_eq!(
            value,
            Value::map_from([
                (Value::Int(1), Value::from("one")),
                (Value::Int(2), Value::from("two")),
            ])
        );

        let err = from_params(&registry, &datatype, &params(&[("m[x]", "?")]), "m").unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::InvalidInput { ref field, .. }) if field == "m[x]"
        ));
    }

    #[test]
    fn absent_and_empty_are_distinct() {
        let (registry, item) = registry();

        assert_eq!(
            from_params(&registry, &item, &params(&[("other", "1")]), "p").unwrap(),
            Value::Unset
        );
        assert_eq!(
            from_params(&registry, &item, &params(&[("p.rank", "")]), "p").unwrap(),
            Value::Struct(Record::new().with("rank", Value::Null))
        );
    }

    #[test]
    fn nested_struct_errors_name_the_full_path() {
        let (registry, item) = registry();

        let err = from_params(&registry, &item, &params(&[("p.rank", "high")]), "p").unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::InvalidInput { ref field, .. }) if field == "p.rank"
        ));
    }

    #[test]
    fn unknown_parameters_are_rejected() {
        let (registry, _) = registry();
        let funcdef = FunctionDecl::new("f", |_| Ok(Reply::empty()))
            .arg("p", "Item")
            .optional_arg("n", NativeType::Integer)
            .resolve(&registry)
            .unwrap();

        let err = args_from_params(
            &registry,
            &funcdef,
            &params(&[("p.value", "a"), ("p.colour", "red"), ("zz", "1")]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::UnknownArgument(ref names))
                if names == &["p.colour", "zz"]
        ));

        let funcdef = FunctionDecl::new("g", |_| Ok(Reply::empty()))
            .arg("n", NativeType::Integer)
            .ignore_extra_args()
            .resolve(&registry)
            .unwrap();
        let args =
            args_from_params(&registry, &funcdef, &params(&[("n", "1"), ("zz", "1")])).unwrap();
        assert_eq!(args.value("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn combine_detects_conflicts() {
        let first: Arguments = [("a", 1)].into_iter().collect();
        let second: Arguments = [("a", 2)].into_iter().collect();

        let err = combine([first.clone(), second.clone()], false).unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::SuppliedTwice(ref name)) if name == "a"
        ));

        let merged = combine([first, second], true).unwrap();
        assert_eq!(merged.value("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn mandatory_and_defaults() {
        let registry = TypeRegistry::new();
        let funcdef = FunctionDecl::new("f", |_| Ok(Reply::empty()))
            .arg("a", NativeType::Integer)
            .arg_with_default("b", NativeType::Integer, 10)
            .resolve(&registry)
            .unwrap();

        let err = check_arguments(&funcdef, &Arguments::new()).unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::MissingArgument(ref name)) if name == "a"
        ));

        let args: Arguments = [("a", Value::Null)].into_iter().collect();
        let err = check_arguments(&funcdef, &args).unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::InvalidInput { ref field, .. }) if field == "a"
        ));

        let mut args: Arguments = [("a", 1)].into_iter().collect();
        check_arguments(&funcdef, &args).unwrap();
        apply_defaults(&funcdef, &mut args);
        assert_eq!(args.value("b"), Some(&Value::Int(10)));
    }

    #[test]
    fn host_arguments() {
        let registry = TypeRegistry::new();
        let funcdef = FunctionDecl::new("f", |_| Ok(Reply::empty()))
            .arg("a", NativeType::Integer)
            .arg("flag", NativeType::Boolean)
            .resolve(&registry)
            .unwrap();

        let args = args_from_args(
            &registry,
            &funcdef,
            &HostArguments::new().positional("3").keyword("flag", "yes"),
        )
        .unwrap();
        assert_eq!(args.value("a"), Some(&Value::Int(3)));
        assert_eq!(args.value("flag"), Some(&Value::Bool(true)));

        let err = args_from_args(
            &registry,
            &funcdef,
            &HostArguments::new().positional("3").keyword("a", "4"),
        )
        .unwrap_err();
        assert!(matches!(err, CallError::Client(ClientError::SuppliedTwice(_))));

        let err = args_from_args(&registry, &funcdef, &HostArguments::new().keyword("who", "?"))
            .unwrap_err();
        assert!(matches!(err, CallError::Client(ClientError::UnknownArgument(_))));
    }
}
