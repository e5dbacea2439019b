//! # Function Definitions
//!
//! Metadata describing how an exposed function is called: its path, its ordered
//! arguments, the argument fed from the request body, its return type and the HTTP status
//! of a successful call.
//!
//! Definitions are declared with a [`FunctionDecl`] whose types are [`TypeToken`]s, then
//! resolved against a [`TypeRegistry`] once every type is registered. Resolved definitions
//! live in an [`Api`], the catalog the dispatcher looks paths up in.
use crate::BoxError;
use crate::error::CallError;
use crate::registry::{RegistryError, TypeRegistry};
use crate::types::{DataType, FromValue, TypeToken, Value, ValueTypeError};
use http::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

/// The body of an exposed function.
pub type Handler = dyn Fn(Arguments) -> Result<Reply, BoxError> + Send + Sync;

/// Named argument values handed to a function body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts an argument as a Rust type. A missing argument reads as [`Value::Unset`],
    /// which only `Option<T>` and [`Value`] accept.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ValueTypeError> {
        T::from_value(self.value(name).cloned().unwrap_or_default())
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Arguments {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// What a function body returns: the result value and an optional status override.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub value: Value,
    pub status_code: Option<StatusCode>,
}

impl Reply {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// A reply without a result, for functions that declare no return type.
    pub fn empty() -> Self {
        Self::new(Value::Unset)
    }

    pub fn with_status(mut self, status_code: StatusCode) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// One declared argument of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDescriptor {
    pub name: String,
    pub datatype: DataType,
    pub mandatory: bool,
    pub default: Option<Value>,
}

/// A resolved, callable function.
#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub doc: Option<String>,
    pub path: Vec<String>,
    pub arguments: Vec<ArgumentDescriptor>,
    /// Name of the argument fed from the whole request body.
    pub body_argument: Option<String>,
    pub return_type: Option<DataType>,
    pub status_code: StatusCode,
    /// Unknown incoming arguments are skipped instead of rejected.
    pub ignore_extra_args: bool,
    /// Protocol specific options, such as the HTTP `method` a REST path answers to.
    pub options: BTreeMap<String, String>,
    handler: Arc<Handler>,
}

impl FunctionDefinition {
    pub fn get_arg(&self, name: &str) -> Option<&ArgumentDescriptor> {
        self.arguments.iter().find(|arg| arg.name == name)
    }

    pub fn body_arg(&self) -> Option<&ArgumentDescriptor> {
        self.body_argument.as_deref().and_then(|name| self.get_arg(name))
    }

    pub fn method(&self) -> Option<&str> {
        self.options.get("method").map(String::as_str)
    }

    pub fn invoke(&self, arguments: Arguments) -> Result<Reply, CallError> {
        (self.handler)(arguments).map_err(CallError::from_handler)
    }
}

impl Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("arguments", &self.arguments)
            .field("body_argument", &self.body_argument)
            .field("return_type", &self.return_type)
            .field("status_code", &self.status_code)
            .field("ignore_extra_args", &self.ignore_extra_args)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct ArgumentDecl {
    name: String,
    token: TypeToken,
    mandatory: bool,
    default: Option<Value>,
}

/// Declaration of an exposed function.
///
/// ```
/// use callport_core::function::{FunctionDecl, Reply};
/// use callport_core::types::NativeType;
///
/// let decl = FunctionDecl::new("multiply", |args| {
///     let a: i64 = args.get("a")?;
///     let b: i64 = args.get("b")?;
///     Ok(Reply::new(a * b))
/// })
/// .arg("a", NativeType::Integer)
/// .arg("b", NativeType::Integer)
/// .returns(NativeType::Integer);
/// ```
pub struct FunctionDecl {
    name: String,
    doc: Option<String>,
    path: Option<Vec<String>>,
    arguments: Vec<ArgumentDecl>,
    body_argument: Option<String>,
    return_type: Option<TypeToken>,
    status_code: StatusCode,
    ignore_extra_args: bool,
    options: BTreeMap<String, String>,
    handler: Arc<Handler>,
}

impl FunctionDecl {
    pub fn new(
        name: impl Into<String>,
        handler: impl Fn(Arguments) -> Result<Reply, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            doc: None,
            path: None,
            arguments: Vec::new(),
            body_argument: None,
            return_type: None,
            status_code: StatusCode::OK,
            ignore_extra_args: false,
            options: BTreeMap::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// The path segments the function is exposed under. Defaults to its name.
    pub fn path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    /// A mandatory argument.
    pub fn arg(self, name: impl Into<String>, token: impl Into<TypeToken>) -> Self {
        self.push_arg(name.into(), token.into(), true, None)
    }

    pub fn optional_arg(self, name: impl Into<String>, token: impl Into<TypeToken>) -> Self {
        self.push_arg(name.into(), token.into(), false, None)
    }

    /// An optional argument that takes `default` when the caller leaves it out.
    pub fn arg_with_default(
        self,
        name: impl Into<String>,
        token: impl Into<TypeToken>,
        default: impl Into<Value>,
    ) -> Self {
        self.push_arg(name.into(), token.into(), false, Some(default.into()))
    }

    /// A mandatory argument fed from the whole request body.
    pub fn body_arg(mut self, name: impl Into<String>, token: impl Into<TypeToken>) -> Self {
        let name = name.into();
        self.body_argument = Some(name.clone());
        self.push_arg(name, token.into(), true, None)
    }

    pub fn returns(mut self, token: impl Into<TypeToken>) -> Self {
        self.return_type = Some(token.into());
        self
    }

    /// The status of a successful call.
    pub fn status(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    /// Restricts a REST path to one HTTP method (e.g. `GET`).
    pub fn method(self, method: impl Into<String>) -> Self {
        self.option("method", method)
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn ignore_extra_args(mut self) -> Self {
        self.ignore_extra_args = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn push_arg(
        mut self,
        name: String,
        token: TypeToken,
        mandatory: bool,
        default: Option<Value>,
    ) -> Self {
        self.arguments.push(ArgumentDecl {
            name,
            token,
            mandatory,
            default,
        });
        self
    }

    /// Resolves every argument and the return type.
    pub fn resolve(self, registry: &TypeRegistry) -> Result<FunctionDefinition, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidFunction {
            name: self.name.clone(),
            reason,
        };

        let mut arguments: Vec<ArgumentDescriptor> = Vec::with_capacity(self.arguments.len());
        for arg in &self.arguments {
            if arguments.iter().any(|known| known.name == arg.name) {
                return Err(invalid(format!("argument '{}' is declared twice", arg.name)));
            }
            arguments.push(ArgumentDescriptor {
                name: arg.name.clone(),
                datatype: registry.resolve(&arg.token)?,
                mandatory: arg.mandatory,
                default: arg.default.clone(),
            });
        }

        let return_type = self
            .return_type
            .as_ref()
            .map(|token| registry.resolve(token))
            .transpose()?;

        let path = self.path.clone().unwrap_or_else(|| vec![self.name.clone()]);
        if path.is_empty() || path.iter().any(String::is_empty) {
            return Err(invalid(format!("invalid path '{}'", path.join("/"))));
        }

        Ok(FunctionDefinition {
            name: self.name,
            doc: self.doc,
            path,
            arguments,
            body_argument: self.body_argument,
            return_type,
            status_code: self.status_code,
            ignore_extra_args: self.ignore_extra_args,
            options: self.options,
            handler: self.handler,
        })
    }
}

/// The catalog of exposed functions, keyed by path.
#[derive(Debug, Default)]
pub struct Api {
    functions: Vec<FunctionDefinition>,
    by_path: HashMap<Vec<String>, usize>,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, definition: FunctionDefinition) -> Result<(), RegistryError> {
        if self.by_path.contains_key(&definition.path) {
            return Err(RegistryError::InvalidFunction {
                name: definition.name,
                reason: format!("path '{}' is already exposed", definition.path.join("/")),
            });
        }
        self.by_path
            .insert(definition.path.clone(), self.functions.len());
        self.functions.push(definition);
        Ok(())
    }

    pub fn get(&self, path: &[String]) -> Option<&FunctionDefinition> {
        self.by_path.get(path).map(|&index| &self.functions[index])
    }

    /// Functions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.iter()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeType;

    fn multiply() -> FunctionDecl {
        FunctionDecl::new("multiply", |args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            Ok(Reply::new(a * b))
        })
        .arg("a", NativeType::Integer)
        .arg("b", NativeType::Integer)
        .returns(NativeType::Integer)
    }

    #[test]
    fn resolves_and_invokes() {
        let registry = TypeRegistry::new();
        let definition = multiply().resolve(&registry).unwrap();

        assert_eq!(definition.path, ["multiply"]);
        assert_eq!(definition.status_code, StatusCode::OK);
        assert!(definition.get_arg("a").unwrap().mandatory);

        let args: Arguments = [("a", 4), ("b", 5)].into_iter().collect();
        assert_eq!(definition.invoke(args).unwrap().value, Value::Int(20));
    }

    #[test]
    fn handler_type_errors_are_server_faults() {
        let registry = TypeRegistry::new();
        let definition = multiply().resolve(&registry).unwrap();

        let args: Arguments = [("a", "x"), ("b", "y")].into_iter().collect();
        let err = definition.invoke(args).unwrap_err();
        assert!(!err.is_client());
    }

    #[test]
    fn duplicate_arguments_are_rejected() {
        let registry = TypeRegistry::new();
        let result = FunctionDecl::new("f", |_| Ok(Reply::empty()))
            .arg("a", NativeType::Integer)
            .optional_arg("a", NativeType::Text)
            .resolve(&registry);

        assert!(matches!(result, Err(RegistryError::InvalidFunction { .. })));
    }

    #[test]
    fn unresolved_argument_types_are_rejected() {
        let registry = TypeRegistry::new();
        let result = FunctionDecl::new("f", |_| Ok(Reply::empty()))
            .arg("who", "Nobody")
            .resolve(&registry);

        assert_eq!(
            result.unwrap_err(),
            RegistryError::UnresolvedType("Nobody".to_string())
        );
    }

    #[test]
    fn api_rejects_duplicate_paths() {
        let registry = TypeRegistry::new();
        let mut api = Api::new();
        api.add(multiply().resolve(&registry).unwrap()).unwrap();

        assert!(api.add(multiply().resolve(&registry).unwrap()).is_err());
        assert_eq!(api.len(), 1);
        assert!(api.get(&["multiply".to_string()]).is_some());
    }

    #[test]
    fn body_argument_and_options() {
        let registry = TypeRegistry::new();
        let definition = FunctionDecl::new("save", |_| Ok(Reply::empty()))
            .path(["notes", "save"])
            .body_arg("note", NativeType::Text)
            .method("POST")
            .status(StatusCode::CREATED)
            .resolve(&registry)
            .unwrap();

        assert_eq!(definition.body_arg().unwrap().name, "note");
        assert_eq!(definition.method(), Some("POST"));
        assert_eq!(definition.status_code, StatusCode::CREATED);
        assert_eq!(definition.return_type, None);
    }
}
