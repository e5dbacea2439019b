//! # Type Model
//!
//! The language-neutral description of every data shape an exposed function can
//! receive or return.
//!
//! A [`DataType`] is one of:
//!
//! * **Native scalars** ([`NativeType`]): integers, floats, booleans, text, byte strings,
//!   decimals, dates, times, datetimes and base64-carried binary blobs.
//! * **User types** ([`UserType`]): named scalars stored as a native base type plus a pair of
//!   conversion functions (enumerations and constrained scalars are built this way).
//! * **Arrays** and **maps** wrapping other data types.
//! * **Structured types**: an ordered list of [`AttributeDescriptor`]s owned by the
//!   [`crate::registry::TypeRegistry`].
//!
//! User and structured types are referenced through small handles ([`UserTypeId`],
//! [`StructId`]) rather than inlined, so a structured type can refer to itself or to a
//! sibling declared later.
mod user;
mod value;

pub use user::UserType;
pub use value::{FromValue, Record, Value, ValueTypeError};

use std::fmt::Debug;
use std::sync::Arc;

/// Built-in scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Integer,
    Float,
    Boolean,
    Text,
    Bytes,
    Decimal,
    Date,
    Time,
    DateTime,
    Binary,
}

impl NativeType {
    pub const ALL: [NativeType; 10] = [
        NativeType::Integer,
        NativeType::Float,
        NativeType::Boolean,
        NativeType::Text,
        NativeType::Bytes,
        NativeType::Decimal,
        NativeType::Date,
        NativeType::Time,
        NativeType::DateTime,
        NativeType::Binary,
    ];

    /// The canonical name used in declarations and error messages.
    pub fn name(self) -> &'static str {
        match self {
            NativeType::Integer => "int",
            NativeType::Float => "float",
            NativeType::Boolean => "bool",
            NativeType::Text => "text",
            NativeType::Bytes => "bytes",
            NativeType::Decimal => "decimal",
            NativeType::Date => "date",
            NativeType::Time => "time",
            NativeType::DateTime => "datetime",
            NativeType::Binary => "binary",
        }
    }

    /// Looks up a native type by its declaration name.
    ///
    /// `str` and `unicode` are accepted as aliases of `text`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "str" | "unicode" => Some(NativeType::Text),
            _ => Self::ALL.into_iter().find(|native| native.name() == name),
        }
    }
}

/// Handle to a structured type owned by a [`crate::registry::TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub(crate) usize);

/// Handle to a user type owned by a [`crate::registry::TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserTypeId(pub(crate) usize);

/// A resolved Type Model node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Native(NativeType),
    User(UserTypeId),
    Array(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Struct(StructId),
}

impl DataType {
    pub fn array(item: DataType) -> Self {
        DataType::Array(Box::new(item))
    }

    pub fn map(key: DataType, value: DataType) -> Self {
        DataType::Map(Box::new(key), Box::new(value))
    }

    /// Scalars are read from a single textual value (natives and user types).
    pub fn is_scalar(&self) -> bool {
        matches!(self, DataType::Native(_) | DataType::User(_))
    }
}

impl From<NativeType> for DataType {
    fn from(native: NativeType) -> Self {
        DataType::Native(native)
    }
}

/// A declaration-time reference to a type, resolved by the registry.
///
/// `List` and `Dict` are the literal forms of array and map types: a one-element list is
/// an array of that element, a one-entry dict is a map from its key type to its value
/// type. Any other arity is rejected when the token is registered or resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeToken {
    Native(NativeType),
    /// A type referenced by name, possibly declared later.
    Named(String),
    Resolved(DataType),
    List(Vec<TypeToken>),
    Dict(Vec<(TypeToken, TypeToken)>),
}

impl TypeToken {
    pub fn array(item: impl Into<TypeToken>) -> Self {
        TypeToken::List(vec![item.into()])
    }

    pub fn map(key: impl Into<TypeToken>, value: impl Into<TypeToken>) -> Self {
        TypeToken::Dict(vec![(key.into(), value.into())])
    }
}

impl From<NativeType> for TypeToken {
    fn from(native: NativeType) -> Self {
        TypeToken::Native(native)
    }
}

impl From<&str> for TypeToken {
    fn from(name: &str) -> Self {
        TypeToken::Named(name.to_string())
    }
}

impl From<String> for TypeToken {
    fn from(name: String) -> Self {
        TypeToken::Named(name)
    }
}

impl From<DataType> for TypeToken {
    fn from(datatype: DataType) -> Self {
        TypeToken::Resolved(datatype)
    }
}

impl From<&DataType> for TypeToken {
    fn from(datatype: &DataType) -> Self {
        TypeToken::Resolved(datatype.clone())
    }
}

type Getter = dyn Fn(&Record) -> Value + Send + Sync;
type Setter = dyn Fn(&mut Record, Value) -> Result<(), String> + Send + Sync;

/// Custom getter/setter pair backing a computed attribute.
#[derive(Clone)]
pub struct Accessor {
    get: Arc<Getter>,
    set: Arc<Setter>,
}

impl Accessor {
    pub fn new(
        get: impl Fn(&Record) -> Value + Send + Sync + 'static,
        set: impl Fn(&mut Record, Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }
}

impl Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Accessor")
    }
}

/// Post-decode hook of a structured type. It may normalize the value or reject it.
pub type Validator = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Per-field metadata of a structured type.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub(crate) name: String,
    pub(crate) key: String,
    pub(crate) datatype: DataType,
    pub(crate) mandatory: bool,
    pub(crate) readonly: bool,
    pub(crate) accessor: Option<Accessor>,
}

impl AttributeDescriptor {
    /// The name used on the wire.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key under which the value is stored in a [`Record`].
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Reads the attribute from a record, through the accessor when there is one.
    pub fn read(&self, record: &Record) -> Value {
        match &self.accessor {
            Some(accessor) => (accessor.get)(record),
            None => record.get(&self.key).clone(),
        }
    }

    /// Writes the attribute into a record, through the accessor when there is one.
    pub fn write(&self, record: &mut Record, value: Value) -> Result<(), String> {
        match &self.accessor {
            Some(accessor) => (accessor.set)(record, value),
            None => {
                record.set(self.key.clone(), value);
                Ok(())
            }
        }
    }
}

/// A resolved structured type. Its attribute list never changes once built.
#[derive(Clone)]
pub struct StructType {
    pub(crate) name: String,
    pub(crate) attributes: Vec<AttributeDescriptor>,
    pub(crate) validator: Option<Validator>,
}

impl StructType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Finds an attribute by wire name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Runs the validation hook, if any.
    pub fn validate(&self, value: Value) -> Result<Value, String> {
        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(value),
        }
    }
}

impl Debug for StructType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructType")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Declaration of one attribute of a structured type.
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub(crate) key: String,
    pub(crate) name: Option<String>,
    pub(crate) token: TypeToken,
    pub(crate) mandatory: bool,
    pub(crate) readonly: bool,
    pub(crate) accessor: Option<Accessor>,
}

impl AttributeDecl {
    /// Declares an attribute stored under `key`, exposed on the wire under the same name.
    pub fn new(key: impl Into<String>, token: impl Into<TypeToken>) -> Self {
        Self {
            key: key.into(),
            name: None,
            token: token.into(),
            mandatory: false,
            readonly: false,
            accessor: None,
        }
    }

    /// Overrides the wire name (it may contain characters a field name cannot, like `.`).
    pub fn wire_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = Some(accessor);
        self
    }
}

/// Declarative schema of a structured type, registered once at startup.
#[derive(Clone)]
pub struct StructDecl {
    pub(crate) name: String,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) order: Option<Vec<String>>,
    pub(crate) validator: Option<Validator>,
}

impl StructDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            order: None,
            validator: None,
        }
    }

    pub fn attribute(mut self, attribute: AttributeDecl) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Explicit attribute ordering, by storage key. Unlisted attributes keep their
    /// declaration order after the listed ones.
    pub fn order<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn validator(
        mut self,
        validator: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for StructDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructDecl")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
