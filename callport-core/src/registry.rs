//! # Type Registry
//!
//! The catalog of every type an application exposes, keyed by name.
//!
//! Registration happens during startup through `&mut` methods. Structured types keep their
//! attribute tokens as declared and resolve them lazily the first time the type is
//! inspected, so attributes may refer to the type itself or to types registered later.
//! Resolution is memoized per type in a [`OnceLock`]: concurrent first uses converge on a
//! single resolved node.
//!
//! The registry owns its nodes for its whole lifetime; nothing is ever evicted. A shared,
//! read-only registry is handed to the dispatcher as an `Arc<TypeRegistry>`, and tests build
//! a fresh one each.
use crate::types::{
    AttributeDescriptor, DataType, NativeType, StructDecl, StructId, StructType, TypeToken,
    UserType, UserTypeId,
};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Declaration-time registry misuse. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid type declaration: {0}")]
    InvalidTypeDeclaration(String),

    #[error("Unresolved type '{0}'")]
    UnresolvedType(String),

    #[error("Type name '{0}' is already registered as a different kind of type")]
    DuplicateType(String),

    #[error("Invalid function declaration '{name}': {reason}")]
    InvalidFunction { name: String, reason: String },
}

#[derive(Debug, Clone, Copy)]
enum NamedType {
    Struct(StructId),
    User(UserTypeId),
}

#[derive(Debug)]
struct StructEntry {
    decl: StructDecl,
    resolved: OnceLock<StructType>,
}

/// Process-wide catalog of Type Model nodes.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    names: HashMap<String, NamedType>,
    structs: Vec<StructEntry>,
    user_types: Vec<UserType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type token and returns its node.
    ///
    /// Idempotent: registering a known token returns the existing node. Array and map
    /// literals must hold exactly one element or entry.
    pub fn register(&mut self, token: impl Into<TypeToken>) -> Result<DataType, RegistryError> {
        self.resolve(&token.into())
    }

    /// Registers a structured type by name.
    ///
    /// Registering a name that is already a structured type returns the existing node and
    /// keeps the original attribute list.
    pub fn register_struct(&mut self, decl: StructDecl) -> Result<DataType, RegistryError> {
        match self.names.get(decl.name()) {
            Some(NamedType::Struct(id)) => return Ok(DataType::Struct(*id)),
            Some(NamedType::User(_)) => {
                return Err(RegistryError::DuplicateType(decl.name().to_string()));
            }
            None => {}
        }

        if NativeType::from_name(decl.name()).is_some() {
            return Err(RegistryError::DuplicateType(decl.name().to_string()));
        }

        let mut keys = HashSet::new();
        let mut wire_names = HashSet::new();
        for attribute in &decl.attributes {
            check_token_shape(&attribute.token)?;
            let wire_name = attribute.name.as_deref().unwrap_or(&attribute.key);
            if !keys.insert(attribute.key.as_str()) || !wire_names.insert(wire_name) {
                return Err(RegistryError::InvalidTypeDeclaration(format!(
                    "attribute '{}' is declared twice on '{}'",
                    attribute.key,
                    decl.name()
                )));
            }
        }

        let id = StructId(self.structs.len());
        self.names
            .insert(decl.name().to_string(), NamedType::Struct(id));
        self.structs.push(StructEntry {
            decl,
            resolved: OnceLock::new(),
        });

        Ok(DataType::Struct(id))
    }

    /// Registers a user type by name. Idempotent on the name.
    pub fn register_user_type(&mut self, user_type: UserType) -> Result<DataType, RegistryError> {
        match self.names.get(user_type.name()) {
            Some(NamedType::User(id)) => return Ok(DataType::User(*id)),
            Some(NamedType::Struct(_)) => {
                return Err(RegistryError::DuplicateType(user_type.name().to_string()));
            }
            None => {}
        }

        if NativeType::from_name(user_type.name()).is_some() {
            return Err(RegistryError::DuplicateType(user_type.name().to_string()));
        }

        let id = UserTypeId(self.user_types.len());
        self.names
            .insert(user_type.name().to_string(), NamedType::User(id));
        self.user_types.push(user_type);

        Ok(DataType::User(id))
    }

    /// Resolves a possibly-deferred token to its concrete node.
    pub fn resolve(&self, token: &TypeToken) -> Result<DataType, RegistryError> {
        match token {
            TypeToken::Native(native) => Ok(DataType::Native(*native)),
            TypeToken::Resolved(datatype) => Ok(datatype.clone()),
            TypeToken::Named(name) => self
                .lookup(name)
                .ok_or_else(|| RegistryError::UnresolvedType(name.clone())),
            TypeToken::List(items) => match items.as_slice() {
                [item] => Ok(DataType::array(self.resolve(item)?)),
                _ => Err(RegistryError::InvalidTypeDeclaration(format!(
                    "an array type needs exactly one item type, got {}",
                    items.len()
                ))),
            },
            TypeToken::Dict(entries) => match entries.as_slice() {
                [(key, value)] => {
                    let key = self.resolve(key)?;
                    if !key.is_scalar() {
                        return Err(RegistryError::InvalidTypeDeclaration(format!(
                            "map keys must be scalar, got '{}'",
                            self.type_name(&key)
                        )));
                    }
                    Ok(DataType::map(key, self.resolve(value)?))
                }
                _ => Err(RegistryError::InvalidTypeDeclaration(format!(
                    "a map type needs exactly one key/value entry, got {}",
                    entries.len()
                ))),
            },
        }
    }

    /// Finds a type by name: native names first, then user and structured types.
    pub fn lookup(&self, name: &str) -> Option<DataType> {
        if let Some(native) = NativeType::from_name(name) {
            return Some(DataType::Native(native));
        }
        self.names.get(name).map(|named| match named {
            NamedType::Struct(id) => DataType::Struct(*id),
            NamedType::User(id) => DataType::User(*id),
        })
    }

    /// Returns the resolved structured type, resolving its attributes on first use.
    pub fn struct_type(&self, id: StructId) -> Result<&StructType, RegistryError> {
        let entry = self
            .structs
            .get(id.0)
            .ok_or_else(|| RegistryError::UnresolvedType(format!("struct #{}", id.0)))?;

        if let Some(resolved) = entry.resolved.get() {
            return Ok(resolved);
        }

        let resolved = self.build_struct(&entry.decl)?;
        Ok(entry.resolved.get_or_init(|| resolved))
    }

    pub fn user_type(&self, id: UserTypeId) -> Result<&UserType, RegistryError> {
        self.user_types
            .get(id.0)
            .ok_or_else(|| RegistryError::UnresolvedType(format!("user type #{}", id.0)))
    }

    /// Resolves every registered structured type, surfacing forward references that never
    /// got a definition.
    pub fn complete(&self) -> Result<(), RegistryError> {
        for index in 0..self.structs.len() {
            self.struct_type(StructId(index))?;
        }
        Ok(())
    }

    /// Human readable name of a type: `int`, `Person`, `[int]`, `{text: int}`.
    pub fn type_name(&self, datatype: &DataType) -> String {
        match datatype {
            DataType::Native(native) => native.name().to_string(),
            DataType::User(id) => self
                .user_types
                .get(id.0)
                .map_or_else(|| format!("user type #{}", id.0), |u| u.name().to_string()),
            DataType::Struct(id) => self
                .structs
                .get(id.0)
                .map_or_else(|| format!("struct #{}", id.0), |s| s.decl.name().to_string()),
            DataType::Array(item) => format!("[{}]", self.type_name(item)),
            DataType::Map(key, value) => {
                format!("{{{}: {}}}", self.type_name(key), self.type_name(value))
            }
        }
    }

    fn build_struct(&self, decl: &StructDecl) -> Result<StructType, RegistryError> {
        let mut attributes = Vec::with_capacity(decl.attributes.len());
        for attribute in &decl.attributes {
            let datatype = self.resolve(&attribute.token).map_err(|err| match err {
                RegistryError::UnresolvedType(name) => RegistryError::UnresolvedType(format!(
                    "{name} (attribute '{}' of '{}')",
                    attribute.key,
                    decl.name()
                )),
                err => err,
            })?;
            attributes.push(AttributeDescriptor {
                name: attribute
                    .name
                    .clone()
                    .unwrap_or_else(|| attribute.key.clone()),
                key: attribute.key.clone(),
                datatype,
                mandatory: attribute.mandatory,
                readonly: attribute.readonly,
                accessor: attribute.accessor.clone(),
            });
        }

        if let Some(order) = &decl.order {
            let mut ordered = Vec::with_capacity(attributes.len());
            for key in order {
                let position = attributes
                    .iter()
                    .position(|attr| &attr.key == key)
                    .ok_or_else(|| {
                        RegistryError::InvalidTypeDeclaration(format!(
                            "ordering of '{}' names unknown attribute '{key}'",
                            decl.name()
                        ))
                    })?;
                ordered.push(attributes.remove(position));
            }
            ordered.append(&mut attributes);
            attributes = ordered;
        }

        Ok(StructType {
            name: decl.name().to_string(),
            attributes,
            validator: decl.validator.clone(),
        })
    }
}

/// Validates array/map literal arity without resolving names.
fn check_token_shape(token: &TypeToken) -> Result<(), RegistryError> {
    match token {
        TypeToken::List(items) => match items.as_slice() {
            [item] => check_token_shape(item),
            _ => Err(RegistryError::InvalidTypeDeclaration(format!(
                "an array type needs exactly one item type, got {}",
                items.len()
            ))),
        },
        TypeToken::Dict(entries) => match entries.as_slice() {
            [(key, value)] => {
                check_token_shape(key)?;
                check_token_shape(value)
            }
            _ => Err(RegistryError::InvalidTypeDeclaration(format!(
                "a map type needs exactly one key/value entry, got {}",
                entries.len()
            ))),
        },
        _ => Ok(()),
    }
}
