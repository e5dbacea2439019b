//! # Calc Service
//!
//! **INTERNAL USE ONLY**: This crate exists solely to provide a catalogue of types and
//! exposed functions for integration testing `callport-core`.
//! It is not intended for production use.
use callport_core::BoxError;
use callport_core::config::RootConfig;
use callport_core::error::ClientError;
use callport_core::function::{Arguments, FunctionDecl, Reply};
use callport_core::http::StatusCode;
use callport_core::protocol::RestProtocol;
use callport_core::registry::{RegistryError, TypeRegistry};
use callport_core::root::Root;
use callport_core::types::{
    Accessor, AttributeDecl, NativeType, Record, StructDecl, TypeToken, UserType, Value,
};
use chrono::{NaiveDate, TimeDelta};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registers every type the service exposes.
///
/// `Person` is declared before `Address` and refers to itself.
pub fn register_types() -> Result<TypeRegistry, RegistryError> {
    let mut registry = TypeRegistry::new();

    registry.register_user_type(UserType::enumeration(
        "Color",
        NativeType::Text,
        ["red", "green", "blue"],
    ))?;
    registry.register_user_type(
        UserType::string("PostalCode", Some(5), Some(5), Some("^[0-9]+$"))
            .map_err(|e| RegistryError::InvalidTypeDeclaration(e.to_string()))?,
    )?;
    registry.register_user_type(UserType::integer("Percent", Some(0), Some(100)))?;

    registry.register_struct(
        StructDecl::new("Person")
            .attribute(AttributeDecl::new("name", NativeType::Text).mandatory())
            .attribute(AttributeDecl::new("age", NativeType::Integer))
            .attribute(AttributeDecl::new("favorite_color", "Color"))
            .attribute(AttributeDecl::new("address", "Address"))
            .attribute(AttributeDecl::new("parent", "Person"))
            .attribute(AttributeDecl::new("friends", TypeToken::array("Person")))
            .attribute(AttributeDecl::new("id", NativeType::Integer).readonly())
            .attribute(
                AttributeDecl::new("display_name", NativeType::Text)
                    .readonly()
                    .accessor(Accessor::new(display_name, |_, _| {
                        Err("display_name is computed".to_string())
                    })),
            )
            .validator(|value| {
                let negative_age = match &value {
                    Value::Struct(record) => {
                        matches!(record.get("age"), Value::Int(age) if *age < 0)
                    }
                    _ => false,
                };
                if negative_age {
                    Err("Age must not be negative".to_string())
                } else {
                    Ok(value)
                }
            }),
    )?;

    registry.register_struct(
        StructDecl::new("Address")
            .attribute(AttributeDecl::new("street", NativeType::Text).mandatory())
            .attribute(AttributeDecl::new("city", NativeType::Text))
            .attribute(AttributeDecl::new("postal_code", "PostalCode"))
            .attribute(AttributeDecl::new("lat", NativeType::Float).wire_name("geo.lat"))
            .attribute(AttributeDecl::new("lon", NativeType::Float).wire_name("geo.lon"))
            .order(["city", "street"]),
    )?;

    registry.register_struct(
        StructDecl::new("Book")
            .attribute(AttributeDecl::new("title", NativeType::Text).mandatory())
            .attribute(AttributeDecl::new("year", NativeType::Integer))
            .attribute(AttributeDecl::new("rating", "Percent"))
            .attribute(AttributeDecl::new("tags", TypeToken::array(NativeType::Text))),
    )?;

    Ok(registry)
}

fn display_name(record: &Record) -> Value {
    match (record.get("name"), record.get("age")) {
        (Value::Text(name), Value::Int(age)) => Value::Text(format!("{name} ({age})")),
        (Value::Text(name), _) => Value::Text(name.clone()),
        _ => Value::Unset,
    }
}

/// Builds a REST root serving every function of the service.
pub fn build_root(config: RootConfig) -> Result<Root, RegistryError> {
    let registry = register_types()?;
    let mut root = Root::new(Arc::new(registry), config)?;
    root.add_protocol(RestProtocol::new());

    for decl in functions() {
        root.expose(decl)?;
    }

    Ok(root)
}

/// The exposed functions, in registration order.
pub fn functions() -> Vec<FunctionDecl> {
    vec![
        FunctionDecl::new("multiply", multiply)
            .doc("Multiplies two integers.")
            .arg("a", NativeType::Integer)
            .arg("b", NativeType::Integer)
            .returns(NativeType::Integer),
        FunctionDecl::new("divide", divide)
            .arg("a", NativeType::Decimal)
            .arg("b", NativeType::Decimal)
            .returns(NativeType::Decimal),
        FunctionDecl::new("sum", sum)
            .arg("values", TypeToken::array(NativeType::Integer))
            .returns(NativeType::Integer),
        FunctionDecl::new("echo_person", |args| Ok(Reply::new(args.get::<Value>("person")?)))
            .arg("person", "Person")
            .returns("Person"),
        FunctionDecl::new("tag_counts", tag_counts)
            .arg("tags", TypeToken::array("text"))
            .returns(TypeToken::map("text", "int")),
        FunctionDecl::new("add_days", add_days)
            .arg("day", NativeType::Date)
            .arg_with_default("days", NativeType::Integer, 1)
            .returns(NativeType::Date),
        FunctionDecl::new("set_person", set_person)
            .body_arg("person", "Person")
            .returns(NativeType::Text)
            .status(StatusCode::CREATED),
        FunctionDecl::new("ping", |_| Ok(Reply::empty())).status(StatusCode::NO_CONTENT),
        FunctionDecl::new("get_books", get_books)
            .path(["books", "get"])
            .method("GET")
            .optional_arg("tag", NativeType::Text)
            .returns(TypeToken::array("Book")),
        FunctionDecl::new("backup", backup).returns(NativeType::Text),
    ]
}

fn multiply(args: Arguments) -> Result<Reply, BoxError> {
    let a: i64 = args.get("a")?;
    let b: i64 = args.get("b")?;
    let product = a
        .checked_mul(b)
        .ok_or_else(|| ClientError::BadRequest("Integer overflow".to_string()))?;
    Ok(Reply::new(product))
}

fn divide(args: Arguments) -> Result<Reply, BoxError> {
    let a: Decimal = args.get("a")?;
    let b: Decimal = args.get("b")?;
    let quotient = a
        .checked_div(b)
        .ok_or_else(|| ClientError::invalid_input("b", b.to_string(), "Cannot divide by zero"))?;
    Ok(Reply::new(quotient))
}

fn sum(args: Arguments) -> Result<Reply, BoxError> {
    let values: Vec<Option<i64>> = args.get("values")?;
    Ok(Reply::new(values.into_iter().flatten().sum::<i64>()))
}

fn tag_counts(args: Arguments) -> Result<Reply, BoxError> {
    let tags: Vec<String> = args.get("tags")?;
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for tag in tags {
        *counts.entry(tag).or_default() += 1;
    }
    Ok(Reply::new(Value::map_from(
        counts
            .into_iter()
            .map(|(tag, count)| (Value::from(tag), Value::from(count))),
    )))
}

fn add_days(args: Arguments) -> Result<Reply, BoxError> {
    let day: NaiveDate = args.get("day")?;
    let days: i64 = args.get("days")?;
    let shifted = TimeDelta::try_days(days)
        .and_then(|delta| day.checked_add_signed(delta))
        .ok_or_else(|| ClientError::invalid_input("days", days.to_string(), "Date out of range"))?;
    Ok(Reply::new(shifted))
}

fn set_person(args: Arguments) -> Result<Reply, BoxError> {
    let person: Record = args.get("person")?;
    let name = match person.get("name") {
        Value::Text(name) => name.clone(),
        _ => String::new(),
    };
    Ok(Reply::new(format!("Saved {name}")))
}

fn get_books(args: Arguments) -> Result<Reply, BoxError> {
    let tag: Option<String> = args.get("tag")?;
    let books = [
        ("Dune", 1965, 92, vec!["scifi", "classic"]),
        ("Emma", 1815, 80, vec!["classic"]),
        ("Neuromancer", 1984, 88, vec!["scifi", "cyberpunk"]),
    ];

    let selected: Vec<Value> = books
        .into_iter()
        .filter(|(_, _, _, tags)| {
            tag.as_deref()
                .is_none_or(|wanted| tags.iter().any(|t| *t == wanted))
        })
        .map(|(title, year, rating, tags)| {
            Value::Struct(
                Record::new()
                    .with("title", title)
                    .with("year", year)
                    .with("rating", rating)
                    .with("tags", tags),
            )
        })
        .collect();
    Ok(Reply::new(selected))
}

fn backup(_args: Arguments) -> Result<Reply, BoxError> {
    Err(Box::new(std::io::Error::other("storage offline")))
}
