//! # Callport Core
//!
//! `callport-core` exposes strongly typed functions as web operations. It decodes request
//! data into typed arguments, calls the function, and encodes its result (or the error it
//! raised) in the wire format the caller asked for.
//!
//! The library never listens on a socket: the host hands it an `http::Request<Bytes>` and
//! writes back the `http::Response<Bytes>` it returns.
//!
//! ## Key Components
//!
//! * **[`types`]:** The Type Model. Native scalars, user types (enumerations, constrained
//!   scalars), arrays, maps and structured types, plus the dynamic [`types::Value`].
//! * **[`registry::TypeRegistry`]:** The catalog of named types. Structured types may refer
//!   to themselves or to types registered later; references resolve lazily.
//! * **[`function`]:** Function declarations, their resolved definitions and the [`function::Api`]
//!   catalog.
//! * **[`args`]:** The Argument Binder. Rebuilds nested values from flat query/form
//!   parameters, request bodies and host supplied arguments.
//! * **[`format`]:** The JSON and XML data formats.
//! * **[`protocol`]:** The protocol plug-in interface and the REST protocol.
//! * **[`root::Root`]:** The dispatcher tying everything together.
//!
//! ## Example
//!
//! ```
//! use callport_core::bytes::Bytes;
//! use callport_core::config::RootConfig;
//! use callport_core::function::{FunctionDecl, Reply};
//! use callport_core::http::Request;
//! use callport_core::protocol::RestProtocol;
//! use callport_core::registry::TypeRegistry;
//! use callport_core::root::Root;
//! use callport_core::types::NativeType;
//! use std::sync::Arc;
//!
//! let mut root = Root::new(Arc::new(TypeRegistry::new()), RootConfig::default()).unwrap();
//! root.add_protocol(RestProtocol::new());
//! root.expose(
//!     FunctionDecl::new("multiply", |args| {
//!         let a: i64 = args.get("a")?;
//!         let b: i64 = args.get("b")?;
//!         Ok(Reply::new(a * b))
//!     })
//!     .arg("a", NativeType::Integer)
//!     .arg("b", NativeType::Integer)
//!     .returns(NativeType::Integer),
//! )
//! .unwrap();
//!
//! let request = Request::post("/multiply")
//!     .header("content-type", "application/json")
//!     .body(Bytes::from_static(br#"{"a": 4, "b": 5}"#))
//!     .unwrap();
//! let response = root.dispatch(&request);
//!
//! assert_eq!(response.body().as_ref(), br#"{"result":20}"#);
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports `http` and `bytes` so hosts build requests with compatible
//! versions.
pub mod args;
pub mod config;
pub mod error;
pub mod format;
pub mod function;
pub mod protocol;
pub mod registry;
pub mod root;
pub mod types;

// Re-exports
pub use bytes;
pub use http;

/// Type alias for the standard boxed error returned by exposed functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
