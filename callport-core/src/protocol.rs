//! # Protocols
//!
//! A [`Protocol`] adapts one family of wire requests to the dispatcher: it decides whether
//! it can serve a request, finds the operation path in it, reads the call arguments and
//! encodes outcomes.
//!
//! The dispatcher ([`crate::root::Root`]) drives every protocol the same way:
//!
//! 1. [`Protocol::accept`] picks the protocol. Raising a [`ClientError`] here tells the
//!    dispatcher why the request cannot be served (e.g. an unacceptable media type).
//! 2. [`Protocol::iter_calls`] splits the request into call contexts.
//! 3. [`Protocol::extract_path`] and [`Protocol::read_arguments`] fill each context.
//! 4. [`Protocol::encode_result`] or [`Protocol::encode_error`] produce the response body.
pub mod negotiate;
pub mod rest;

pub use rest::RestProtocol;

use crate::config::RootConfig;
use crate::error::{CallError, ClientError, Fault};
use crate::function::{Api, Arguments, FunctionDefinition};
use crate::registry::TypeRegistry;
use crate::root::CallContext;
use crate::types::Value;
use bytes::Bytes;
use http::Request;

/// An encoded response body and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub body: Bytes,
    pub content_type: String,
}

impl Encoded {
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

/// Read-only view of the dispatcher state a protocol may consult.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'e> {
    pub registry: &'e TypeRegistry,
    pub api: &'e Api,
    pub config: &'e RootConfig,
}

/// A pluggable wire protocol.
pub trait Protocol: Send + Sync {
    /// Name used to force the protocol through the protocol override parameter.
    fn name(&self) -> &str;

    /// Media types this protocol can produce.
    fn content_types(&self) -> Vec<&'static str>;

    /// Whether this protocol can serve `request`.
    fn accept(&self, request: &Request<Bytes>) -> Result<bool, ClientError>;

    /// The calls carried by `request`. One by default.
    fn iter_calls<'r>(
        &self,
        request: &'r Request<Bytes>,
        _env: &Environment<'_>,
    ) -> Result<Vec<CallContext<'r>>, ClientError> {
        Ok(vec![CallContext::new(request)])
    }

    /// The operation path addressed by a call, if any.
    fn extract_path(&self, context: &CallContext<'_>, env: &Environment<'_>) -> Option<Vec<String>>;

    /// Binds the arguments the call carries on the wire.
    fn read_arguments(
        &self,
        context: &CallContext<'_>,
        funcdef: &FunctionDefinition,
        env: &Environment<'_>,
    ) -> Result<Arguments, CallError>;

    fn encode_result(
        &self,
        context: &CallContext<'_>,
        funcdef: &FunctionDefinition,
        value: &Value,
        env: &Environment<'_>,
    ) -> Result<Encoded, CallError>;

    /// Encodes a fault. `context` is `None` when the request could not be split into calls.
    fn encode_error(&self, context: Option<&CallContext<'_>>, fault: &Fault) -> Encoded;
}
