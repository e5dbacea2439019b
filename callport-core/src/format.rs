//! # Data Formats
//!
//! A [`DataFormat`] turns request bodies into [`Arguments`] and results or faults into
//! response bodies, walking the Type Model of the function being called.
//!
//! Two formats ship with the crate:
//!
//! * [`json::JsonFormat`]: `application/json`, extension `.json`.
//! * [`xml::XmlFormat`]: `text/xml`, extension `.xml`.
//!
//! Both produce the same native value graph for the same input, they only differ in wire
//! shape.
pub mod json;
pub mod scalar;
pub mod xml;

use crate::error::{CallError, Fault};
use crate::function::{Arguments, FunctionDefinition};
use crate::registry::TypeRegistry;
use crate::types::{DataType, Value};

pub use json::JsonFormat;
pub use xml::XmlFormat;

/// A wire format usable by protocols.
pub trait DataFormat: Send + Sync {
    /// Short name, also used as the path extension that selects the format.
    fn name(&self) -> &'static str;

    /// Media type of the bodies this format produces.
    fn content_type(&self) -> &'static str;

    /// Media types this format can decode.
    fn accept_content_types(&self) -> &'static [&'static str];

    /// Decodes a request body into arguments.
    ///
    /// When the function declares a body argument, the whole body is that argument's
    /// value. Otherwise the body is an object whose members are arguments.
    fn parse_arguments(
        &self,
        registry: &TypeRegistry,
        funcdef: &FunctionDefinition,
        body: &[u8],
    ) -> Result<Arguments, CallError>;

    /// Encodes a result value. With `nest`, the value is wrapped in a `result` member.
    fn encode_result(
        &self,
        registry: &TypeRegistry,
        datatype: &DataType,
        value: &Value,
        nest: bool,
    ) -> Result<Vec<u8>, CallError>;

    fn encode_error(&self, fault: &Fault) -> Vec<u8>;
}
