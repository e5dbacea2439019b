//! # XML Format
//!
//! The `text/xml` counterpart of [`super::json`]. Values map to elements as follows:
//!
//! * Scalars are the text content of their element; `nil="true"` marks a null.
//! * Arrays hold one `<item>` child per element.
//! * Maps hold one `<item>` per entry, itself holding a `<key>` and a `<value>`.
//! * Structured values hold one child per attribute that is not unset, named after the
//!   attribute's wire name.
//!
//! Results are always wrapped in a `<result>` element, faults in an `<error>` element.
use super::DataFormat;
use super::scalar;
use crate::args::from_param;
use crate::error::{CallError, ClientError, EncodeError, Fault};
use crate::function::{Arguments, FunctionDefinition};
use crate::registry::TypeRegistry;
use crate::types::{DataType, Record, Value};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

/// The `text/xml` data format.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormat;

impl DataFormat for XmlFormat {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn accept_content_types(&self) -> &'static [&'static str] {
        &["text/xml", "application/xml"]
    }

    fn parse_arguments(
        &self,
        registry: &TypeRegistry,
        funcdef: &FunctionDefinition,
        body: &[u8],
    ) -> Result<Arguments, CallError> {
        let root = XmlElement::parse(body)?;
        let mut arguments = Arguments::new();

        if let Some(arg) = funcdef.body_arg() {
            let value = from_xml(registry, &arg.datatype, &root)
                .map_err(|e| e.with_fieldname(&arg.name))?;
            arguments.insert(arg.name.clone(), value);
            return Ok(arguments);
        }

        let mut unknown = Vec::new();
        for child in &root.children {
            let Some(arg) = funcdef.get_arg(&child.name) else {
                unknown.push(child.name.clone());
                continue;
            };
            let value = from_xml(registry, &arg.datatype, child)
                .map_err(|e| e.with_fieldname(&child.name))?;
            arguments.insert(child.name.clone(), value);
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
        _nest: bool,
    ) -> Result<Vec<u8>, CallError> {
        let mut out = String::new();
        write_value(&mut out, registry, "result", datatype, value)?;
        Ok(out.into_bytes())
    }

    fn encode_error(&self, fault: &Fault) -> Vec<u8> {
        let mut out = String::from("<error>");
        write_text_element(&mut out, "faultcode", fault.faultcode.as_str());
        write_text_element(&mut out, "faultstring", &fault.faultstring);
        match &fault.debuginfo {
            Some(debuginfo) => write_text_element(&mut out, "debuginfo", debuginfo),
            None => out.push_str("<debuginfo />"),
        }
        out.push_str("</error>");
        out.into_bytes()
    }
}

/// A parsed XML element: its name, attributes, text content and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parses a document and returns its root element.
    pub fn parse(body: &[u8]) -> Result<XmlElement, ClientError> {
        let malformed =
            |reason: String| ClientError::BadRequest(format!("Request is not valid XML: {reason}"));

        let text = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(Self::open(&start).map_err(malformed)?),
                Ok(Event::Empty(start)) => {
                    let element = Self::open(&start).map_err(malformed)?;
                    Self::attach(&mut stack, &mut root, element).map_err(malformed)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| malformed("unexpected closing tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, element).map_err(malformed)?;
                }
                Ok(Event::Text(content)) => {
                    if let Some(current) = stack.last_mut() {
                        let content = content.unescape().map_err(|e| malformed(e.to_string()))?;
                        current.text.push_str(&content);
                    }
                }
                Ok(Event::CData(content)) => {
                    if let Some(current) = stack.last_mut() {
                        let content =
                            std::str::from_utf8(&content).map_err(|e| malformed(e.to_string()))?;
                        current.text.push_str(content);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(malformed("unclosed element".to_string()));
        }
        root.ok_or_else(|| malformed("no root element".to_string()))
    }

    fn open(start: &BytesStart<'_>) -> Result<XmlElement, String> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((key, value.into_owned()));
        }
        Ok(XmlElement {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        element: XmlElement,
    ) -> Result<(), String> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => return Err("several root elements".to_string()),
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    fn is_nil(&self) -> bool {
        self.attribute("nil") == Some("true")
    }
}

/// Decodes an element as `datatype`.
pub fn from_xml(
    registry: &TypeRegistry,
    datatype: &DataType,
    element: &XmlElement,
) -> Result<Value, CallError> {
    if element.is_nil() {
        return Ok(Value::Null);
    }

    match datatype {
        DataType::Native(_) | DataType::User(_) => from_param(registry, datatype, &element.text),
        DataType::Array(item) => element
            .children
            .iter()
            .map(|child| from_xml(registry, item, child))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        DataType::Map(key_type, value_type) => {
            let mut entries = Vec::with_capacity(element.children.len());
            for item in &element.children {
                let (Some(key), Some(value)) = (item.child("key"), item.child("value")) else {
                    return Err(CallError::invalid_input(
                        "",
                        &item.text,
                        "Map entries need a key and a value",
                    ));
                };
                let entry_key = from_xml(registry, key_type, key)?;
                let entry_value = from_xml(registry, value_type, value)
                    .map_err(|e| e.with_fieldname(&key.text))?;
                entries.push((entry_key, entry_value));
            }
            Ok(Value::map_from(entries))
        }
        DataType::Struct(id) => {
            let struct_type = registry.struct_type(*id)?;

            let mut unknown: Vec<String> = element
                .children
                .iter()
                .filter(|child| struct_type.attribute(&child.name).is_none())
                .map(|child| child.name.clone())
                .collect();
            if !unknown.is_empty() {
                unknown.dedup();
                return Err(ClientError::UnknownAttribute {
                    fieldpath: Vec::new(),
                    attributes: unknown,
                }
                .into());
            }

            let mut record = Record::new();
            for attr in struct_type.attributes() {
                let Some(child) = element.child(attr.name()) else {
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
                        &child.text,
                        "Cannot set read only field.",
                    ));
                }
                let value = from_xml(registry, attr.datatype(), child)
                    .map_err(|e| e.with_fieldname(attr.name()))?;
                attr.write(&mut record, value)
                    .map_err(|reason| CallError::invalid_input(attr.name(), &child.text, reason))?;
            }

            struct_type
                .validate(Value::Struct(record))
                .map_err(|reason| CallError::invalid_input("", "", reason))
        }
    }
}

/// Writes `value` as an element named `tag`.
pub fn write_value(
    out: &mut String,
    registry: &TypeRegistry,
    tag: &str,
    datatype: &DataType,
    value: &Value,
) -> Result<(), CallError> {
    if value.is_unset() || value.is_null() {
        out.push_str(&format!("<{tag} nil=\"true\" />"));
        return Ok(());
    }

    let mismatch = || -> CallError {
        EncodeError::Mismatch {
            expected: registry.type_name(datatype),
            found: value.kind(),
        }
        .into()
    };

    match datatype {
        DataType::Native(_) | DataType::User(_) => {
            let text = scalar::to_text(registry, datatype, value)?;
            write_text_element(out, tag, &text);
        }
        DataType::Array(item) => {
            let Value::Array(items) = value else {
                return Err(mismatch());
            };
            out.push_str(&format!("<{tag}>"));
            for v in items {
                write_value(out, registry, "item", item, v)?;
            }
            out.push_str(&format!("</{tag}>"));
        }
        DataType::Map(key_type, value_type) => {
            let Value::Map(entries) = value else {
                return Err(mismatch());
            };
            out.push_str(&format!("<{tag}>"));
            for (key, entry) in entries {
                out.push_str("<item>");
                write_value(out, registry, "key", key_type, key)?;
                write_value(out, registry, "value", value_type, entry)?;
                out.push_str("</item>");
            }
            out.push_str(&format!("</{tag}>"));
        }
        DataType::Struct(id) => {
            let Value::Struct(record) = value else {
                return Err(mismatch());
            };
            let struct_type = registry.struct_type(*id)?;
            out.push_str(&format!("<{tag}>"));
            for attr in struct_type.attributes() {
                let field = attr.read(record);
                if field.is_unset() {
                    continue;
                }
                write_value(out, registry, attr.name(), attr.datatype(), &field)?;
            }
            out.push_str(&format!("</{tag}>"));
        }
    }
    Ok(())
}

fn write_text_element(out: &mut String, tag: &str, text: &str) {
    out.push_str(&format!("<{tag}>{}</{tag}>", escape(text)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionDecl, Reply};
    use crate::types::{AttributeDecl, NativeType, StructDecl, TypeToken};

    fn person_registry() -> (TypeRegistry, DataType) {
        let mut registry = TypeRegistry::new();
        let person = registry
            .register_struct(
                StructDecl::new("Person")
                    .attribute(AttributeDecl::new("name", NativeType::Text))
                    .attribute(AttributeDecl::new("age", NativeType::Integer))
                    .attribute(AttributeDecl::new("parent", "Person"))
                    .attribute(AttributeDecl::new("tags", TypeToken::array("text")))
                    .attribute(AttributeDecl::new("counts", TypeToken::map("text", "int"))),
            )
            .unwrap();
        (registry, person)
    }

    fn encode(registry: &TypeRegistry, datatype: &DataType, value: &Value) -> String {
        let mut out = String::new();
        write_value(&mut out, registry, "value", datatype, value).unwrap();
        out
    }

    #[test]
    fn structured_values_round_trip() {
        let (registry, person) = person_registry();
        let value = Value::Struct(
            Record::new()
                .with("name", "Ann <& Co>")
                .with("age", 31)
                .with("parent", Value::Struct(Record::new().with("name", "Bea")))
                .with("tags", vec!["a", "b"])
                .with(
                    "counts",
                    Value::map_from([(Value::from("x"), Value::Int(1))]),
                ),
        );

        let xml = encode(&registry, &person, &value);
        assert_eq!(
            xml,
            "<value><name>Ann &lt;&amp; Co&gt;</name><age>31</age>\
             <parent><name>Bea</name></parent>\
             <tags><item>a</item><item>b</item></tags>\
             <counts><item><key>x</key><value>1</value></item></counts></value>"
        );

        let element = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(from_xml(&registry, &person, &element).unwrap(), value);
    }

    #[test]
    fn null_is_nil_and_unset_is_omitted() {
        let (registry, person) = person_registry();
        let value = Value::Struct(Record::new().with("age", Value::Null));

        let xml = encode(&registry, &person, &value);
        assert_eq!(xml, "<value><age nil=\"true\" /></value>");

        let element = XmlElement::parse(xml.as_bytes()).unwrap();
        assert_eq!(from_xml(&registry, &person, &element).unwrap(), value);
    }

    #[test]
    fn unknown_attributes_are_named() {
        let (registry, person) = person_registry();
        let element = XmlElement::parse(b"<value><name>a</name><z>2</z></value>").unwrap();

        let err = from_xml(&registry, &person, &element).unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::UnknownAttribute { ref attributes, .. })
                if attributes == &["z"]
        ));
        assert_eq!(
            err.with_fieldname("who").to_string(),
            "Unknown attribute for argument who: z"
        );
    }

    #[test]
    fn arguments_and_results() {
        let registry = TypeRegistry::new();
        let funcdef = FunctionDecl::new("multiply", |_| Ok(Reply::empty()))
            .arg("a", NativeType::Integer)
            .arg("b", NativeType::Integer)
            .resolve(&registry)
            .unwrap();

        let args = XmlFormat
            .parse_arguments(&registry, &funcdef, b"<parameters><a>4</a><b>5</b></parameters>")
            .unwrap();
        assert_eq!(args.value("a"), Some(&Value::Int(4)));
        assert_eq!(args.value("b"), Some(&Value::Int(5)));

        let err = XmlFormat
            .parse_arguments(&registry, &funcdef, b"<parameters><a>x</a></parameters>")
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Client(ClientError::InvalidInput { ref field, .. }) if field == "a"
        ));

        let body = XmlFormat
            .encode_result(&registry, &DataType::Native(NativeType::Integer), &Value::Int(20), true)
            .unwrap();
        assert_eq!(body, b"<result>20</result>");
    }

    #[test]
    fn fault_shape() {
        let body = XmlFormat.encode_error(&Fault::client("bad <input>"));
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "<error><faultcode>Client</faultcode>\
             <faultstring>bad &lt;input&gt;</faultstring><debuginfo /></error>"
        );
    }

    #[test]
    fn malformed_documents_are_client_errors() {
        assert!(matches!(
            XmlElement::parse(b"<a><b></a>"),
            Err(ClientError::BadRequest(_))
        ));
        assert!(matches!(XmlElement::parse(b""), Err(ClientError::BadRequest(_))));
    }
}
