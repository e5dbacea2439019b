//! # REST Protocol
//!
//! Serves calls addressed by URL path (`/multiply`, `/books/get.json`) whose arguments come
//! from the query string, a url-encoded form or a body in one of the configured data
//! formats.
//!
//! The output format is chosen in this order: a path extension naming a format (`.json`,
//! `.xml`), the `Accept` header, the request `Content-Type`, then the first configured
//! format.
use super::negotiate::{best_match, essence};
use super::{Encoded, Environment, Protocol};
use crate::args::{BODY_PARAM, FORM_CONTENT_TYPE, Params, args_from_body, args_from_params, combine};
use crate::error::{CallError, ClientError, Fault};
use crate::format::{DataFormat, JsonFormat, XmlFormat};
use crate::function::{Arguments, FunctionDefinition};
use crate::root::CallContext;
use crate::types::Value;
use bytes::Bytes;
use http::Request;
use http::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;

/// The REST protocol over a list of data formats.
#[derive(Clone)]
pub struct RestProtocol {
    dataformats: Vec<Arc<dyn DataFormat>>,
}

impl Default for RestProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl RestProtocol {
    /// JSON first, then XML.
    pub fn new() -> Self {
        Self::with_formats(vec![Arc::new(JsonFormat), Arc::new(XmlFormat)])
    }

    pub fn with_formats(dataformats: Vec<Arc<dyn DataFormat>>) -> Self {
        Self { dataformats }
    }

    pub fn dataformats(&self) -> &[Arc<dyn DataFormat>] {
        &self.dataformats
    }

    fn format_by_extension(&self, path: &str) -> Option<&Arc<dyn DataFormat>> {
        let last = path.rsplit('/').next()?;
        self.dataformats.iter().find(|format| {
            last.strip_suffix(format.name())
                .is_some_and(|stem| stem.ends_with('.'))
        })
    }

    fn format_by_accept(&self, accept: &str) -> Option<&Arc<dyn DataFormat>> {
        let offered: Vec<&'static str> = self
            .dataformats
            .iter()
            .flat_map(|format| {
                std::iter::once(format.content_type())
                    .chain(format.accept_content_types().iter().copied())
            })
            .collect();
        let chosen = best_match(accept, &offered)?;
        self.format_by_mime(chosen)
    }

    fn format_by_mime(&self, mimetype: &str) -> Option<&Arc<dyn DataFormat>> {
        self.dataformats.iter().find(|format| {
            format.content_type() == mimetype || format.accept_content_types().contains(&mimetype)
        })
    }

    fn output_format(&self, request: &Request<Bytes>) -> Option<Arc<dyn DataFormat>> {
        self.format_by_extension(request.uri().path())
            .or_else(|| header(request, ACCEPT).and_then(|accept| self.format_by_accept(accept)))
            .or_else(|| {
                header(request, CONTENT_TYPE)
                    .and_then(essence)
                    .and_then(|mimetype| self.format_by_mime(&mimetype))
            })
            .or_else(|| self.dataformats.first())
            .cloned()
    }

    fn error_format(&self, context: Option<&CallContext<'_>>) -> Option<Arc<dyn DataFormat>> {
        context
            .and_then(|context| context.out_format.clone())
            .or_else(|| self.dataformats.first().cloned())
    }
}

fn header<'r>(request: &'r Request<Bytes>, name: http::header::HeaderName) -> Option<&'r str> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
}

impl Protocol for RestProtocol {
    fn name(&self) -> &str {
        "rest"
    }

    fn content_types(&self) -> Vec<&'static str> {
        self.dataformats
            .iter()
            .map(|format| format.content_type())
            .collect()
    }

    fn accept(&self, request: &Request<Bytes>) -> Result<bool, ClientError> {
        if self.format_by_extension(request.uri().path()).is_some() {
            return Ok(true);
        }

        if let Some(accept) = header(request, ACCEPT) {
            return match self.format_by_accept(accept) {
                Some(_) => Ok(true),
                None => Err(ClientError::NotAcceptable(accept.to_string())),
            };
        }

        if let Some(content_type) = header(request, CONTENT_TYPE) {
            let Some(mimetype) = essence(content_type) else {
                return Ok(true);
            };
            return if mimetype == FORM_CONTENT_TYPE || self.format_by_mime(&mimetype).is_some() {
                Ok(true)
            } else {
                Err(ClientError::UnsupportedMediaType(content_type.to_string()))
            };
        }

        Ok(true)
    }

    fn iter_calls<'r>(
        &self,
        request: &'r Request<Bytes>,
        _env: &Environment<'_>,
    ) -> Result<Vec<CallContext<'r>>, ClientError> {
        let mut context = CallContext::new(request);
        context.out_format = self.output_format(request);
        context.in_mime = header(request, CONTENT_TYPE).and_then(essence);
        Ok(vec![context])
    }

    fn extract_path(
        &self,
        context: &CallContext<'_>,
        env: &Environment<'_>,
    ) -> Option<Vec<String>> {
        let path = context.request.uri().path();
        let path = path.strip_prefix(env.config.webpath.trim_end_matches('/'))?;
        // The web path must end on a segment boundary.
        if !(path.is_empty() || path.starts_with('/')) {
            return None;
        }

        let mut segments: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(last) = segments.last_mut() {
            for format in &self.dataformats {
                let suffix = format!(".{}", format.name());
                if let Some(stem) = last.strip_suffix(&suffix) {
                    *last = stem.to_string();
                    break;
                }
            }
        }

        if env.api.get(&segments).is_some() {
            return Some(segments);
        }

        // A function one segment deeper may answer to this HTTP method.
        let method = context.request.method().as_str();
        env.api
            .iter()
            .find(|funcdef| {
                funcdef.path.len() == segments.len() + 1
                    && funcdef.path.starts_with(&segments)
                    && funcdef
                        .method()
                        .is_some_and(|wanted| wanted.eq_ignore_ascii_case(method))
            })
            .map(|funcdef| funcdef.path.clone())
            .or(Some(segments))
    }

    fn read_arguments(
        &self,
        context: &CallContext<'_>,
        funcdef: &FunctionDefinition,
        env: &Environment<'_>,
    ) -> Result<Arguments, CallError> {
        let request = context.request;
        let mut params = Params::from_query(request.uri().query().unwrap_or_default());
        params.remove(&env.config.protocol_param);

        let in_mime = context.in_mime.as_deref();
        if in_mime == Some(FORM_CONTENT_TYPE) {
            params.extend_form(&request.body()[..]);
        }

        let body_param = if request.body().is_empty() {
            params.remove(BODY_PARAM)
        } else {
            None
        };
        let (body, mimetype): (&[u8], Option<String>) = match &body_param {
            Some(body) => (
                body.as_bytes(),
                in_mime
                    .map(str::to_string)
                    .or_else(|| context.out_format.as_ref().map(|f| f.content_type().to_string())),
            ),
            None => (&request.body()[..], in_mime.map(str::to_string)),
        };

        let from_params = args_from_params(env.registry, funcdef, &params)?;
        let from_body = args_from_body(
            env.registry,
            funcdef,
            body,
            mimetype.as_deref(),
            &self.dataformats,
        )?;

        combine([from_params, from_body], false)
    }

    fn encode_result(
        &self,
        context: &CallContext<'_>,
        funcdef: &FunctionDefinition,
        value: &Value,
        env: &Environment<'_>,
    ) -> Result<Encoded, CallError> {
        let format = context
            .out_format
            .clone()
            .ok_or_else(|| ClientError::NotAcceptable(String::new()))?;

        let body = match &funcdef.return_type {
            Some(return_type) => {
                format.encode_result(env.registry, return_type, value, env.config.nest_result)?
            }
            None => Vec::new(),
        };
        Ok(Encoded::new(body, format.content_type()))
    }

    fn encode_error(&self, context: Option<&CallContext<'_>>, fault: &Fault) -> Encoded {
        match self.error_format(context) {
            Some(format) => Encoded::new(format.encode_error(fault), format.content_type()),
            None => Encoded::new(fault.faultstring.clone(), "text/plain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[test]
    fn accepts_by_extension_accept_and_content_type() {
        let rest = RestProtocol::new();

        assert_eq!(rest.accept(&request("/multiply.xml", &[("accept", "text/html")])), Ok(true));
        assert_eq!(rest.accept(&request("/multiply", &[("accept", "text/xml")])), Ok(true));
        assert_eq!(
            rest.accept(&request(
                "/multiply",
                &[("content-type", "application/json; charset=utf-8")],
            )),
            Ok(true)
        );
        assert_eq!(rest.accept(&request("/multiply", &[])), Ok(true));
    }

    #[test]
    fn distinguishes_not_acceptable_from_unsupported() {
        let rest = RestProtocol::new();

        assert_eq!(
            rest.accept(&request("/multiply", &[("accept", "image/png")])),
            Err(ClientError::NotAcceptable("image/png".to_string()))
        );
        assert_eq!(
            rest.accept(&request("/multiply", &[("content-type", "application/yaml")])),
            Err(ClientError::UnsupportedMediaType("application/yaml".to_string()))
        );
        assert_eq!(
            rest.accept(&request(
                "/multiply",
                &[("content-type", "application/x-www-form-urlencoded")],
            )),
            Ok(true)
        );
    }

    #[test]
    fn output_format_precedence() {
        let rest = RestProtocol::new();
        let name = |req: &Request<Bytes>| rest.output_format(req).map(|format| format.name());

        assert_eq!(
            name(&request("/f.xml", &[("accept", "application/json")])),
            Some("xml")
        );
        assert_eq!(
            name(&request(
                "/f",
                &[("accept", "application/xml"), ("content-type", "application/json")],
            )),
            Some("xml")
        );
        assert_eq!(name(&request("/f", &[("content-type", "text/xml")])), Some("xml"));
        assert_eq!(name(&request("/f", &[])), Some("json"));
    }
}
