//! # Dispatcher
//!
//! [`Root`] owns the exposed functions and the protocols, and turns one inbound
//! `http::Request<Bytes>` into one `http::Response<Bytes>`.
//!
//! Every request walks the same states (see [`Phase`]):
//!
//! 1. **SelectProtocol**: the protocol named by the override query parameter, or the first
//!    registered protocol whose `accept` says yes. A client error raised by a protocol that
//!    declined is remembered and reported if nobody accepts.
//! 2. **ExtractPath** and **ResolveFunction**: the protocol finds the operation path, which
//!    must name an exposed function.
//! 3. **BindArguments**: wire arguments, host arguments (overridden by the wire), mandatory
//!    check and defaults.
//! 4. **Invoke**: the function body runs. Panics are caught.
//! 5. **EncodeOutcome**: the result, or a fault built from whatever error aborted a previous
//!    state, is encoded by the protocol.
//!
//! No error escapes [`Root::dispatch`]: the host always gets a response.
mod context;

pub use context::{CallContext, Outcome, Phase};

use crate::args::{HostArguments, Params, apply_defaults, args_from_args, check_arguments, combine};
use crate::config::RootConfig;
use crate::error::{CallError, ClientError, error_chain};
use crate::function::{Api, Arguments, FunctionDecl, FunctionDefinition, Reply};
use crate::protocol::{Encoded, Environment, Protocol};
use crate::registry::{RegistryError, TypeRegistry};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// The entry point of the library: exposed functions, protocols and configuration.
pub struct Root {
    registry: Arc<TypeRegistry>,
    api: Api,
    protocols: Vec<Box<dyn Protocol>>,
    config: RootConfig,
}

impl Root {
    /// Creates a root over a fully registered type registry.
    ///
    /// Every structured type is resolved here, so a dangling forward reference fails at
    /// startup rather than on the first request that touches it.
    pub fn new(registry: Arc<TypeRegistry>, config: RootConfig) -> Result<Self, RegistryError> {
        registry.complete()?;
        Ok(Self {
            registry,
            api: Api::new(),
            protocols: Vec::new(),
            config,
        })
    }

    /// Registers a protocol. Protocols are tried in registration order.
    pub fn add_protocol(&mut self, protocol: impl Protocol + 'static) -> &mut Self {
        self.protocols.push(Box::new(protocol));
        self
    }

    /// Resolves a function declaration and exposes it under its path.
    pub fn expose(&mut self, decl: FunctionDecl) -> Result<&FunctionDefinition, RegistryError> {
        let definition = decl.resolve(&self.registry)?;
        let path = definition.path.clone();
        self.api.add(definition)?;
        self.api.get(&path).ok_or_else(|| RegistryError::InvalidFunction {
            name: path.join("/"),
            reason: "function vanished after registration".to_string(),
        })
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn protocols(&self) -> impl Iterator<Item = &dyn Protocol> {
        self.protocols.iter().map(|protocol| protocol.as_ref())
    }

    /// Serves one request.
    pub fn dispatch(&self, request: &Request<Bytes>) -> Response<Bytes> {
        self.dispatch_with(request, &HostArguments::default())
    }

    /// Serves one request with extra arguments extracted by the host. Arguments found in
    /// the request itself take precedence over `host`.
    pub fn dispatch_with<'r>(
        &'r self,
        request: &'r Request<Bytes>,
        host: &HostArguments,
    ) -> Response<Bytes> {
        let protocol = match self.select_protocol(request) {
            Ok(protocol) => protocol,
            Err(err) => {
                tracing::debug!(
                    uri = %request.uri(),
                    error = %err,
                    "no protocol accepted the request"
                );
                return respond(err.status_code(), Encoded::new(err.to_string(), "text/plain"));
            }
        };
        tracing::debug!(protocol = protocol.name(), uri = %request.uri(), "protocol selected");

        let env = self.environment();
        let mut contexts = match protocol.iter_calls(request, &env) {
            Ok(contexts) => contexts,
            Err(err) => return self.fail(protocol, None, err.into()),
        };
        if contexts.len() != 1 {
            let err = ClientError::BadRequest(format!(
                "Expected exactly one call per request, got {}",
                contexts.len()
            ));
            return self.fail(protocol, None, err.into());
        }
        let Some(mut context) = contexts.pop() else {
            let err = ClientError::BadRequest("Empty request".to_string());
            return self.fail(protocol, None, err.into());
        };

        match self.run(protocol, &mut context, host, &env) {
            Ok((status, encoded)) => {
                context.outcome = Some(Outcome::Success { status });
                context.advance(Phase::Done);
                respond(status, encoded)
            }
            Err(err) => self.fail(protocol, Some(&mut context), err),
        }
    }

    fn environment(&self) -> Environment<'_> {
        Environment {
            registry: &self.registry,
            api: &self.api,
            config: &self.config,
        }
    }

    fn select_protocol(&self, request: &Request<Bytes>) -> Result<&dyn Protocol, ClientError> {
        let params = Params::from_query(request.uri().query().unwrap_or_default());
        if let Some(name) = params.last(&self.config.protocol_param) {
            return self
                .protocols()
                .find(|protocol| protocol.name() == name)
                .ok_or_else(|| ClientError::NoProtocol(vec![name.to_string()]));
        }

        let mut declined = None;
        for protocol in self.protocols() {
            match protocol.accept(request) {
                Ok(true) => return Ok(protocol),
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(
                        protocol = protocol.name(),
                        error = %err,
                        "protocol declined the request"
                    );
                    declined.get_or_insert(err);
                }
            }
        }

        Err(declined.unwrap_or_else(|| {
            ClientError::NoProtocol(self.protocols().map(|p| p.name().to_string()).collect())
        }))
    }

    fn run<'r>(
        &'r self,
        protocol: &dyn Protocol,
        context: &mut CallContext<'r>,
        host: &HostArguments,
        env: &Environment<'_>,
    ) -> Result<(StatusCode, Encoded), CallError> {
        context.advance(Phase::ExtractPath);
        let path = protocol.extract_path(context, env).ok_or_else(|| {
            ClientError::UnknownFunction(context.request.uri().path().to_string())
        })?;
        tracing::debug!(path = %path.join("/"), "operation path extracted");
        context.path = Some(path);

        context.advance(Phase::ResolveFunction);
        let path = context.path.as_deref().unwrap_or_default();
        let funcdef = self
            .api
            .get(path)
            .ok_or_else(|| ClientError::UnknownFunction(path.join("/")))?;
        context.funcdef = Some(funcdef);

        context.advance(Phase::BindArguments);
        let wire = protocol.read_arguments(context, funcdef, env)?;
        let host = args_from_args(&self.registry, funcdef, host)?;
        let mut arguments = combine([host, wire], true)?;
        check_arguments(funcdef, &arguments)?;
        apply_defaults(funcdef, &mut arguments);
        context.arguments = Some(arguments.clone());

        context.advance(Phase::Invoke);
        let reply = invoke(funcdef, arguments)?;

        context.advance(Phase::EncodeOutcome);
        let status = reply.status_code.unwrap_or(funcdef.status_code);
        let encoded = protocol.encode_result(context, funcdef, &reply.value, env)?;
        Ok((status, encoded))
    }

    fn fail(
        &self,
        protocol: &dyn Protocol,
        context: Option<&mut CallContext<'_>>,
        err: CallError,
    ) -> Response<Bytes> {
        let fault = err.to_fault(self.config.debug);
        let status = err.status_code();

        if err.is_client() {
            tracing::debug!(status = %status, fault = %fault.faultstring, "client fault");
        } else {
            tracing::error!(status = %status, error = %error_chain(&err), "server fault");
        }

        let encoded = match context {
            Some(context) => {
                context.advance(Phase::EncodeOutcome);
                let encoded = protocol.encode_error(Some(&*context), &fault);
                context.outcome = Some(Outcome::Failure { fault, status });
                context.advance(Phase::Done);
                encoded
            }
            None => protocol.encode_error(None, &fault),
        };
        respond(status, encoded)
    }
}

/// Runs a function body, turning a panic into a server error.
fn invoke(funcdef: &FunctionDefinition, arguments: Arguments) -> Result<Reply, CallError> {
    match catch_unwind(AssertUnwindSafe(|| funcdef.invoke(arguments))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(CallError::Panicked(message))
        }
    }
}

fn respond(status: StatusCode, encoded: Encoded) -> Response<Bytes> {
    let mut response = Response::new(encoded.body);
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(&format!("{}; charset=UTF-8", encoded.content_type)) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::protocol::RestProtocol;
    use crate::types::{NativeType, Value};

    /// A protocol that either refuses every request or splits each one into two calls.
    enum Stub {
        Refuse,
        TwoCalls,
    }

    impl Protocol for Stub {
        fn name(&self) -> &str {
            match self {
                Stub::Refuse => "refuse",
                Stub::TwoCalls => "two-calls",
            }
        }

        fn content_types(&self) -> Vec<&'static str> {
            vec!["text/plain"]
        }

        fn accept(&self, _request: &Request<Bytes>) -> Result<bool, ClientError> {
            match self {
                Stub::Refuse => Err(ClientError::NotAcceptable("text/csv".to_string())),
                Stub::TwoCalls => Ok(true),
            }
        }

        fn iter_calls<'r>(
            &self,
            request: &'r Request<Bytes>,
            _env: &Environment<'_>,
        ) -> Result<Vec<CallContext<'r>>, ClientError> {
            Ok(vec![CallContext::new(request), CallContext::new(request)])
        }

        fn extract_path(
            &self,
            _context: &CallContext<'_>,
            _env: &Environment<'_>,
        ) -> Option<Vec<String>> {
            None
        }

        fn read_arguments(
            &self,
            _context: &CallContext<'_>,
            _funcdef: &FunctionDefinition,
            _env: &Environment<'_>,
        ) -> Result<Arguments, CallError> {
            Ok(Arguments::new())
        }

        fn encode_result(
            &self,
            _context: &CallContext<'_>,
            _funcdef: &FunctionDefinition,
            _value: &Value,
            _env: &Environment<'_>,
        ) -> Result<Encoded, CallError> {
            Ok(Encoded::new(Vec::new(), "text/plain"))
        }

        fn encode_error(&self, _context: Option<&CallContext<'_>>, fault: &Fault) -> Encoded {
            Encoded::new(fault.faultstring.clone(), "text/plain")
        }
    }

    fn root() -> Root {
        let mut root = Root::new(Arc::new(TypeRegistry::new()), RootConfig::default()).unwrap();
        root.add_protocol(RestProtocol::new());
        root.expose(
            FunctionDecl::new("multiply", |args| {
                let a: i64 = args.get("a")?;
                let b: i64 = args.get("b")?;
                Ok(Reply::new(a * b))
            })
            .arg("a", NativeType::Integer)
            .arg("b", NativeType::Integer)
            .returns(NativeType::Integer),
        )
        .unwrap();
        root.expose(
            FunctionDecl::new("explode", |_| panic!("boom")).returns(NativeType::Integer),
        )
        .unwrap();
        root
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder().uri(uri).body(Bytes::new()).unwrap()
    }

    #[test]
    fn query_parameters_reach_the_function() {
        let response = root().dispatch(&get("/multiply?a=4&b=5"));

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=UTF-8"
        );
        assert_eq!(response.body().as_ref(), br#"{"result":20}"#);
    }

    #[test]
    fn host_arguments_are_overridden_by_the_wire() {
        let host = HostArguments::new().keyword("a", "2").keyword("b", "3");

        let response = root().dispatch_with(&get("/multiply?a=10"), &host);
        assert_eq!(response.body().as_ref(), br#"{"result":30}"#);
    }

    #[test]
    fn panics_become_server_faults() {
        let response = root().dispatch(&get("/explode"));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["faultcode"], "Server");
        assert_eq!(json["faultstring"], "Internal server error");
        assert!(json["debuginfo"].is_null());
    }

    #[test]
    fn unknown_protocol_override() {
        let response = root().dispatch(&get("/multiply?a=1&b=2&_protocol=soap"));

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=UTF-8");
    }

    #[test]
    fn protocol_override_selects_by_name() {
        let response = root().dispatch(&get("/multiply?a=1&b=2&_protocol=rest"));
        assert_eq!(response.body().as_ref(), br#"{"result":2}"#);
    }

    #[test]
    fn no_protocol_registered() {
        let root = Root::new(Arc::new(TypeRegistry::new()), RootConfig::default()).unwrap();
        let response = root.dispatch(&get("/multiply"));

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn several_calls_in_one_request_are_rejected() {
        let mut root = root();
        root.protocols.insert(0, Box::new(Stub::TwoCalls));

        let response = root.dispatch(&get("/multiply?a=4&b=5"));

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().as_ref(), b"Expected exactly one call per request, got 2");
    }

    #[test]
    fn declining_protocol_falls_through_to_the_next_one() {
        let mut refusing =
            Root::new(Arc::new(TypeRegistry::new()), RootConfig::default()).unwrap();
        refusing.add_protocol(Stub::Refuse);
        let response = refusing.dispatch(&get("/multiply?a=4&b=5"));
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(response.body().as_ref(), b"Unacceptable media type: text/csv");

        let mut root = root();
        root.protocols.insert(0, Box::new(Stub::Refuse));
        let response = root.dispatch(&get("/multiply?a=4&b=5"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#"{"result":20}"#);
    }
}
