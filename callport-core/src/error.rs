//! # Errors and Faults
//!
//! Every failure that can happen while serving a call ends up as a [`CallError`]. The
//! Dispatcher classifies it as a **Client** or **Server** fault and hands the protocol a
//! format-independent [`Fault`] to encode.
//!
//! * [`ClientError`]: the caller sent something wrong. The message is safe to show.
//! * Everything else (handler failures, panics, result encoding problems, registry misuse)
//!   is a server fault. Only a generic message reaches the caller; the detail goes to the
//!   server log and, when debugging is enabled, to `debuginfo`.
use crate::BoxError;
use crate::registry::RegistryError;
use http::StatusCode;
use serde::Serialize;
use std::error::Error;

pub(crate) const SERVER_FAULTSTRING: &str = "Internal server error";

/// Errors caused by the request itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid input for field/attribute {field}. Value: '{value}'. {reason}")]
    InvalidInput {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing argument: \"{0}\"")]
    MissingArgument(String),

    #[error("Unknown argument: \"{}\"", .0.join(", "))]
    UnknownArgument(Vec<String>),

    #[error("Unknown attribute for argument {}: {}", .fieldpath.join("."), .attributes.join(", "))]
    UnknownAttribute {
        fieldpath: Vec<String>,
        attributes: Vec<String>,
    },

    #[error("Unknown function path: {0}")]
    UnknownFunction(String),

    #[error("Parameter {0} was given several times")]
    SuppliedTwice(String),

    #[error("None of the following protocols can handle this request: {}", .0.join(", "))]
    NoProtocol(Vec<String>),

    #[error("Unacceptable media type: {0}")]
    NotAcceptable(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    BadRequest(String),
}

impl ClientError {
    pub fn invalid_input(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ClientError::InvalidInput {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClientError::UnknownFunction(_) => StatusCode::NOT_FOUND,
            ClientError::NoProtocol(_) | ClientError::NotAcceptable(_) => {
                StatusCode::NOT_ACCEPTABLE
            }
            ClientError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn faultstring(&self) -> String {
        self.to_string()
    }
}

/// Raised when a returned value does not fit its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Cannot encode a value of kind '{found}' as '{expected}'")]
    Mismatch { expected: String, found: &'static str },

    #[error("Cannot encode non-finite float {0}")]
    NonFiniteFloat(String),

    #[error("Cannot encode non UTF-8 bytes as text")]
    InvalidUtf8,

    #[error("Conversion of user type '{name}' failed: {reason}")]
    UserType { name: String, reason: String },
}

/// Anything that can abort a call after the protocol has been selected.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Function failed")]
    Handler(#[source] BoxError),

    #[error("Function panicked: {0}")]
    Panicked(String),
}

impl CallError {
    /// Classifies an error returned by a function body.
    ///
    /// A [`ClientError`] raised on purpose by the function stays a client fault.
    pub fn from_handler(err: BoxError) -> Self {
        match err.downcast::<ClientError>() {
            Ok(client) => CallError::Client(*client),
            Err(err) => CallError::Handler(err),
        }
    }

    pub(crate) fn invalid_input(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CallError::Client(ClientError::invalid_input(field, value, reason))
    }

    /// Records the name of the enclosing field while the error bubbles outwards through
    /// nested decodes.
    pub fn with_fieldname(mut self, name: &str) -> Self {
        match &mut self {
            CallError::Client(ClientError::UnknownAttribute { fieldpath, .. }) => {
                fieldpath.insert(0, name.to_string());
            }
            CallError::Client(ClientError::InvalidInput { field, .. }) => {
                *field = if field.is_empty() {
                    name.to_string()
                } else {
                    format!("{name}.{field}")
                };
            }
            _ => {}
        }
        self
    }

    /// Sets the field of an [`ClientError::InvalidInput`] that does not name one yet.
    pub(crate) fn in_field(mut self, name: &str) -> Self {
        if let CallError::Client(ClientError::InvalidInput { field, .. }) = &mut self {
            if field.is_empty() {
                *field = name.to_string();
            }
        }
        self
    }

    pub fn is_client(&self) -> bool {
        matches!(self, CallError::Client(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CallError::Client(err) => err.status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the error into the uniform fault payload.
    ///
    /// Client faults never carry debug information. Server faults only expose a generic
    /// message; the error chain goes to `debuginfo` when `debug` is set.
    pub fn to_fault(&self, debug: bool) -> Fault {
        match self {
            CallError::Client(err) => Fault::client(err.faultstring()),
            err => Fault {
                faultcode: FaultCode::Server,
                faultstring: SERVER_FAULTSTRING.to_string(),
                debuginfo: debug.then(|| error_chain(err)),
            },
        }
    }
}

/// `Client` or `Server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultCode {
    Client,
    Server,
}

impl FaultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::Client => "Client",
            FaultCode::Server => "Server",
        }
    }
}

/// The format-independent error payload sent back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub faultcode: FaultCode,
    pub faultstring: String,
    pub debuginfo: Option<String>,
}

impl Fault {
    pub fn client(faultstring: impl Into<String>) -> Self {
        Self {
            faultcode: FaultCode::Client,
            faultstring: faultstring.into(),
            debuginfo: None,
        }
    }
}

/// Renders an error followed by its `source()` chain, one cause per line.
pub(crate) fn error_chain(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk on fire")]
    struct DiskError;

    #[derive(Debug, thiserror::Error)]
    #[error("could not save")]
    struct SaveError(#[source] DiskError);

    #[test]
    fn fieldnames_accumulate_outwards() {
        let err = CallError::Client(ClientError::UnknownAttribute {
            fieldpath: vec![],
            attributes: vec!["z".to_string()],
        })
        .with_fieldname("inner")
        .with_fieldname("outer");

        assert_eq!(
            err.to_string(),
            "Unknown attribute for argument outer.inner: z"
        );

        let err = CallError::invalid_input("", "x", "bad")
            .with_fieldname("age")
            .with_fieldname("person");
        assert!(matches!(
            err,
            CallError::Client(ClientError::InvalidInput { ref field, .. }) if field == "person.age"
        ));
    }

    #[test]
    fn handler_client_errors_stay_client_faults() {
        let err: BoxError = Box::new(ClientError::BadRequest("nope".to_string()));
        let err = CallError::from_handler(err);
        assert!(err.is_client());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: BoxError = Box::new(SaveError(DiskError));
        let err = CallError::from_handler(err);
        assert!(!err.is_client());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn server_faults_hide_detail_unless_debugging() {
        let err = CallError::from_handler(Box::new(SaveError(DiskError)));

        let fault = err.to_fault(false);
        assert_eq!(fault.faultcode, FaultCode::Server);
        assert_eq!(fault.faultstring, SERVER_FAULTSTRING);
        assert_eq!(fault.debuginfo, None);

        let fault = err.to_fault(true);
        assert_eq!(
            fault.debuginfo.as_deref(),
            Some("Function failed\nCaused by: could not save\nCaused by: disk on fire")
        );
    }

    #[test]
    fn client_faults_never_carry_debuginfo() {
        let fault = CallError::from(ClientError::MissingArgument("b".to_string())).to_fault(true);
        assert_eq!(fault.faultcode, FaultCode::Client);
        assert_eq!(fault.faultstring, "Missing argument: \"b\"");
        assert_eq!(fault.debuginfo, None);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ClientError::UnknownFunction("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ClientError::NotAcceptable("x".into()).status_code(),
            StatusCode::NOT_ACCEPTABLE
        );
        assert_eq!(
            ClientError::UnsupportedMediaType("x".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ClientError::SuppliedTwice("a".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
