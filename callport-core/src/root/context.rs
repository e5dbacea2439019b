use crate::error::Fault;
use crate::format::DataFormat;
use crate::function::{Arguments, FunctionDefinition};
use bytes::Bytes;
use http::{Request, StatusCode};
use std::sync::Arc;

/// Dispatch states, in order. A failure in any state jumps to [`Phase::EncodeOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    SelectProtocol,
    ExtractPath,
    ResolveFunction,
    BindArguments,
    Invoke,
    EncodeOutcome,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { status: StatusCode },
    Failure { fault: Fault, status: StatusCode },
}

/// State of one call, owned by the dispatcher for the duration of a request.
pub struct CallContext<'r> {
    pub request: &'r Request<Bytes>,
    pub path: Option<Vec<String>>,
    pub funcdef: Option<&'r FunctionDefinition>,
    pub arguments: Option<Arguments>,
    /// Format the protocol encodes outcomes with.
    pub out_format: Option<Arc<dyn DataFormat>>,
    /// Essence of the request `Content-Type`.
    pub in_mime: Option<String>,
    pub phase: Phase,
    pub outcome: Option<Outcome>,
}

impl<'r> CallContext<'r> {
    pub fn new(request: &'r Request<Bytes>) -> Self {
        Self {
            request,
            path: None,
            funcdef: None,
            arguments: None,
            out_format: None,
            in_mime: None,
            phase: Phase::SelectProtocol,
            outcome: None,
        }
    }

    pub(crate) fn advance(&mut self, phase: Phase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "call phase");
        self.phase = phase;
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("uri", self.request.uri())
            .field("path", &self.path)
            .field("function", &self.funcdef.map(|funcdef| &funcdef.name))
            .field("out_format", &self.out_format.as_ref().map(|format| format.name()))
            .field("in_mime", &self.in_mime)
            .field("phase", &self.phase)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
