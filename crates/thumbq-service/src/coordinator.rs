//! Turns one received request into (at most) one handled response.

use std::io::{Read, Write};

use bytes::Bytes;
use thumbq_frame::{
    check_payload_length, decode_header, encode_header, split_single, HeaderError, RequestHeader,
    ResponseHeader,
};
use thumbq_sandbox::SandboxOutcome;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::executor::Executor;
use crate::message::Message;

/// Why a request ended up without a result.
#[derive(Debug, thiserror::Error)]
enum Unhandled {
    #[error("request has no payload part")]
    Incomplete,

    #[error("bad request header: {0}")]
    Request(#[source] HeaderError),

    #[error("executor: {0}")]
    Outcome(SandboxOutcome),

    #[error("executor produced no result")]
    NoResult,

    #[error("bad executor output: {0}")]
    Output(#[source] HeaderError),

    #[error("result is {actual} bytes but header says {declared}")]
    ResultLength { declared: u64, actual: usize },
}

/// Validates requests and hands them to an [`Executor`].
///
/// Every failure is logged and leaves the request unhandled; the
/// [`RequestContext`] then answers with the empty header.
#[derive(Debug)]
pub struct Coordinator<E> {
    executor: E,
}

impl<E: Executor> Coordinator<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Process the request held by `ctx`. Returns true when it was handled.
    pub fn process<R: Read, W: Write>(&self, ctx: &mut RequestContext<'_, R, W>) -> bool {
        let Some(message) = ctx.message() else {
            return false;
        };
        match self.evaluate(message) {
            Ok((control, result)) => {
                debug!(len = result.len(), "request handled");
                ctx.respond(control, result);
                true
            }
            Err(reason) => {
                warn!(reason = %reason, "request not handled");
                false
            }
        }
    }

    fn evaluate(&self, message: &Message) -> Result<(Bytes, Bytes), Unhandled> {
        let payload = message.attachment().ok_or(Unhandled::Incomplete)?;

        let (request, _) =
            decode_header::<RequestHeader>(message.control()).map_err(Unhandled::Request)?;
        check_payload_length(&request, payload.len()).map_err(Unhandled::Request)?;

        let output = match self.executor.execute(message.control(), payload) {
            SandboxOutcome::Success(output) => output,
            other => return Err(Unhandled::Outcome(other)),
        };
        if output.is_empty() {
            return Err(Unhandled::NoResult);
        }

        let (response, result) =
            split_single::<ResponseHeader>(output.as_slice()).map_err(Unhandled::Output)?;
        if response.length != result.len() as u64 {
            return Err(Unhandled::ResultLength {
                declared: response.length,
                actual: result.len(),
            });
        }

        let control = encode_header(&response).map_err(Unhandled::Output)?;
        Ok((control, Bytes::copy_from_slice(result)))
    }
}
