//! Per-request scope that guarantees exactly one response per request.

use std::io::{Read, Write};

use bytes::Bytes;
use thumbq_frame::{encode_header, ResponseHeader};
use tracing::warn;

use crate::error::Result;
use crate::message::{Message, MessageSocket};

/// One receive/send cycle on a [`MessageSocket`].
///
/// Once [`receive`](Self::receive) has returned a message, a response goes
/// out exactly once: from [`finish`](Self::finish), or from `Drop` when the
/// cycle ends any other way (early return, `?`, panic). A handled request
/// gets its control and result parts; anything else gets only the empty
/// control header. Nothing is sent if no message was received.
pub struct RequestContext<'s, R: Read, W: Write> {
    socket: &'s mut MessageSocket<R, W>,
    message: Option<Message>,
    response: Option<(Bytes, Bytes)>,
    sent: bool,
}

impl<'s, R: Read, W: Write> RequestContext<'s, R, W> {
    pub fn new(socket: &'s mut MessageSocket<R, W>) -> Self {
        Self {
            socket,
            message: None,
            response: None,
            sent: false,
        }
    }

    /// Start a cycle for a message that was already received.
    pub fn with_message(socket: &'s mut MessageSocket<R, W>, message: Message) -> Self {
        Self {
            socket,
            message: Some(message),
            response: None,
            sent: false,
        }
    }

    /// Receive the request for this cycle.
    ///
    /// Returns `Ok(false)` when there is no request (peer closed, or the
    /// service is stopping); dropping the context then sends nothing.
    pub fn receive(&mut self) -> Result<bool> {
        if self.message.is_some() {
            return Ok(true);
        }
        self.message = self.socket.receive()?;
        Ok(self.message.is_some())
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Mark the request handled with the given response parts.
    pub fn respond(&mut self, control: Bytes, result: Bytes) {
        self.response = Some((control, result));
    }

    pub fn is_handled(&self) -> bool {
        self.response.is_some()
    }

    /// Send the response now.
    pub fn finish(mut self) -> Result<()> {
        self.send_response()
    }

    fn send_response(&mut self) -> Result<()> {
        if self.message.is_none() || self.sent {
            return Ok(());
        }
        self.sent = true;

        match &self.response {
            Some((control, result)) => self.socket.send(control, Some(&result[..])),
            None => {
                let control = encode_header(&ResponseHeader::default())?;
                self.socket.send(&control, None)
            }
        }
    }
}

impl<R: Read, W: Write> Drop for RequestContext<'_, R, W> {
    fn drop(&mut self) {
        if self.message.is_some() && !self.sent {
            if let Err(err) = self.send_response() {
                warn!(error = %err, "failed to send response");
            }
        }
    }
}
