//! Multi-part messages over a connected stream.
//!
//! A request carries a control part and, normally, an attachment part.
//! Anything after the second part is read and thrown away so the stream
//! stays in sync for the next message.

use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use thumbq_frame::{FrameError, Part, PartReader, PartWriter};
#[cfg(unix)]
use thumbq_frame::PartConfig;
#[cfg(unix)]
use thumbq_transport::Connection;
use tracing::debug;

use crate::error::Result;

/// Whether a message carried both of the parts a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// Control and attachment part arrived.
    Complete,
    /// The control part was the last part of the message.
    Incomplete,
}

/// One received message: the control part plus an optional attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    control: Bytes,
    attachment: Option<Bytes>,
    discarded: usize,
}

impl Message {
    pub fn new(control: Bytes, attachment: Option<Bytes>) -> Self {
        Self {
            control,
            attachment,
            discarded: 0,
        }
    }

    pub fn control(&self) -> &[u8] {
        &self.control
    }

    pub fn attachment(&self) -> Option<&[u8]> {
        self.attachment.as_deref()
    }

    pub fn completeness(&self) -> Completeness {
        if self.attachment.is_some() {
            Completeness::Complete
        } else {
            Completeness::Incomplete
        }
    }

    /// Number of extra parts that followed the attachment and were dropped.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}

/// Parts of a message that has started but not yet ended.
#[derive(Debug, Default)]
struct Assembly {
    control: Option<Bytes>,
    attachment: Option<Bytes>,
    discarded: usize,
}

impl Assembly {
    fn is_empty(&self) -> bool {
        self.control.is_none()
    }

    /// Add a part; returns the message once its last part is in.
    fn push(&mut self, part: Part) -> Option<Message> {
        if self.control.is_none() {
            self.control = Some(part.payload);
        } else if self.attachment.is_none() {
            self.attachment = Some(part.payload);
        } else {
            self.discarded += 1;
        }
        if part.more {
            return None;
        }

        let done = std::mem::take(self);
        if done.discarded > 0 {
            debug!(discarded = done.discarded, "dropped extra message parts");
        }
        Some(Message {
            control: done.control.unwrap_or_default(),
            attachment: done.attachment,
            discarded: done.discarded,
        })
    }
}

/// Reads and writes whole messages.
pub struct MessageSocket<R, W> {
    reader: PartReader<R>,
    writer: PartWriter<W>,
    pending: Assembly,
}

impl<R: Read, W: Write> MessageSocket<R, W> {
    pub fn new(reader: PartReader<R>, writer: PartWriter<W>) -> Self {
        Self {
            reader,
            writer,
            pending: Assembly::default(),
        }
    }

    /// Receive the next message, blocking until it has fully arrived.
    ///
    /// Returns `Ok(None)` when the peer closed the stream between messages.
    pub fn receive(&mut self) -> Result<Option<Message>> {
        loop {
            let part = match self.reader.read_part() {
                Ok(part) => part,
                Err(FrameError::ConnectionClosed) if self.pending.is_empty() => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            if let Some(message) = self.pending.push(part) {
                return Ok(Some(message));
            }
        }
    }

    /// Read once and return every message that read completed, possibly
    /// none. Parts of an unfinished message are kept for the next call.
    ///
    /// Returns `Ok(None)` when the peer closed the stream between messages.
    /// A read timeout counts as a read of nothing.
    pub fn receive_available(&mut self) -> Result<Option<Vec<Message>>> {
        let read = match self.reader.fill() {
            Ok(read) => read,
            Err(FrameError::Io(err)) if is_timeout(&err) => return Ok(Some(Vec::new())),
            Err(err) => return Err(err.into()),
        };

        let mut messages = Vec::new();
        while let Some(part) = self.reader.buffered_part()? {
            if let Some(message) = self.pending.push(part) {
                messages.push(message);
            }
        }

        if read == 0 {
            if self.pending.is_empty() && self.reader.buffered_len() == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated {
                buffered: self.reader.buffered_len(),
            }
            .into());
        }
        Ok(Some(messages))
    }

    /// True while a message has started to arrive but is not complete.
    pub fn is_mid_message(&self) -> bool {
        !self.pending.is_empty() || self.reader.buffered_len() > 0
    }

    /// Send a message: the control part, then the attachment if any.
    pub fn send(&mut self, control: &[u8], attachment: Option<&[u8]>) -> Result<()> {
        match attachment {
            Some(attachment) => self.send_parts(&[control, attachment]),
            None => self.send_parts(&[control]),
        }
    }

    /// Send an arbitrary sequence of parts as one message.
    pub fn send_parts(&mut self, parts: &[&[u8]]) -> Result<()> {
        let last = parts.len().saturating_sub(1);
        for (index, part) in parts.iter().enumerate() {
            self.writer.send_part(part, index < last)?;
        }
        Ok(())
    }

    pub fn reader(&self) -> &R {
        self.reader.get_ref()
    }

    pub fn writer(&self) -> &W {
        self.writer.get_ref()
    }
}

#[cfg(unix)]
impl MessageSocket<Connection, Connection> {
    /// Split a connection into a message socket, applying `config`'s
    /// timeouts to the stream.
    pub fn from_connection(conn: Connection, config: PartConfig) -> Result<Self> {
        let reader = PartReader::with_config_conn(conn.try_clone()?, config.clone())?;
        let writer = PartWriter::with_config_conn(conn, config)?;
        Ok(Self::new(reader, writer))
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::BytesMut;
    use thumbq_frame::{decode_part, encode_part, DEFAULT_MAX_PART_SIZE};

    use super::*;
    use crate::error::ServiceError;

    pub(crate) type TestSocket = MessageSocket<Cursor<Vec<u8>>, Vec<u8>>;

    /// Wire bytes for a sequence of messages, each a list of parts.
    pub(crate) fn wire(messages: &[&[&[u8]]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for parts in messages {
            let last = parts.len() - 1;
            for (index, part) in parts.iter().enumerate() {
                encode_part(part, index < last, &mut buf).expect("part should encode");
            }
        }
        buf.to_vec()
    }

    pub(crate) fn socket(input: Vec<u8>) -> TestSocket {
        MessageSocket::new(PartReader::new(Cursor::new(input)), PartWriter::new(Vec::new()))
    }

    /// Split written bytes back into messages.
    pub(crate) fn sent_messages(written: &[u8]) -> Vec<Vec<Bytes>> {
        let mut buf = BytesMut::from(written);
        let mut messages = Vec::new();
        let mut current = Vec::new();
        while let Some(part) =
            decode_part(&mut buf, DEFAULT_MAX_PART_SIZE).expect("written parts should decode")
        {
            current.push(part.payload);
            if !part.more {
                messages.push(std::mem::take(&mut current));
            }
        }
        assert!(current.is_empty(), "last message left unterminated");
        assert!(buf.is_empty(), "trailing bytes after last part");
        messages
    }

    #[test]
    fn receives_complete_message() {
        let mut sock = socket(wire(&[&[b"control", b"payload"]]));
        let message = sock.receive().expect("receive should succeed").expect("message");
        assert_eq!(message.control(), b"control");
        assert_eq!(message.attachment(), Some(&b"payload"[..]));
        assert_eq!(message.completeness(), Completeness::Complete);
        assert_eq!(message.discarded(), 0);
    }

    #[test]
    fn single_part_message_is_incomplete() {
        let mut sock = socket(wire(&[&[b"control"]]));
        let message = sock.receive().expect("receive should succeed").expect("message");
        assert_eq!(message.completeness(), Completeness::Incomplete);
        assert_eq!(message.attachment(), None);
    }

    #[test]
    fn draining_extra_parts_keeps_completeness_and_sync() {
        let mut sock = socket(wire(&[
            &[b"control", b"payload", b"extra-1", b"extra-2"],
            &[b"next"],
        ]));

        let first = sock.receive().expect("receive should succeed").expect("message");
        assert_eq!(first.completeness(), Completeness::Complete);
        assert_eq!(first.attachment(), Some(&b"payload"[..]));
        assert_eq!(first.discarded(), 2);

        let second = sock.receive().expect("receive should succeed").expect("message");
        assert_eq!(second.control(), b"next");
        assert_eq!(second.completeness(), Completeness::Incomplete);
    }

    #[test]
    fn clean_close_between_messages_is_none() {
        let mut sock = socket(wire(&[&[b"only", b"one"]]));
        assert!(sock.receive().expect("first receive").is_some());
        assert!(sock.receive().expect("second receive").is_none());
    }

    #[test]
    fn close_inside_message_is_an_error() {
        let mut bytes = BytesMut::new();
        encode_part(b"control", true, &mut bytes).expect("part should encode");
        let mut sock = socket(bytes.to_vec());

        let err = sock.receive().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Frame(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn send_sets_more_flag_only_between_parts() {
        let mut sock = socket(Vec::new());
        sock.send(b"header", Some(&b"result"[..])).expect("send should succeed");
        sock.send(b"header-only", None).expect("send should succeed");

        let sent = sent_messages(sock.writer());
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], vec![Bytes::from_static(b"header"), Bytes::from_static(b"result")]);
        assert_eq!(sent[1], vec![Bytes::from_static(b"header-only")]);
    }

    #[cfg(unix)]
    #[test]
    fn plain_read_timeout_propagates() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().expect("socketpair");
        let config = PartConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..PartConfig::default()
        };
        let mut sock = MessageSocket::from_connection(Connection::from(left), config)
            .expect("socket should wrap connection");

        let err = sock.receive().unwrap_err();
        assert!(matches!(err, ServiceError::Frame(FrameError::Io(_))));
    }

    #[test]
    fn receive_available_keeps_partial_messages() {
        let bytes = wire(&[&[b"control", b"payload"], &[b"second"]]);
        let split = bytes.len() - 5;
        let mut sock = MessageSocket::new(
            PartReader::new(Chunked::new(vec![bytes[..split].to_vec(), bytes[split..].to_vec()])),
            PartWriter::new(Vec::new()),
        );

        let first = sock.receive_available().expect("first read").expect("open");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].attachment(), Some(&b"payload"[..]));
        assert!(sock.is_mid_message());

        let second = sock.receive_available().expect("second read").expect("open");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].control(), b"second");
        assert!(!sock.is_mid_message());

        assert!(sock.receive_available().expect("eof").is_none());
    }

    #[test]
    fn receive_available_reports_close_inside_message() {
        let mut bytes = BytesMut::new();
        encode_part(b"control", true, &mut bytes).expect("part should encode");
        let mut sock = socket(bytes.to_vec());

        let first = sock.receive_available().expect("read").expect("open");
        assert!(first.is_empty());
        let err = sock.receive_available().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Frame(FrameError::Truncated { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn receive_available_treats_timeout_as_nothing() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().expect("socketpair");
        let config = PartConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..PartConfig::default()
        };
        let mut sock = MessageSocket::from_connection(Connection::from(left), config)
            .expect("socket should wrap connection");

        let messages = sock.receive_available().expect("timeout is not an error");
        assert_eq!(messages, Some(Vec::new()));
    }

    /// Reader handing out one prepared chunk per read.
    struct Chunked {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }

    impl Chunked {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into(),
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }
}
