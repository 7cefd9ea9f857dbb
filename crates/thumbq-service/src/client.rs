//! Blocking client for the service.

use bytes::Bytes;
use thumbq_frame::{decode_header, encode_header, PartConfig, RequestHeader, ResponseHeader};
use thumbq_transport::{socket_path, Connection, UnixEndpoint};

use crate::error::{Result, ServiceError};
use crate::message::MessageSocket;

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub header: ResponseHeader,
    /// Result bytes; `None` when the request was not handled.
    pub result: Option<Bytes>,
}

impl Reply {
    pub fn is_handled(&self) -> bool {
        self.result.is_some()
    }
}

/// One connection to a running service.
pub struct Client {
    socket: MessageSocket<Connection, Connection>,
}

impl Client {
    /// Connect to `address` (a socket path, optionally `unix://`-prefixed).
    pub fn connect(address: &str) -> Result<Self> {
        Self::connect_with_config(address, PartConfig::default())
    }

    pub fn connect_with_config(address: &str, config: PartConfig) -> Result<Self> {
        let conn = UnixEndpoint::connect(socket_path(address))?;
        Self::from_connection(conn, config)
    }

    pub fn from_connection(conn: Connection, config: PartConfig) -> Result<Self> {
        Ok(Self {
            socket: MessageSocket::from_connection(conn, config)?,
        })
    }

    /// Send a request and wait for its reply.
    pub fn request(&mut self, header: &RequestHeader, payload: &[u8]) -> Result<Reply> {
        let control = encode_header(header)?;
        self.send_raw(&[&control, payload])
    }

    /// Send arbitrary parts as one message and wait for the reply.
    pub fn send_raw(&mut self, parts: &[&[u8]]) -> Result<Reply> {
        self.socket.send_parts(parts)?;
        let message = self
            .socket
            .receive()?
            .ok_or(ServiceError::UnexpectedReply("connection closed".into()))?;

        let (header, _) = decode_header::<ResponseHeader>(message.control())?;
        let result = message.attachment().map(Bytes::copy_from_slice);
        if let Some(result) = &result {
            if header.length != result.len() as u64 {
                return Err(ServiceError::UnexpectedReply(format!(
                    "result is {} bytes but header says {}",
                    result.len(),
                    header.length
                )));
            }
        }
        Ok(Reply { header, result })
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;
    use crate::message::MessageSocket;

    #[test]
    fn decodes_handled_and_unhandled_replies() {
        let (left, right) = UnixStream::pair().expect("socketpair");
        let server = thread::spawn(move || {
            let mut sock = MessageSocket::from_connection(Connection::from(right), PartConfig::default())
                .expect("server socket");
            let header = encode_header(&ResponseHeader {
                length: 2,
                ..ResponseHeader::default()
            })
            .expect("encode");

            sock.receive().expect("first request").expect("message");
            sock.send(&header, Some(&b"ok"[..])).expect("send");
            sock.receive().expect("second request").expect("message");
            let empty = encode_header(&ResponseHeader::default()).expect("encode");
            sock.send(&empty, None).expect("send");
        });

        let mut client =
            Client::from_connection(Connection::from(left), PartConfig::default()).expect("client");
        let handled = client.request(&RequestHeader::new(1), b"x").expect("reply");
        assert!(handled.is_handled());
        assert_eq!(handled.result.as_deref(), Some(&b"ok"[..]));

        let unhandled = client.request(&RequestHeader::new(1), b"x").expect("reply");
        assert!(!unhandled.is_handled());
        assert!(unhandled.header.is_empty());
        server.join().expect("server thread");
    }

    #[test]
    fn inconsistent_reply_is_an_error() {
        let (left, right) = UnixStream::pair().expect("socketpair");
        let server = thread::spawn(move || {
            let mut sock = MessageSocket::from_connection(Connection::from(right), PartConfig::default())
                .expect("server socket");
            sock.receive().expect("request").expect("message");
            let header = encode_header(&ResponseHeader {
                length: 10,
                ..ResponseHeader::default()
            })
            .expect("encode");
            sock.send(&header, Some(&b"short"[..])).expect("send");
        });

        let mut client =
            Client::from_connection(Connection::from(left), PartConfig::default()).expect("client");
        let err = client.request(&RequestHeader::new(1), b"x").unwrap_err();
        assert!(matches!(err, ServiceError::UnexpectedReply(_)));
        server.join().expect("server thread");
    }
}
