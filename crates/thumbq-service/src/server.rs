//! The single-threaded serving loop.
//!
//! Each turn polls the listening endpoints and every open connection
//! together, reads whatever has arrived, and answers at most one complete
//! request. Requests are answered in the order they finished arriving, so
//! a connection that sends nothing, or sends slowly, never holds up the
//! others.

use std::collections::VecDeque;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thumbq_frame::PartConfig;
use thumbq_transport::{wait_readable, Connection, EndpointSet, Readiness, TransportError};
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::context::RequestContext;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::executor::Executor;
use crate::message::{Message, MessageSocket};

/// Accepts connections on every bound endpoint and answers their requests
/// one at a time, in arrival order across connections.
pub struct Server<E> {
    endpoints: EndpointSet,
    coordinator: Coordinator<E>,
    config: ServiceConfig,
    running: Arc<AtomicBool>,
}

/// One accepted connection.
struct Peer {
    id: u64,
    pid: Option<u32>,
    socket: MessageSocket<Connection, Connection>,
    last_active: Instant,
    /// Requests of this peer waiting in the ready queue.
    queued: usize,
    answered: usize,
    /// The peer shut down its sending side; it still gets its answers.
    closed: bool,
    dropped: bool,
}

impl Peer {
    fn fd(&self) -> RawFd {
        self.socket.reader().as_raw_fd()
    }

    fn drop_with(&mut self, reason: &str) {
        warn!(peer = ?self.pid, reason, "connection dropped");
        self.dropped = true;
    }
}

/// Open connections and the complete requests waiting for an answer.
#[derive(Default)]
struct Sessions {
    peers: Vec<Peer>,
    ready: VecDeque<(u64, Message)>,
    next_id: u64,
}

impl Sessions {
    /// Read what arrived on the peer at `index` and queue the requests it
    /// completed.
    fn pump(&mut self, index: usize) {
        let peer = &mut self.peers[index];
        match peer.socket.receive_available() {
            Ok(Some(messages)) => {
                peer.last_active = Instant::now();
                peer.queued += messages.len();
                self.ready
                    .extend(messages.into_iter().map(|message| (peer.id, message)));
            }
            Ok(None) => {
                debug!(peer = ?peer.pid, "peer finished sending");
                peer.closed = true;
            }
            Err(err) => peer.drop_with(&err.to_string()),
        }
    }

    /// Remove dropped, finished and idle peers along with their queued
    /// requests.
    fn reap(&mut self, idle_timeout: Option<Duration>) {
        let now = Instant::now();
        for peer in &mut self.peers {
            let idle = idle_timeout
                .is_some_and(|limit| now.duration_since(peer.last_active) >= limit);
            if !peer.dropped && !peer.closed && peer.queued == 0 && idle {
                debug!(
                    peer = ?peer.pid,
                    mid_message = peer.socket.is_mid_message(),
                    "connection idle"
                );
                peer.dropped = true;
            }
        }

        let before = self.ready.len();
        let mut gone = Vec::new();
        self.peers.retain(|peer| {
            let keep = !peer.dropped && !(peer.closed && peer.queued == 0);
            if !keep {
                debug!(peer = ?peer.pid, answered = peer.answered, "connection closed");
                gone.push(peer.id);
            }
            keep
        });
        if !gone.is_empty() {
            self.ready.retain(|(id, _)| !gone.contains(id));
        }
        let purged = before - self.ready.len();
        if purged > 0 {
            debug!(purged, "discarded requests of dropped connections");
        }
    }
}

impl<E: Executor> Server<E> {
    /// Bind every address and prepare to serve.
    pub fn bind<S: AsRef<str>>(addresses: &[S], executor: E, config: ServiceConfig) -> Result<Self> {
        let endpoints = EndpointSet::bind(addresses)?;
        Ok(Self::from_endpoints(endpoints, executor, config))
    }

    pub fn from_endpoints(endpoints: EndpointSet, executor: E, config: ServiceConfig) -> Self {
        Self {
            endpoints,
            coordinator: Coordinator::new(executor),
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that keeps the loop going; clear it to stop between requests.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.endpoints.paths()
    }

    /// Serve until the running flag is cleared.
    ///
    /// Problems with a single connection end that connection only. Errors
    /// on the listening endpoints are returned.
    pub fn serve(&mut self) -> Result<()> {
        info!(
            endpoints = ?self.endpoints.paths().collect::<Vec<_>>(),
            max_connections = self.config.max_connections,
            "serving"
        );
        let mut sessions = Sessions::default();
        while self.running.load(Ordering::SeqCst) {
            self.turn(&mut sessions)?;
        }
        info!(
            open = sessions.peers.len(),
            unanswered = sessions.ready.len(),
            "stopped"
        );
        Ok(())
    }

    fn turn(&self, sessions: &mut Sessions) -> Result<()> {
        let listening = sessions.peers.len() < self.config.max_connections;
        let mut fds: Vec<RawFd> = Vec::new();
        if listening {
            fds.extend(self.endpoints.raw_fds());
        }
        let listeners = fds.len();
        let watched: Vec<usize> = (0..sessions.peers.len())
            .filter(|&index| !sessions.peers[index].closed)
            .collect();
        fds.extend(watched.iter().map(|&index| sessions.peers[index].fd()));

        let timeout = if sessions.ready.is_empty() {
            self.config.poll_interval
        } else {
            Duration::ZERO
        };
        let readiness = wait_readable(&fds, timeout)?;

        for (&index, state) in watched.iter().zip(&readiness[listeners..]) {
            match state {
                Readiness::Readable => sessions.pump(index),
                Readiness::Failed => sessions.peers[index].drop_with("invalid descriptor"),
                Readiness::Idle => {}
            }
        }

        for (index, state) in readiness[..listeners].iter().enumerate() {
            match state {
                Readiness::Readable if sessions.peers.len() < self.config.max_connections => {
                    let conn = self.endpoints.accept(index)?;
                    self.admit(sessions, conn);
                }
                Readiness::Failed => {
                    return Err(TransportError::Poll(std::io::Error::other(
                        "listening descriptor is invalid",
                    ))
                    .into());
                }
                _ => {}
            }
        }

        self.answer_next(sessions);
        sessions.reap(self.config.idle_timeout);
        Ok(())
    }

    fn admit(&self, sessions: &mut Sessions, conn: Connection) {
        let pid = conn.peer_pid();
        let config = PartConfig {
            read_timeout: Some(self.config.poll_interval),
            ..self.config.part.clone()
        };
        let socket = match MessageSocket::from_connection(conn, config) {
            Ok(socket) => socket,
            Err(err) => {
                warn!(peer = ?pid, error = %err, "cannot set up connection");
                return;
            }
        };

        sessions.next_id += 1;
        sessions.peers.push(Peer {
            id: sessions.next_id,
            pid,
            socket,
            last_active: Instant::now(),
            queued: 0,
            answered: 0,
            closed: false,
            dropped: false,
        });
        debug!(peer = ?pid, open = sessions.peers.len(), "connection open");
    }

    /// Answer the oldest complete request, if any.
    fn answer_next(&self, sessions: &mut Sessions) {
        let Some((id, message)) = sessions.ready.pop_front() else {
            return;
        };
        let Some(peer) = sessions.peers.iter_mut().find(|peer| peer.id == id) else {
            return;
        };
        peer.queued -= 1;

        let mut ctx = RequestContext::with_message(&mut peer.socket, message);
        self.coordinator.process(&mut ctx);
        match ctx.finish() {
            Ok(()) => {
                peer.answered += 1;
                peer.last_active = Instant::now();
            }
            Err(err) => peer.drop_with(&format!("failed to send response: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::os::unix::net::UnixStream;
    use std::thread::{self, JoinHandle};

    use thumbq_frame::{encode_header, RequestHeader};
    use thumbq_transform::Identity;

    use super::*;
    use crate::client::Client;
    use crate::executor::DirectExecutor;
    use crate::message::tests::wire;

    const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

    fn make_sock_path(tag: &str) -> std::path::PathBuf {
        let dir = std::path::PathBuf::from(format!(
            "/tmp/thumbq-srv-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("thumbq.sock")
    }

    fn server(tag: &str, config: ServiceConfig) -> Server<DirectExecutor<Identity>> {
        let path = make_sock_path(tag);
        let endpoints = EndpointSet::bind(&[path.display().to_string()]).expect("bind");
        Server::from_endpoints(endpoints, DirectExecutor::new(Identity), config)
    }

    struct Running {
        address: String,
        running: Arc<AtomicBool>,
        handle: JoinHandle<Result<()>>,
    }

    impl Running {
        fn start(tag: &str, config: ServiceConfig) -> Self {
            let mut srv = server(
                tag,
                ServiceConfig {
                    poll_interval: Duration::from_millis(10),
                    ..config
                },
            );
            let address = srv
                .paths()
                .next()
                .expect("one endpoint")
                .display()
                .to_string();
            let running = srv.running();
            let handle = thread::spawn(move || srv.serve());
            Self {
                address,
                running,
                handle,
            }
        }

        fn client(&self) -> Client {
            Client::connect_with_config(
                &self.address,
                PartConfig {
                    read_timeout: Some(CLIENT_TIMEOUT),
                    ..PartConfig::default()
                },
            )
            .expect("client should connect")
        }

        fn raw(&self) -> UnixStream {
            let stream = UnixStream::connect(&self.address).expect("raw connect");
            stream
                .set_read_timeout(Some(CLIENT_TIMEOUT))
                .expect("read timeout");
            stream
        }

        fn stop(self) {
            self.running.store(false, Ordering::SeqCst);
            self.handle
                .join()
                .expect("server thread")
                .expect("serve should stop cleanly");
        }
    }

    fn replies(stream: UnixStream, count: usize) -> Vec<Message> {
        let mut socket = MessageSocket::from_connection(
            Connection::from(stream),
            PartConfig {
                read_timeout: Some(CLIENT_TIMEOUT),
                ..PartConfig::default()
            },
        )
        .expect("reply socket");
        (0..count)
            .map(|_| socket.receive().expect("reply").expect("reply before close"))
            .collect()
    }

    #[test]
    fn idle_client_does_not_block_active_client() {
        let srv = Running::start("idle-active", ServiceConfig::default());

        let mut idle = srv.client();
        let mut active = srv.client();
        for round in 0..3 {
            let reply = active
                .request(&RequestHeader::new(3), b"abc")
                .unwrap_or_else(|err| panic!("request {round} should be answered: {err}"));
            assert_eq!(reply.result.as_deref(), Some(&b"abc"[..]));
        }

        let reply = idle
            .request(&RequestHeader::new(2), b"ok")
            .expect("idle client is still served");
        assert_eq!(reply.result.as_deref(), Some(&b"ok"[..]));
        srv.stop();
    }

    #[test]
    fn pipelined_requests_are_answered_in_order() {
        let srv = Running::start("pipelined", ServiceConfig::default());
        let header = encode_header(&RequestHeader::new(3)).expect("encode");
        let mismatched = encode_header(&RequestHeader::new(9)).expect("encode");

        let mut stream = srv.raw();
        stream
            .write_all(&wire(&[&[&header, b"abc"], &[&mismatched, b"abc"], &[&header]]))
            .expect("write requests");

        let answers = replies(stream, 3);
        assert_eq!(answers[0].attachment(), Some(&b"abc"[..]));
        assert_eq!(answers[1].attachment(), None);
        assert_eq!(answers[2].attachment(), None);
        srv.stop();
    }

    #[test]
    fn half_closed_peer_still_gets_its_reply() {
        let srv = Running::start("half-closed", ServiceConfig::default());
        let header = encode_header(&RequestHeader::new(5)).expect("encode");

        let mut stream = srv.raw();
        stream
            .write_all(&wire(&[&[&header, b"hello"]]))
            .expect("write request");
        stream.shutdown(Shutdown::Write).expect("shutdown");

        let mut socket = MessageSocket::from_connection(
            Connection::from(stream),
            PartConfig {
                read_timeout: Some(CLIENT_TIMEOUT),
                ..PartConfig::default()
            },
        )
        .expect("reply socket");
        let reply = socket.receive().expect("reply").expect("reply before close");
        assert_eq!(reply.attachment(), Some(&b"hello"[..]));
        assert!(socket.receive().expect("clean close").is_none());
        srv.stop();
    }

    #[test]
    fn idle_connection_is_closed() {
        let srv = Running::start(
            "idle",
            ServiceConfig {
                idle_timeout: Some(Duration::from_millis(50)),
                ..ServiceConfig::default()
            },
        );

        let mut stream = srv.raw();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).expect("server closes, no timeout"), 0);
        srv.stop();
    }

    #[test]
    fn connection_limit_defers_accept() {
        let srv = Running::start(
            "limit",
            ServiceConfig {
                max_connections: 1,
                idle_timeout: None,
                ..ServiceConfig::default()
            },
        );
        let header = encode_header(&RequestHeader::new(3)).expect("encode");

        let mut first = srv.client();
        first
            .request(&RequestHeader::new(3), b"one")
            .expect("first client is served");

        let mut waiting = srv.raw();
        waiting
            .write_all(&wire(&[&[&header, b"two"]]))
            .expect("write request");
        waiting
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("read timeout");
        let mut buf = [0u8; 16];
        let err = waiting.read(&mut buf).expect_err("no reply while at the limit");
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));

        drop(first);
        waiting
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("read timeout");
        let answers = replies(waiting, 1);
        assert_eq!(answers[0].attachment(), Some(&b"two"[..]));
        srv.stop();
    }

    #[test]
    fn garbage_drops_only_that_connection() {
        let srv = Running::start("garbage", ServiceConfig::default());

        let mut bad = srv.raw();
        bad.write_all(b"not a part header").expect("write garbage");
        let mut buf = [0u8; 16];
        assert_eq!(bad.read(&mut buf).expect("dropped, no timeout"), 0);

        let reply = srv
            .client()
            .request(&RequestHeader::new(3), b"abc")
            .expect("other clients are unaffected");
        assert_eq!(reply.result.as_deref(), Some(&b"abc"[..]));
        srv.stop();
    }

    #[test]
    fn stop_flag_ends_serve() {
        let srv = Running::start("stop", ServiceConfig::default());
        let _open = srv.client();
        thread::sleep(Duration::from_millis(50));
        srv.stop();
    }
}
