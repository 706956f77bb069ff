use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::RtspError;
use crate::server::{RtspHandler, Server};

/// Largest request accepted on a connection, headers included.
pub const MAX_REQUEST_LEN: usize = 4096;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(250);

/// The connection an RTSP request arrived on.
///
/// This is the `Client` type handed to [`RtspHandler`] by [`TcpServer`].
#[derive(Debug, Clone)]
pub struct Peer {
    addr: SocketAddr,
    stream: Arc<TcpStream>,
}

impl Peer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Write reply bytes to the connection.
    pub fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        (&*self.stream).write_all(bytes)
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

/// Shared handle to a server driven by several connections.
pub type SharedServer<H> = Arc<Mutex<Server<H>>>;

/// RTSP over TCP, one thread per connection.
///
/// Every connection feeds complete requests into the shared [`Server`]
/// under its lock. When a connection ends, the sessions it created are
/// closed.
pub struct TcpServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    accept: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// Bind `addr` and start accepting connections.
    pub fn start<H>(addr: impl ToSocketAddrs, server: SharedServer<H>) -> std::io::Result<Self>
    where
        H: RtspHandler<Client = Peer> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));

        let r = running.clone();
        let accept = thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || accept_loop(listener, server, r))?;

        tracing::info!(%local_addr, "RTSP server listening");
        Ok(Self {
            local_addr,
            running,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting and ask every connection to close.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(accept) = self.accept.take()
            && accept.join().is_err()
        {
            tracing::warn!("accept thread panicked");
        }
        tracing::info!(local_addr = %self.local_addr, "RTSP server stopped");
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if self.accept.is_some() {
            self.stop();
        }
    }
}

fn accept_loop<H>(listener: TcpListener, server: SharedServer<H>, running: Arc<AtomicBool>)
where
    H: RtspHandler<Client = Peer> + Send + 'static,
{
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let s = server.clone();
                let r = running.clone();
                let spawned = thread::Builder::new()
                    .name(format!("rtsp-{peer_addr}"))
                    .spawn(move || Connection::handle(stream, peer_addr, s, r));
                if let Err(e) = spawned {
                    tracing::warn!(%peer_addr, error = %e, "failed to spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

fn is_disconnect(err: &crate::callback::CallbackError) -> bool {
    std::error::Error::source(err)
        .and_then(|e| e.downcast_ref::<std::io::Error>())
        .is_some_and(|e| {
            matches!(
                e.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            )
        })
}

struct Connection<H: RtspHandler<Client = Peer>> {
    reader: BufReader<TcpStream>,
    peer: Peer,
    server: SharedServer<H>,
}

impl<H: RtspHandler<Client = Peer>> Connection<H> {
    fn handle(stream: TcpStream, peer_addr: SocketAddr, server: SharedServer<H>, running: Arc<AtomicBool>) {
        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream
            .set_read_timeout(Some(READ_POLL))
            .and_then(|()| stream.try_clone())
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(%peer_addr, error = %e, "failed to set up connection");
                return;
            }
        };

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            peer: Peer {
                addr: peer_addr,
                stream: Arc::new(stream),
            },
            server,
        };

        let reason = conn.run(&running);
        conn.cleanup();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request loop. Returns the reason for exiting.
    fn run(&mut self, running: &AtomicBool) -> &'static str {
        let mut request = Vec::new();
        let mut line = Vec::new();
        while running.load(Ordering::SeqCst) {
            // At least one byte of room: the length check below runs after every read.
            let room = (MAX_REQUEST_LEN + 1 - request.len() - line.len()) as u64;
            match (&mut self.reader).take(room).read_until(b'\n', &mut line) {
                Ok(0) => return "connection closed by client",
                Ok(_) => {}
                // Partial line stays in `line`.
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(_) => return "read error",
            }
            if request.len() + line.len() > MAX_REQUEST_LEN {
                return "request too large";
            }
            if !line.ends_with(b"\n") {
                continue;
            }

            let blank = line == b"\r\n" || line == b"\n";
            if blank && request.is_empty() {
                line.clear();
                continue;
            }
            request.extend_from_slice(&line);
            line.clear();
            if !blank {
                continue;
            }

            let result = self.server.lock().rx(&self.peer, &request);
            request.clear();
            match result {
                Ok(()) => {}
                // A reply that cannot be written means the peer is gone.
                Err(RtspError::Callback(e)) if is_disconnect(&e) => return "write error",
                Err(e) => {
                    tracing::debug!(peer = %self.peer.addr, error = %e, "request failed");
                }
            }
        }
        "server shutting down"
    }

    /// Close the sessions this connection created.
    fn cleanup(&self) {
        let addr = self.peer.addr;
        let mut server = self.server.lock();
        let before = server.store().session_count();
        if let Some(e) = server.close_sessions(|session| session.client().addr() == addr) {
            tracing::warn!(peer = %addr, error = %e, "session cleanup callback failed");
        }
        let removed = before - server.store().session_count();
        if removed > 0 {
            tracing::info!(peer = %addr, removed, "cleaned up sessions on disconnect");
        }
    }
}
