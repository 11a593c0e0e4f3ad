use std::{
    net::{SocketAddr, SocketAddrV6},
    os::fd::AsRawFd,
    time::{Duration, Instant},
};

use bytes::BytesMut;
use nix::sys::socket::{
    self, AddressFamily, Backlog, SockFlag, SockType, SockaddrIn6, sockopt,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    task::AbortHandle,
};
use tokio_util::codec::{Decoder, Encoder};
use yaap_protocol::{
    Request,
    codec::DEFAULT_MAX_MESSAGE_SIZE,
    error::ReadError,
    framing::{RequestDecoder, ResponseEncoder},
};

use crate::dispatch::Context;
use crate::error::ServerError;
use crate::hal::{LockChange, SystemHal};
use crate::lock::{DEFAULT_LOCK_TIMEOUT, SessionLock};
use crate::mux::{ConnectionId, ConnectionSet};
use crate::registry::Registry;

/// Port the daemon listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 5555;

#[derive(Debug, Clone)]
pub struct Config {
    /// Largest request accepted, in bytes
    pub max_message_size: usize,
    /// Time a client has to complete a request once its first byte arrived
    pub message_timeout: Duration,
    /// Connections without a completed request for this long are closed
    pub idle_timeout: Duration,
    /// Inactivity after which the session lock may be taken over
    pub lock_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            message_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(1800),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            write_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use yaap_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .idle_timeout(Duration::from_secs(600))
///     .message_timeout(Duration::from_secs(5))
///     .build(registry, system);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the largest request this server accepts.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the time a started request has to arrive completely.
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    /// Set the inactivity after which a connection is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Set the TCP write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Build and return the server
    pub fn build(self, registry: Registry, system: SystemHal) -> Server {
        Server::new(registry, system, self.config)
    }
}

/// What reader tasks report to the server task.
#[derive(Debug)]
enum Event {
    Request { id: ConnectionId, request: Request },
    Closed { id: ConnectionId, error: Option<ReadError> },
}

/// Server side of one client connection.
struct Peer {
    addr: SocketAddr,
    writer: OwnedWriteHalf,
    reader: AbortHandle,
}

/// How the server loop ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Shutdown {
    /// A client requested a device reset
    Reset,
}

pub struct Server {
    context: Context,
    config: Config,
}

impl Server {
    pub fn new(registry: Registry, system: SystemHal, config: Config) -> Server {
        let lock = SessionLock::new(config.lock_timeout, Instant::now());
        Server {
            context: Context::new(registry, lock, system),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind to `addr` and serve until a client resets the device.
    ///
    /// The IPv6 wildcard address also accepts IPv4 clients.
    pub async fn listen(self, addr: SocketAddr) -> Result<Shutdown, ServerError> {
        let listener = bind(addr)?;
        self.serve(listener).await
    }

    /// Serve clients on an already bound listener.
    pub async fn serve(mut self, listener: TcpListener) -> Result<Shutdown, ServerError> {
        log::info!("Server listening for connections on {}", listener.local_addr()?);
        let (events_tx, mut events) = mpsc::channel(64);
        let mut connections: ConnectionSet<Peer> = ConnectionSet::new(self.config.idle_timeout);
        let mut next_id: ConnectionId = 0;

        loop {
            let wake = connections
                .next_deadline()
                .unwrap_or_else(|| Instant::now() + self.config.idle_timeout);
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        next_id += 1;
                        log::info!("New client connection from {} (#{})", addr, next_id);
                        let peer = self.spawn_reader(next_id, stream, addr, events_tx.clone());
                        connections.insert(next_id, peer, Instant::now());
                    }
                    Err(err) => log::error!("Connection error: {}", err),
                },
                Some(event) = events.recv() => match event {
                    Event::Request { id, request } => {
                        self.handle_request(&mut connections, id, &request).await;
                        if self.context.reset_requested() {
                            log::info!("Shutting down for device reset");
                            for id in connections.ids().collect::<Vec<_>>() {
                                self.close(&mut connections, id);
                            }
                            return Ok(Shutdown::Reset);
                        }
                    }
                    Event::Closed { id, error } => {
                        match error {
                            Some(err) if !err.is_disconnect() => {
                                log::error!("Client #{} error: {}", id, err)
                            }
                            _ => log::info!("Client #{} disconnected", id),
                        }
                        self.close(&mut connections, id);
                    }
                },
                _ = tokio::time::sleep_until(wake.into()), if !connections.is_empty() => {
                    let evicted = connections.evict_idle(Instant::now());
                    let released = !evicted.is_empty() && connections.is_empty();
                    for (id, peer) in evicted {
                        log::info!("Closing idle connection #{} from {}", id, peer.addr);
                        peer.reader.abort();
                    }
                    if released {
                        self.release_hardware();
                    }
                }
            }
        }
    }

    fn spawn_reader(
        &self,
        id: ConnectionId,
        stream: TcpStream,
        addr: SocketAddr,
        events: mpsc::Sender<Event>,
    ) -> Peer {
        if let Err(err) = stream.set_nodelay(true) {
            log::warn!("Cannot disable Nagle's algorithm for {}: {}", addr, err);
        }
        let (read, writer) = stream.into_split();
        let task = tokio::spawn(read_requests(
            id,
            read,
            events,
            self.config.max_message_size,
            self.config.message_timeout,
        ));
        Peer {
            addr,
            writer,
            reader: task.abort_handle(),
        }
    }

    async fn handle_request(
        &mut self,
        connections: &mut ConnectionSet<Peer>,
        id: ConnectionId,
        request: &Request,
    ) {
        let now = Instant::now();
        if connections.touch(id, now).is_none() {
            log::debug!("Dropping request of closed connection #{}", id);
            return;
        }
        log::debug!(
            "Request from #{} with lockId={:08X} and {} calls",
            id,
            request.lock_id,
            request.calls.len()
        );
        let response = self.context.execute(request, now);
        if let Some(entry) = response.first_error() {
            log::debug!("Response carries error {}: {}", entry.code, entry.message);
        }

        let mut buffer = BytesMut::new();
        let sent = match ResponseEncoder.encode(&response, &mut buffer) {
            Ok(()) => match connections.get_mut(id) {
                Some(peer) => tokio::time::timeout(
                    self.config.write_timeout,
                    peer.writer.write_all(&buffer),
                )
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))
                .and_then(|written| written),
                None => Ok(()),
            },
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            log::error!("Send to client #{} failed: {}", id, err);
            self.close(connections, id);
        }
    }

    fn close(&mut self, connections: &mut ConnectionSet<Peer>, id: ConnectionId) {
        let Some(peer) = connections.remove(id) else {
            return;
        };
        peer.reader.abort();
        log::debug!("Closed connection #{} from {}", id, peer.addr);
        if connections.is_empty() {
            self.release_hardware();
        }
    }

    /// The last client is gone: hand the debug signals back to the board.
    fn release_hardware(&self) {
        log::info!("No clients left, releasing debug hardware");
        self.context
            .system()
            .notify(LockChange::LockTimedOut, false);
    }
}

/// Decode requests from one connection until it closes or misbehaves.
async fn read_requests(
    id: ConnectionId,
    mut stream: OwnedReadHalf,
    events: mpsc::Sender<Event>,
    max_message_size: usize,
    message_timeout: Duration,
) {
    let mut decoder = RequestDecoder::new(max_message_size);
    let mut buffer = BytesMut::with_capacity(4096);
    let mut started: Option<tokio::time::Instant> = None;

    let error = loop {
        match decoder.decode(&mut buffer) {
            Ok(Some(request)) => {
                if !buffer.is_empty() {
                    log::warn!(
                        "Discarding {} bytes received after a complete message",
                        buffer.len()
                    );
                    buffer.clear();
                }
                started = None;
                if events.send(Event::Request { id, request }).await.is_err() {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => break Some(err),
        }

        if started.is_none() && (!decoder.is_idle() || !buffer.is_empty()) {
            started = Some(tokio::time::Instant::now());
        }
        let read = match started {
            Some(start) => {
                match tokio::time::timeout_at(start + message_timeout, stream.read_buf(&mut buffer))
                    .await
                {
                    Ok(read) => read,
                    Err(_) => break Some(ReadError::Deadline(message_timeout)),
                }
            }
            None => stream.read_buf(&mut buffer).await,
        };
        match read {
            Ok(0) if decoder.is_idle() && buffer.is_empty() => break None,
            Ok(0) => {
                break Some(ReadError::InvalidFormat(
                    "Connection closed in the middle of a message".to_owned(),
                ));
            }
            Ok(len) => log::trace!("Read {} bytes from #{}", len, id),
            Err(err) => break Some(err.into()),
        }
    };
    let _ = events.send(Event::Closed { id, error }).await;
}

/// Open a listening socket on `addr`.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let listener = match addr {
        SocketAddr::V4(_) => std::net::TcpListener::bind(addr)
            .map_err(|source| ServerError::Bind { addr, source })?,
        SocketAddr::V6(v6) => bind_dual_stack(v6)?,
    };
    listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(listener)?)
}

fn bind_dual_stack(addr: SocketAddrV6) -> Result<std::net::TcpListener, ServerError> {
    let fd = socket::socket(
        AddressFamily::Inet6,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    socket::setsockopt(&fd, sockopt::ReuseAddr, &true)?;
    socket::setsockopt(&fd, sockopt::Ipv6V6Only, &false)?;
    socket::bind(fd.as_raw_fd(), &SockaddrIn6::from(addr)).map_err(|errno| {
        ServerError::Bind {
            addr: SocketAddr::V6(addr),
            source: errno.into(),
        }
    })?;
    socket::listen(&fd, Backlog::MAXCONN)?;
    Ok(std::net::TcpListener::from(fd))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{Builder, Config};

    #[test]
    fn builder_overrides_defaults() {
        let defaults = Config::default();
        assert_eq!(defaults.max_message_size, 4 * 1024 * 1024);
        assert_eq!(defaults.idle_timeout, Duration::from_secs(1800));

        let builder = Builder::new()
            .idle_timeout(Duration::from_secs(5))
            .message_timeout(Duration::from_millis(250))
            .max_message_size(1024);
        assert_eq!(builder.config.idle_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.message_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.max_message_size, 1024);
        assert_eq!(builder.config.lock_timeout, defaults.lock_timeout);
    }
}
