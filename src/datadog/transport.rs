//! Transport primitives for the Datadog transport.
//!
//! Opening a connection happens in two phases so the connection manager can
//! tell a transport failure (`Connecting`) from a failed authorization
//! (`Authorizing`). [`NativeTlsConnector`] is the production implementation;
//! tests plug scripted connectors into the same seam.

use std::{
    error::Error as _,
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use native_tls::{HandshakeError, Protocol, TlsConnector, TlsStream};

use super::{
    config::{DatadogConfig, TlsVersion},
    error::{TransportError, is_timeout_kind},
};

/// Outcome of a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    /// The whole frame was handed to the socket.
    Accepted,
    /// The socket buffered the frame but is applying backpressure; wait for
    /// [`Connection::wait_writable`] before starting the next write.
    Pending,
}

/// Result of the authorization phase.
pub enum Handshake<T> {
    /// The peer completed an authorized handshake.
    Authorized(T),
    /// The handshake finished but the peer could not be authorized. Any
    /// connection handed back is destroyed by the caller.
    Unauthorized {
        connection: Option<T>,
        reason: String,
    },
}

/// Established, authorized stream owned by the connection manager.
pub trait Connection: Send {
    /// Submit one framed record.
    fn write(&mut self, frame: &[u8]) -> io::Result<WriteStatus>;

    /// Block until a [`WriteStatus::Pending`] write has been accepted.
    fn wait_writable(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Release the socket immediately.
    fn destroy(&mut self);
}

/// Factory for outbound connections.
pub trait Connector: Send + 'static {
    /// Stream produced by the transport phase.
    type Stream: Send;
    type Connection: Connection + 'static;

    /// Establish the underlying transport to `(host, port)`.
    fn open(&mut self, config: &DatadogConfig) -> Result<Self::Stream, TransportError>;

    /// Secure and authorize a freshly opened stream.
    fn handshake(
        &mut self,
        stream: Self::Stream,
        config: &DatadogConfig,
    ) -> Result<Handshake<Self::Connection>, TransportError>;
}

/// TLS connector backed by the platform library through `native-tls`.
#[derive(Debug, Default)]
pub struct NativeTlsConnector;

impl NativeTlsConnector {
    pub fn new() -> Self {
        Self
    }

    fn tls_connector(config: &DatadogConfig) -> Result<TlsConnector, TransportError> {
        let options = &config.socket_options;
        let mut builder = TlsConnector::builder();
        if !options.reject_unauthorized {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        if let Some(version) = options.min_version {
            builder.min_protocol_version(Some(protocol_for(version)));
        }
        Ok(builder.build()?)
    }
}

fn protocol_for(version: TlsVersion) -> Protocol {
    match version {
        TlsVersion::Tls10 => Protocol::Tlsv10,
        TlsVersion::Tls11 => Protocol::Tlsv11,
        TlsVersion::Tls12 => Protocol::Tlsv12,
    }
}

fn socket_addrs(config: &DatadogConfig) -> io::Result<Vec<SocketAddr>> {
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map(|iter| iter.collect())
}

fn connect_tcp(config: &DatadogConfig, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in socket_addrs(config)? {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {}:{}", config.host, config.port),
        )
    }))
}

/// I/O error kind underlying a handshake failure, if the socket caused it.
fn socket_cause(err: &native_tls::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }
    None
}

/// Fragments the platform TLS libraries use when refusing a peer's identity
/// (OpenSSL, Security.framework and SChannel).
const IDENTITY_REJECTIONS: &[&str] = &["certificate", "principal name", "hostname"];

/// Whether a handshake failure reports a rejected certificate or host name.
///
/// `native-tls` exposes no error kinds, so the rendered message is the only
/// portable signal.
fn is_identity_rejection(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    IDENTITY_REJECTIONS
        .iter()
        .any(|fragment| message.contains(fragment))
}

impl Connector for NativeTlsConnector {
    type Stream = TcpStream;
    type Connection = TlsConnection;

    fn open(&mut self, config: &DatadogConfig) -> Result<TcpStream, TransportError> {
        Ok(connect_tcp(config, config.socket_options.idle_timeout())?)
    }

    fn handshake(
        &mut self,
        stream: TcpStream,
        config: &DatadogConfig,
    ) -> Result<Handshake<TlsConnection>, TransportError> {
        let timeout = config.socket_options.idle_timeout();
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        let connector = Self::tls_connector(config)?;
        match connector.connect(config.tls_domain(), stream) {
            Ok(stream) => {
                stream.get_ref().set_read_timeout(None)?;
                Ok(Handshake::Authorized(TlsConnection {
                    stream: Box::new(stream),
                }))
            }
            // Only an identity rejection is terminal; resets, EOF and
            // garbled records are retried like any socket error.
            Err(HandshakeError::Failure(err)) => match socket_cause(&err) {
                Some(kind) if is_timeout_kind(kind) => Err(TransportError::Timeout),
                Some(_) => Err(TransportError::Tls(err)),
                None if is_identity_rejection(&err.to_string()) => {
                    Ok(Handshake::Unauthorized {
                        connection: None,
                        reason: err.to_string(),
                    })
                }
                None => Err(TransportError::Tls(err)),
            },
            Err(HandshakeError::WouldBlock(_)) => Err(TransportError::Timeout),
        }
    }
}

/// Authorized TLS stream to the intake.
pub struct TlsConnection {
    stream: Box<TlsStream<TcpStream>>,
}

impl Connection for TlsConnection {
    fn write(&mut self, frame: &[u8]) -> io::Result<WriteStatus> {
        // Blocking writes absorb backpressure in the kernel send buffer; the
        // write timeout bounds how long a stalled peer can hold the worker.
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(WriteStatus::Accepted)
    }

    fn wait_writable(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.get_ref().set_write_timeout(timeout)?;
        self.stream.flush()
    }

    fn destroy(&mut self) {
        let _ = self.stream.shutdown();
        let _ = self.stream.get_ref().shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for TlsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnection")
            .field("peer", &self.stream.get_ref().peer_addr().ok())
            .finish()
    }
}
