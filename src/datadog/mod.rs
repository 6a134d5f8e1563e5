//! Datadog TCP intake transport.
//!
//! This module defines [`FemtoDatadogTransport`], which buffers structured
//! [`LogRecord`](crate::log_record::LogRecord) values and writes them as
//! `"<api-key> <json>\r\n"` lines to the Datadog intake over a single TLS
//! connection. A worker thread owns the socket, opens it lazily on the first
//! record, pauses delivery while disconnected, and reconnects on a fixed
//! interval while records are waiting.

mod config;
mod connection;
mod error;
mod events;
mod handler;
mod queue;
mod serialise;
mod stats;
mod transport;
mod worker;

#[cfg(test)]
mod test_support;

pub use config::{
    DEFAULT_BUFFER_SIZE, DEFAULT_HOST, DEFAULT_MAX_RECORD_BYTES, DEFAULT_PORT,
    DEFAULT_RECONNECT_INTERVAL, DEFAULT_SOCKET_TIMEOUT, DEFAULT_SOURCE_TAG, DatadogConfig,
    DatadogOptions, SOURCE_TAG_KEY, SocketOptionOverrides, SocketOptions, TlsVersion,
};
pub use connection::ConnectionState;
pub use error::TransportError;
pub use events::{DisconnectReason, TransportEvent};
pub use handler::FemtoDatadogTransport;
pub use queue::{DeliveryQueue, PendingEntry, QueueFull};
pub use serialise::{encode_frame, merge_metadata};
pub use stats::TransportStats;
pub use transport::{
    Connection, Connector, Handshake, NativeTlsConnector, TlsConnection, WriteStatus,
};
