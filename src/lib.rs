//! Buffered, reconnecting TLS log transport for the Datadog TCP intake.
//!
//! [`FemtoDatadogTransport`] accepts structured [`LogRecord`]s without ever
//! blocking the caller and delivers them, in order, over one persistent TLS
//! connection. [`FemtoDatadogLogger`] plugs the transport into the `log`
//! facade.

pub mod datadog;
mod handler;
mod log_compat;
mod log_record;
mod rate_limited_warner;

pub use datadog::{
    ConnectionState, DatadogConfig, DatadogOptions, DisconnectReason, FemtoDatadogTransport,
    NativeTlsConnector, TransportEvent, TransportStats,
};
pub use handler::FemtoTransportTrait;
pub use log_compat::{FemtoDatadogLogger, record_from_log};
pub use log_record::{LEVEL_KEY, LogRecord, MESSAGE_KEY};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
