//! Configuration structures consumed by the Datadog transport.
//!
//! Callers describe their overrides with [`DatadogOptions`], either through
//! the fluent `with_*` setters or by deserialising a camelCase JSON object.
//! [`DatadogOptions::resolve`] layers those overrides over the built-in
//! defaults and yields the immutable [`DatadogConfig`] the transport runs
//! with. `socketOptions` and `metadata` merge key by key rather than
//! replacing the defaults wholesale.

use std::{collections::BTreeMap, time::Duration};

use serde::Deserialize;
use serde_json::Value;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Default Datadog TCP intake host.
pub const DEFAULT_HOST: &str = "intake.logs.datadoghq.com";
/// Default TLS port of the Datadog TCP intake.
pub const DEFAULT_PORT: u16 = 10516;
/// Default maximum number of records waiting for transmission.
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;
/// Default delay before reconnecting while records are waiting.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(10_000);
/// Default socket timeout (connect, write and idle).
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default upper bound on a single framed record, in bytes.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 1 << 20; // 1 MiB
/// Metadata key tagging the origin of every record.
pub const SOURCE_TAG_KEY: &str = "ddsource";
/// Default value of [`SOURCE_TAG_KEY`].
pub const DEFAULT_SOURCE_TAG: &str = "rust";

/// Minimum TLS protocol version accepted during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TlsVersion {
    #[serde(rename = "TLSv1")]
    Tls10,
    #[serde(rename = "TLSv1.1")]
    Tls11,
    #[serde(rename = "TLSv1.2")]
    Tls12,
}

/// Options applied to the outbound secure socket.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketOptions {
    /// Connect, write and idle timeout. Zero disables the idle timeout.
    pub timeout: Duration,
    /// Refuse peers whose certificate or hostname fails verification.
    pub reject_unauthorized: bool,
    /// Name used for SNI and certificate verification instead of the host.
    pub servername: Option<String>,
    /// Lowest TLS version accepted.
    pub min_version: Option<TlsVersion>,
    /// Transport-specific keys without a dedicated field, kept verbatim.
    pub extra: BTreeMap<String, Value>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SOCKET_TIMEOUT,
            reject_unauthorized: true,
            servername: None,
            min_version: None,
            extra: BTreeMap::new(),
        }
    }
}

impl SocketOptions {
    /// Inactivity period after which a ready socket is torn down.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    fn merge(&mut self, overrides: SocketOptionOverrides) {
        if let Some(timeout_ms) = overrides.timeout {
            self.timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(reject) = overrides.reject_unauthorized {
            self.reject_unauthorized = reject;
        }
        if overrides.servername.is_some() {
            self.servername = overrides.servername;
        }
        if overrides.min_version.is_some() {
            self.min_version = overrides.min_version;
        }
        self.extra.extend(overrides.extra);
    }
}

/// Fully resolved, immutable transport configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct DatadogConfig {
    pub host: String,
    pub port: u16,
    /// Maximum number of records waiting for transmission.
    pub buffer_size: usize,
    /// Delay before reconnecting after a failure. Zero disables reconnects.
    pub reconnect_interval: Duration,
    pub socket_options: SocketOptions,
    /// Static fields merged into every outgoing record.
    pub metadata: BTreeMap<String, String>,
    /// Token prefixed to every wire line.
    pub api_key: Option<String>,
    /// Frames larger than this are dropped instead of sent.
    pub max_record_bytes: usize,
    /// Minimum interval between dropped-record warnings.
    pub warn_interval: Duration,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        DatadogOptions::default().resolve()
    }
}

impl DatadogConfig {
    /// Name presented for SNI and certificate verification.
    pub fn tls_domain(&self) -> &str {
        self.socket_options
            .servername
            .as_deref()
            .unwrap_or(&self.host)
    }

    /// Whether a failed connection may be retried on a timer.
    pub fn reconnect_enabled(&self) -> bool {
        !self.reconnect_interval.is_zero()
    }
}

/// Overrides for [`SocketOptions`]; absent keys keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketOptionOverrides {
    /// Timeout in milliseconds.
    pub timeout: Option<u64>,
    pub reject_unauthorized: Option<bool>,
    pub servername: Option<String>,
    pub min_version: Option<TlsVersion>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Partial, user-supplied transport options.
///
/// # Examples
///
/// ```
/// use femto_datadog::DatadogOptions;
///
/// let config = DatadogOptions::new()
///     .with_api_key("0123abcd")
///     .with_metadata("service", "billing")
///     .resolve();
/// assert_eq!(config.port, 10516);
/// assert_eq!(config.metadata["ddsource"], "rust");
/// assert_eq!(config.metadata["service"], "billing");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatadogOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub buffer_size: Option<usize>,
    /// Reconnect interval in milliseconds.
    pub reconnect_interval: Option<u64>,
    pub socket_options: SocketOptionOverrides,
    pub metadata: BTreeMap<String, String>,
    pub api_key: Option<String>,
    pub max_record_bytes: Option<usize>,
    /// Warning interval in milliseconds.
    pub warn_interval: Option<u64>,
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $($field:ident).+, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$($field).+ = Some(value);
            self
        }
    };
}

macro_rules! string_setter {
    ($(#[$meta:meta])* $fn_name:ident, $($field:ident).+) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: impl Into<String>) -> Self {
            self.$($field).+ = Some(value.into());
            self
        }
    };
}

macro_rules! millis_setter {
    ($(#[$meta:meta])* $fn_name:ident, $($field:ident).+) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: Duration) -> Self {
            self.$($field).+ = Some(value.as_millis().min(u128::from(u64::MAX)) as u64);
            self
        }
    };
}

impl DatadogOptions {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse overrides from a camelCase JSON object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    string_setter!(with_host, host);
    option_setter!(with_port, port, u16);
    option_setter!(
        #[doc = "Set the maximum number of waiting records."]
        with_buffer_size,
        buffer_size,
        usize
    );
    string_setter!(with_api_key, api_key);
    option_setter!(with_max_record_bytes, max_record_bytes, usize);
    string_setter!(
        #[doc = "Override the name used for SNI and certificate verification."]
        with_servername,
        socket_options.servername
    );
    millis_setter!(
        #[doc = "Set the reconnect interval; `Duration::ZERO` disables reconnects."]
        with_reconnect_interval,
        reconnect_interval
    );
    millis_setter!(with_socket_timeout, socket_options.timeout);
    millis_setter!(with_warn_interval, warn_interval);

    /// Toggle certificate and hostname verification.
    pub fn with_reject_unauthorized(mut self, reject: bool) -> Self {
        self.socket_options.reject_unauthorized = Some(reject);
        self
    }

    pub fn with_min_tls_version(mut self, version: TlsVersion) -> Self {
        self.socket_options.min_version = Some(version);
        self
    }

    /// Attach a transport-specific socket option.
    pub fn with_socket_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.socket_options.extra.insert(key.into(), value.into());
        self
    }

    /// Add a static field merged into every record.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Layer these overrides over the defaults.
    pub fn resolve(self) -> DatadogConfig {
        let mut socket_options = SocketOptions::default();
        socket_options.merge(self.socket_options);

        let mut metadata = BTreeMap::from([(
            SOURCE_TAG_KEY.to_string(),
            DEFAULT_SOURCE_TAG.to_string(),
        )]);
        metadata.extend(self.metadata);

        DatadogConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            reconnect_interval: self
                .reconnect_interval
                .map_or(DEFAULT_RECONNECT_INTERVAL, Duration::from_millis),
            socket_options,
            metadata,
            api_key: self.api_key,
            max_record_bytes: self.max_record_bytes.unwrap_or(DEFAULT_MAX_RECORD_BYTES),
            warn_interval: self
                .warn_interval
                .map_or(DEFAULT_WARN_INTERVAL, Duration::from_millis),
        }
    }
}

impl From<DatadogOptions> for DatadogConfig {
    fn from(options: DatadogOptions) -> Self {
        options.resolve()
    }
}
