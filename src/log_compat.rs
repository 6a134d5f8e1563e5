//! Compatibility bridge for the Rust `log` crate.
//!
//! [`FemtoDatadogLogger`] implements `log::Log` and forwards every enabled
//! record to a transport. Records emitted by this crate itself are never
//! forwarded, so the transport's own diagnostics cannot feed back into its
//! queue when the bridge is installed as the global logger.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::{
    datadog::FemtoDatadogTransport,
    handler::FemtoTransportTrait,
    log_record::{LEVEL_KEY, LogRecord, MESSAGE_KEY},
};

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

fn map_log_level(level: log::Level) -> &'static str {
    match level {
        log::Level::Trace => "trace",
        log::Level::Debug => "debug",
        log::Level::Info => "info",
        log::Level::Warn => "warn",
        log::Level::Error => "error",
    }
}

fn is_own_target(target: &str) -> bool {
    target == OWN_TARGET
        || target
            .strip_prefix(OWN_TARGET)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Convert a `log` record into a structured [`LogRecord`].
pub fn record_from_log(record: &Record<'_>) -> LogRecord {
    let mut converted = LogRecord::new()
        .with_field(LEVEL_KEY, map_log_level(record.level()))
        .with_field(MESSAGE_KEY, record.args().to_string())
        .with_field("logger", record.target())
        .with_field(
            "timestamp",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    if let Some(module_path) = record.module_path() {
        converted.insert("module_path", module_path);
    }
    if let Some(file) = record.file() {
        converted.insert("filename", file);
    }
    if let Some(line) = record.line() {
        converted.insert("line_number", line);
    }
    converted
}

/// Adapter implementing the Rust `log::Log` trait on top of a transport.
pub struct FemtoDatadogLogger<T = FemtoDatadogTransport> {
    transport: Arc<T>,
    level: LevelFilter,
}

impl<T: FemtoTransportTrait> FemtoDatadogLogger<T> {
    /// Forward records at every level to `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            level: LevelFilter::Trace,
        }
    }

    /// Only forward records at or above `level`.
    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Install the adapter as the global logger.
    ///
    /// Fails when a different global logger is already set.
    pub fn install(self) -> Result<(), SetLoggerError>
    where
        T: 'static,
    {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl<T: FemtoTransportTrait> log::Log for FemtoDatadogLogger<T> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && !is_own_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.transport.log(record_from_log(record), &mut || {});
    }

    fn flush(&self) {
        self.transport.flush();
    }
}
