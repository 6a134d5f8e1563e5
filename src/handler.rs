use crossbeam_channel::Receiver;

use crate::{
    datadog::{DatadogConfig, TransportEvent},
    log_record::LogRecord,
};

/// Contract between a host logging framework and a transport.
///
/// Implementations are `Send + Sync` so adapters can share one transport
/// across threads. [`log`](Self::log) must return promptly and must call
/// `callback` before or immediately after returning, whatever happens to
/// the record.
pub trait FemtoTransportTrait: Send + Sync {
    /// Accept a record for delivery.
    fn log(&self, record: LogRecord, callback: &mut dyn FnMut());

    /// Configuration the transport was built with.
    fn config(&self) -> &DatadogConfig;

    /// Receive lifecycle events such as [`TransportEvent::Logged`].
    fn subscribe(&self) -> Receiver<TransportEvent>;

    /// Wait for buffered records to be written.
    ///
    /// Returns `true` when nothing remains buffered.
    fn flush(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn std::any::Any;
}
