//! Public transport type exported by the crate.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use log::warn;
use parking_lot::Mutex;

use crate::{
    handler::FemtoTransportTrait, log_record::LogRecord, rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::{DatadogConfig, DatadogOptions},
    connection::{ConnectionState, ManagerShared},
    events::TransportEvent,
    queue::{DeliveryQueue, PendingEntry},
    stats::TransportStats,
    transport::{Connector, NativeTlsConnector},
    worker::{Control, spawn_worker},
};

/// Transport forwarding records to the Datadog TCP intake over TLS.
///
/// [`log`](Self::log) never blocks and never fails: records are buffered up
/// to `buffer_size`, the connection is opened lazily on the first record, and
/// a dedicated worker thread writes one record at a time while the socket is
/// ready. Buffered records survive disconnects and are retried, in order,
/// once a reconnect succeeds.
pub struct FemtoDatadogTransport {
    config: Arc<DatadogConfig>,
    queue: DeliveryQueue,
    control: Sender<Control>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    shared: ManagerShared,
    connect_requested: Arc<AtomicBool>,
    closed: AtomicBool,
    warner: RateLimitedWarner,
    /// Bound on waiting for the worker during flush and close.
    flush_timeout: Duration,
}

impl FemtoDatadogTransport {
    /// Construct a TLS transport from user options.
    pub fn new(options: DatadogOptions) -> Self {
        Self::with_connector(options, NativeTlsConnector::new())
    }

    /// Construct a transport that opens connections through `connector`.
    pub fn with_connector<C: Connector>(options: DatadogOptions, connector: C) -> Self {
        Self::from_config(options.resolve(), connector)
    }

    /// Construct a transport from an already resolved configuration.
    pub fn from_config<C: Connector>(config: DatadogConfig, connector: C) -> Self {
        if config.api_key.is_none() {
            warn!("FemtoDatadogTransport configured without an API key; records will be sent without one");
        }
        let config = Arc::new(config);
        let flush_timeout = config.socket_options.timeout.max(Duration::from_secs(1));
        let warner = RateLimitedWarner::new(config.warn_interval);
        let queue = DeliveryQueue::new(config.buffer_size);
        let shared = ManagerShared::default();
        let connect_requested = Arc::new(AtomicBool::new(false));
        let (control, handle) = spawn_worker(
            Arc::clone(&config),
            connector,
            queue.clone(),
            shared.clone(),
            Arc::clone(&connect_requested),
        );
        Self {
            config,
            queue,
            control,
            handle: Mutex::new(Some(handle)),
            shared,
            connect_requested,
            closed: AtomicBool::new(false),
            warner,
            flush_timeout,
        }
    }

    /// Accept `record` for delivery and invoke `callback` before returning.
    ///
    /// The callback signals acceptance into the pipeline, not delivery. When
    /// the buffer is full the record is dropped silently; the drop is counted
    /// in [`stats`](Self::stats) and reported through a rate-limited warning.
    pub fn log<F: FnOnce()>(&self, record: LogRecord, callback: F) {
        self.shared
            .events
            .emit_with(|| TransportEvent::Logged(record.clone()));

        let closed = self.closed.load(Ordering::Acquire);
        if closed {
            self.record_drop(|count| {
                warn!("FemtoDatadogTransport dropped {count} records after shutdown");
            });
        } else {
            match self.queue.push(PendingEntry::new(record)) {
                Ok(()) => self.shared.stats.record_accepted(),
                Err(_) => self.record_drop(|count| {
                    warn!("FemtoDatadogTransport queue full; dropped {count} records");
                }),
            }
        }

        callback();

        if !closed && self.connection_state() != ConnectionState::Ready {
            self.request_connect();
        }
    }

    fn record_drop(&self, log: impl FnMut(u64)) {
        self.shared.stats.record_overflow();
        self.warner.record_drop();
        self.warner.warn_if_due(log);
    }

    fn request_connect(&self) {
        if self.connect_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.control.send(Control::Connect).is_err() {
            self.connect_requested.store(false, Ordering::Release);
        }
    }

    pub fn config(&self) -> &DatadogConfig {
        &self.config
    }

    /// Number of records waiting for transmission.
    pub fn queue_length(&self) -> usize {
        self.queue.length()
    }

    /// Whether delivery is currently paused.
    pub fn is_paused(&self) -> bool {
        self.queue.is_paused()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.stats.snapshot()
    }

    /// Receive lifecycle events emitted from now on.
    pub fn subscribe(&self) -> Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until every accepted record has been written, up to `timeout`.
    pub fn drain(&self, timeout: Duration) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return self.queue.is_idle();
        }
        self.queue.drain(timeout)
    }

    /// Stop the worker, cancel any reconnect timer and release the socket.
    ///
    /// Records still buffered are abandoned; call [`drain`](Self::drain)
    /// first for an orderly shutdown.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.warner.flush(|count| {
            warn!("FemtoDatadogTransport dropped {count} records in the last interval");
        });
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.control.send(Control::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(self.flush_timeout);
        }
        self.join_worker();
    }

    fn join_worker(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("FemtoDatadogTransport: worker thread panicked");
        }
    }
}

impl FemtoTransportTrait for FemtoDatadogTransport {
    fn log(&self, record: LogRecord, callback: &mut dyn FnMut()) {
        FemtoDatadogTransport::log(self, record, callback);
    }

    fn config(&self) -> &DatadogConfig {
        &self.config
    }

    fn subscribe(&self) -> Receiver<TransportEvent> {
        FemtoDatadogTransport::subscribe(self)
    }

    fn flush(&self) -> bool {
        self.warner.flush(|count| {
            warn!("FemtoDatadogTransport dropped {count} records in the last interval");
        });
        self.drain(self.flush_timeout)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl Drop for FemtoDatadogTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for FemtoDatadogTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemtoDatadogTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.connection_state())
            .field("queue", &self.queue)
            .finish()
    }
}
