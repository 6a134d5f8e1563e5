//! Worker thread driving socket I/O.
//!
//! The worker is the delivery queue's only consumer and the only thread that
//! touches the socket or the reconnect timer. Each loop iteration fires due
//! timers, then waits on the control channel, the queue (only while it is
//! unpaused and the socket is ready), and the next timer deadline.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use log::{debug, warn};

use crate::rate_limited_warner::RateLimitedWarner;

use super::{
    config::DatadogConfig,
    connection::{ConnectionManager, ManagerShared},
    error::TransportError,
    queue::{DeliveryQueue, PendingEntry},
    serialise::encode_frame,
    transport::{Connection, Connector, WriteStatus},
};

/// Upper bound on a single wait when no timer is pending.
const PARK_INTERVAL: Duration = Duration::from_secs(60);

/// Commands processed by the worker thread.
#[derive(Debug)]
pub(crate) enum Control {
    /// Open a connection unless one is already held.
    Connect,
    /// Cancel the timer, release the socket and exit.
    Shutdown(Sender<()>),
}

pub(crate) fn spawn_worker<C: Connector>(
    config: Arc<DatadogConfig>,
    connector: C,
    queue: DeliveryQueue,
    shared: ManagerShared,
    connect_requested: Arc<AtomicBool>,
) -> (Sender<Control>, thread::JoinHandle<()>) {
    let (tx, rx) = unbounded();
    let handle = thread::spawn(move || {
        Worker::new(config, connector, queue, shared, connect_requested).run(rx);
    });
    (tx, handle)
}

pub(crate) struct Worker<C: Connector> {
    config: Arc<DatadogConfig>,
    manager: ConnectionManager<C>,
    queue: DeliveryQueue,
    shared: ManagerShared,
    connect_requested: Arc<AtomicBool>,
    warner: RateLimitedWarner,
}

impl<C: Connector> Worker<C> {
    pub(crate) fn new(
        config: Arc<DatadogConfig>,
        connector: C,
        queue: DeliveryQueue,
        shared: ManagerShared,
        connect_requested: Arc<AtomicBool>,
    ) -> Self {
        let manager = ConnectionManager::new(Arc::clone(&config), connector, shared.clone());
        let warner = RateLimitedWarner::new(config.warn_interval);
        Self {
            config,
            manager,
            queue,
            shared,
            connect_requested,
            warner,
        }
    }

    #[cfg(test)]
    pub(crate) fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// Whether the next entry may be started.
    fn dispatching(&self) -> bool {
        self.manager.is_ready() && !self.queue.is_paused()
    }

    pub(crate) fn run(mut self, control: Receiver<Control>) {
        let idle = never::<PendingEntry>();
        loop {
            let now = Instant::now();
            self.manager.poll(&self.queue, now);

            if self.dispatching()
                && let Some(entry) = self.queue.take_head()
            {
                self.transmit(entry);
                continue;
            }

            let records = if self.dispatching() {
                self.queue.receiver().clone()
            } else {
                idle.clone()
            };
            let timeout = self
                .manager
                .next_deadline()
                .map_or(PARK_INTERVAL, |at| at.saturating_duration_since(now));

            let keep_running = select! {
                recv(control) -> msg => match msg {
                    Ok(Control::Connect) => {
                        self.handle_connect();
                        true
                    }
                    Ok(Control::Shutdown(ack)) => {
                        self.manager.close(&self.queue);
                        let _ = ack.send(());
                        false
                    }
                    Err(_) => {
                        self.manager.close(&self.queue);
                        false
                    }
                },
                recv(records) -> entry => {
                    if let Ok(entry) = entry {
                        self.transmit(entry);
                    }
                    true
                },
                default(timeout) => true,
            };
            if !keep_running {
                break;
            }
        }
        debug!("FemtoDatadogTransport worker exiting");
    }

    pub(crate) fn handle_connect(&mut self) {
        self.connect_requested.store(false, Ordering::Release);
        self.manager.connect(&self.queue, Instant::now());
    }

    /// Write one entry, completing or requeueing it.
    pub(crate) fn transmit(&mut self, mut entry: PendingEntry) {
        let frame = match encode_frame(&self.config, entry.record()) {
            Ok(frame) => frame,
            Err(err) => {
                self.drop_unsendable(&err);
                self.queue.complete();
                return;
            }
        };

        let wait_timeout = self.config.socket_options.idle_timeout();
        let Some(socket) = self.manager.socket_mut() else {
            self.queue.requeue(entry);
            return;
        };
        entry.mark_attempt();
        let outcome = match socket.write(&frame) {
            Ok(WriteStatus::Accepted) => Ok(()),
            Ok(WriteStatus::Pending) => socket.wait_writable(wait_timeout),
            Err(err) => Err(err),
        };

        let now = Instant::now();
        match outcome {
            Ok(()) => {
                self.manager.touch(now);
                self.shared.stats.record_sent();
                self.queue.complete();
            }
            Err(err) => {
                debug!(
                    "FemtoDatadogTransport requeueing record after {} attempt(s)",
                    entry.attempts()
                );
                self.queue.requeue(entry);
                self.manager.fail(TransportError::Io(err), &self.queue, now);
            }
        }
    }

    fn drop_unsendable(&self, err: &TransportError) {
        warn!("FemtoDatadogTransport could not frame record: {err}");
        self.shared.stats.record_unserialisable();
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("FemtoDatadogTransport dropped {count} records that could not be framed");
        });
    }
}
