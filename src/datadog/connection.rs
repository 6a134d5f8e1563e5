//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns the single outbound socket and the reconnect
//! timer. It is driven exclusively from the worker thread: connect requests,
//! timer expiry, idle timeouts and write failures all arrive as method calls,
//! and every transition that affects delivery pauses or resumes the
//! [`DeliveryQueue`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Instant,
};

use log::{debug, info, warn};

use super::{
    config::DatadogConfig,
    error::TransportError,
    events::{DisconnectReason, EventEmitter, TransportEvent},
    queue::DeliveryQueue,
    stats::StatsCounters,
    transport::{Connection, Connector, Handshake},
};

/// Lifecycle phase of the outbound socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Authorizing = 2,
    Ready = 3,
    TearingDown = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Authorizing,
            3 => ConnectionState::Ready,
            4 => ConnectionState::TearingDown,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Read-only view of the manager's state for other threads.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }
}

impl StateCell {
    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Handles shared between the manager and the rest of the transport.
#[derive(Clone, Default)]
pub(crate) struct ManagerShared {
    pub(crate) state: Arc<StateCell>,
    pub(crate) events: Arc<EventEmitter>,
    pub(crate) stats: Arc<StatsCounters>,
}

/// Owner of the outbound socket and the reconnect timer.
pub(crate) struct ConnectionManager<C: Connector> {
    config: Arc<DatadogConfig>,
    connector: C,
    socket: Option<C::Connection>,
    state: ConnectionState,
    reconnect_at: Option<Instant>,
    last_activity: Option<Instant>,
    shared: ManagerShared,
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(config: Arc<DatadogConfig>, connector: C, shared: ManagerShared) -> Self {
        shared.state.store(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            socket: None,
            state: ConnectionState::Disconnected,
            reconnect_at: None,
            last_activity: None,
            shared,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Deadline of the pending reconnect timer, if one is scheduled.
    pub(crate) fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("FemtoDatadogTransport connection {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.shared.state.store(state);
    }

    /// Open and authorize a socket unless one is already held.
    pub(crate) fn connect(&mut self, queue: &DeliveryQueue, now: Instant) {
        if self.socket.is_some() {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        self.shared.stats.record_connect_attempt();
        let stream = match self.connector.open(&self.config) {
            Ok(stream) => stream,
            Err(err) => {
                self.fail(err, queue, now);
                return;
            }
        };

        self.set_state(ConnectionState::Authorizing);
        match self.connector.handshake(stream, &self.config) {
            Ok(Handshake::Authorized(connection)) => {
                self.socket = Some(connection);
                self.last_activity = Some(Instant::now());
                self.set_state(ConnectionState::Ready);
                info!(
                    "FemtoDatadogTransport connected to {}:{}",
                    self.config.host, self.config.port
                );
                queue.resume();
                self.shared.events.emit(TransportEvent::Connected);
            }
            Ok(Handshake::Unauthorized { connection, reason }) => {
                warn!(
                    "FemtoDatadogTransport handshake with {}:{} was not authorized: {reason}",
                    self.config.host, self.config.port
                );
                if let Some(mut connection) = connection {
                    connection.destroy();
                }
                self.tear_down(queue, now, DisconnectReason::Unauthorized);
            }
            Err(err) => self.fail(err, queue, now),
        }
    }

    /// Socket currently eligible for writes; `None` unless ready.
    pub(crate) fn socket_mut(&mut self) -> Option<&mut C::Connection> {
        if self.state != ConnectionState::Ready {
            return None;
        }
        self.socket.as_mut()
    }

    /// Record write activity on the ready socket.
    pub(crate) fn touch(&mut self, now: Instant) {
        if self.is_ready() {
            self.last_activity = Some(now);
        }
    }

    /// Handle an error or timeout reported by the socket.
    pub(crate) fn fail(&mut self, err: TransportError, queue: &DeliveryQueue, now: Instant) {
        let reason = if err.is_timeout() {
            DisconnectReason::Timeout
        } else {
            DisconnectReason::Error
        };
        warn!(
            "FemtoDatadogTransport socket {}:{} failed: {err}",
            self.config.host, self.config.port
        );
        self.tear_down(queue, now, reason);
    }

    /// Fire the reconnect timer and the idle timeout when they are due.
    pub(crate) fn poll(&mut self, queue: &DeliveryQueue, now: Instant) {
        if let Some(at) = self.reconnect_at
            && now >= at
        {
            self.reconnect_at = None;
            debug!("FemtoDatadogTransport reconnect timer fired");
            self.connect(queue, now);
        }
        if let Some(deadline) = self.idle_deadline()
            && now >= deadline
        {
            debug!("FemtoDatadogTransport socket idle beyond timeout");
            self.tear_down(queue, now, DisconnectReason::Timeout);
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        match (self.reconnect_at, self.idle_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn idle_deadline(&self) -> Option<Instant> {
        if !self.is_ready() {
            return None;
        }
        let idle = self.config.socket_options.idle_timeout()?;
        self.last_activity.map(|last| last + idle)
    }

    /// Cancel the timer and release the socket.
    pub(crate) fn close(&mut self, queue: &DeliveryQueue) {
        self.reconnect_at = None;
        queue.pause();
        let had_socket = self.destroy_socket();
        self.set_state(ConnectionState::Disconnected);
        if had_socket {
            self.shared
                .events
                .emit(TransportEvent::Disconnected(DisconnectReason::Closed));
        }
    }

    fn destroy_socket(&mut self) -> bool {
        self.last_activity = None;
        match self.socket.take() {
            Some(mut socket) => {
                socket.destroy();
                true
            }
            None => false,
        }
    }

    fn tear_down(&mut self, queue: &DeliveryQueue, now: Instant, reason: DisconnectReason) {
        self.set_state(ConnectionState::TearingDown);
        self.destroy_socket();
        queue.pause();
        if reason != DisconnectReason::Unauthorized {
            self.schedule_reconnect(queue, now);
        }
        self.shared
            .events
            .emit(TransportEvent::Disconnected(reason));
        if self.reconnect_at.is_none() {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self, queue: &DeliveryQueue, now: Instant) {
        if self.reconnect_at.is_some() || !self.config.reconnect_enabled() || queue.length() == 0 {
            return;
        }
        let at = now + self.config.reconnect_interval;
        self.reconnect_at = Some(at);
        self.shared.stats.record_reconnect_scheduled();
        debug!(
            "FemtoDatadogTransport reconnecting in {:?} with {} records waiting",
            self.config.reconnect_interval,
            queue.length()
        );
    }
}
