//! Lifecycle events published to observers.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::log_record::LogRecord;

/// Why a connection left the ready state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The socket reported an error, including a failed connect.
    Error,
    /// The socket stalled or sat idle beyond the configured timeout.
    Timeout,
    /// The TLS handshake completed without authorization.
    Unauthorized,
    /// The transport was closed.
    Closed,
}

/// Notification emitted by the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A record was handed to the transport, whatever happens to it next.
    Logged(LogRecord),
    /// A socket completed an authorized handshake.
    Connected,
    /// The socket was torn down.
    Disconnected(DisconnectReason),
}

/// Fan-out of events to any number of subscribers.
///
/// Each subscriber owns an unbounded channel, so emitting never blocks.
/// Subscribers that drop their receiver are pruned on the next emission.
#[derive(Default)]
pub(crate) struct EventEmitter {
    subscribers: Mutex<Vec<Sender<TransportEvent>>>,
}

impl EventEmitter {
    pub(crate) fn subscribe(&self) -> Receiver<TransportEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        self.emit_with(|| event);
    }

    /// Build the event only when somebody is listening.
    pub(crate) fn emit_with(&self, build: impl FnOnce() -> TransportEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        let event = build();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
