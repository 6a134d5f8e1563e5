//! Delivery counters shared between the ingress API and the worker.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    accepted: AtomicU64,
    sent: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_unserialisable: AtomicU64,
    connect_attempts: AtomicU64,
    reconnects_scheduled: AtomicU64,
}

macro_rules! counter {
    ($fn_name:ident, $field:ident) => {
        pub(crate) fn $fn_name(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl StatsCounters {
    counter!(record_accepted, accepted);
    counter!(record_sent, sent);
    counter!(record_overflow, dropped_overflow);
    counter!(record_unserialisable, dropped_unserialisable);
    counter!(record_connect_attempt, connect_attempts);
    counter!(record_reconnect_scheduled, reconnects_scheduled);

    pub(crate) fn snapshot(&self) -> TransportStats {
        TransportStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_unserialisable: self.dropped_unserialisable.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the transport's delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Records accepted into the queue.
    pub accepted: u64,
    /// Records fully written to a socket.
    pub sent: u64,
    /// Records dropped because the buffer was full or the transport closed.
    pub dropped_overflow: u64,
    /// Records dropped because they could not be framed.
    pub dropped_unserialisable: u64,
    /// Connection attempts started, including reconnects.
    pub connect_attempts: u64,
    /// Reconnect timers scheduled.
    pub reconnects_scheduled: u64,
}
