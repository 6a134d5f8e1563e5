//! Bounded FIFO of records awaiting transmission.
//!
//! Producers push from any thread; the worker thread is the only consumer.
//! The queue starts paused and only the connection manager resumes it once a
//! socket is ready. Waiting entries live in a bounded `crossbeam` channel, so
//! a full buffer rejects new records instead of blocking the producer. A
//! single head slot holds an entry whose write failed so it is retried before
//! anything that arrived later.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use thiserror::Error;

use crate::log_record::LogRecord;

/// A record waiting for the transmission worker.
#[derive(Debug)]
pub struct PendingEntry {
    record: LogRecord,
    attempts: u32,
}

impl PendingEntry {
    pub fn new(record: LogRecord) -> Self {
        Self {
            record,
            attempts: 0,
        }
    }

    pub fn record(&self) -> &LogRecord {
        &self.record
    }

    /// Number of writes attempted for this entry so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn mark_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }
}

/// Returned by [`DeliveryQueue::push`] when the buffer is at capacity.
#[derive(Debug, Error)]
#[error("delivery queue is full")]
pub struct QueueFull(pub PendingEntry);

struct QueueShared {
    paused: AtomicBool,
    head: Mutex<Option<PendingEntry>>,
    /// Entries waiting or in flight, bounded by capacity; zero means drained.
    outstanding: AtomicUsize,
    drain_waiters: Mutex<Vec<Sender<()>>>,
}

/// Order-preserving, single-consumer queue with pause/resume control.
#[derive(Clone)]
pub struct DeliveryQueue {
    capacity: usize,
    tx: Sender<PendingEntry>,
    rx: Receiver<PendingEntry>,
    shared: Arc<QueueShared>,
}

impl DeliveryQueue {
    /// Create a paused queue holding at most `capacity` waiting entries.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            capacity,
            tx,
            rx,
            shared: Arc::new(QueueShared {
                paused: AtomicBool::new(true),
                head: Mutex::new(None),
                outstanding: AtomicUsize::new(0),
                drain_waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Append `entry` at the tail without blocking.
    ///
    /// The in-flight entry keeps its slot until it completes, so a failed
    /// write parked in the head slot never lifts the queue past capacity.
    pub fn push(&self, entry: PendingEntry) -> Result<(), QueueFull> {
        let reserved = self.shared.outstanding.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |outstanding| (outstanding < self.capacity).then_some(outstanding + 1),
        );
        if reserved.is_err() {
            return Err(QueueFull(entry));
        }
        match self.tx.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(entry) | TrySendError::Disconnected(entry)) => {
                self.release();
                Err(QueueFull(entry))
            }
        }
    }

    /// Stop the worker from starting further entries.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    /// Allow the worker to start the next entry.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Number of entries waiting; an entry being written is not counted.
    pub fn length(&self) -> usize {
        self.rx.len() + usize::from(self.shared.head.lock().is_some())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether no entry is waiting or in flight.
    pub fn is_idle(&self) -> bool {
        self.shared.outstanding.load(Ordering::Acquire) == 0
    }

    /// Block until the queue is empty and idle, or `timeout` elapses.
    ///
    /// Returns `true` once drained. This never consumes entries itself; it
    /// waits for the worker to complete them.
    pub fn drain(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        {
            let mut waiters = self.shared.drain_waiters.lock();
            if self.is_idle() {
                return true;
            }
            waiters.push(ack_tx);
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    pub(crate) fn receiver(&self) -> &Receiver<PendingEntry> {
        &self.rx
    }

    /// Take the entry parked by [`requeue`](Self::requeue), if any.
    pub(crate) fn take_head(&self) -> Option<PendingEntry> {
        self.shared.head.lock().take()
    }

    /// Park a failed in-flight entry so it is retried before newer ones.
    pub(crate) fn requeue(&self, entry: PendingEntry) {
        let previous = self.shared.head.lock().replace(entry);
        debug_assert!(previous.is_none(), "only one entry may be in flight");
    }

    /// Mark the in-flight entry as finished, successfully or not.
    pub(crate) fn complete(&self) {
        self.release();
    }

    fn release(&self) {
        let mut waiters = self.shared.drain_waiters.lock();
        let previous = self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            for waiter in waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("capacity", &self.capacity)
            .field("length", &self.length())
            .field("paused", &self.is_paused())
            .finish()
    }
}
