//! In-memory connector that records every frame the transport writes.
//!
//! Frames land in a shared wire buffer instead of a socket, so integration
//! tests can assert on exactly what would have crossed the network.

use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use femto_datadog::{
    DatadogConfig,
    datadog::{Connection, Connector, Handshake, TransportError, WriteStatus},
};
use parking_lot::{Mutex, MutexGuard};

/// How the next connection attempt behaves.
#[derive(Clone, Copy, Debug)]
pub enum ConnectPlan {
    /// Authorize, then fail after `writes` successful writes.
    FailAfter { writes: usize },
    /// Complete the handshake without authorization.
    Reject,
    /// Refuse the transport-level connection.
    Refuse,
}

#[derive(Default)]
struct Wire {
    plans: VecDeque<ConnectPlan>,
    frames: Vec<String>,
    opens: usize,
    destroyed: usize,
}

/// Thread-safe connector writing frames into a shared buffer.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    wire: Arc<Mutex<Wire>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue plans for the next connection attempts; later attempts authorize
    /// and accept every write.
    pub fn with_plans(self, plans: impl IntoIterator<Item = ConnectPlan>) -> Self {
        self.lock().plans.extend(plans);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock()
    }

    /// Snapshot of every frame written so far.
    pub fn frames(&self) -> Vec<String> {
        self.lock().frames.clone()
    }

    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn destroyed(&self) -> usize {
        self.lock().destroyed
    }
}

pub struct RecordingConnection {
    wire: Arc<Mutex<Wire>>,
    remaining: Option<usize>,
}

impl Connector for RecordingConnector {
    type Stream = Option<ConnectPlan>;
    type Connection = RecordingConnection;

    fn open(&mut self, _config: &DatadogConfig) -> Result<Self::Stream, TransportError> {
        let mut wire = self.lock();
        wire.opens += 1;
        match wire.plans.pop_front() {
            Some(ConnectPlan::Refuse) => {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
            }
            plan => Ok(plan),
        }
    }

    fn handshake(
        &mut self,
        plan: Self::Stream,
        _config: &DatadogConfig,
    ) -> Result<Handshake<RecordingConnection>, TransportError> {
        let connection = RecordingConnection {
            wire: Arc::clone(&self.wire),
            remaining: None,
        };
        Ok(match plan {
            Some(ConnectPlan::Reject) => Handshake::Unauthorized {
                connection: Some(connection),
                reason: "certificate rejected".into(),
            },
            Some(ConnectPlan::FailAfter { writes }) => Handshake::Authorized(RecordingConnection {
                remaining: Some(writes),
                ..connection
            }),
            _ => Handshake::Authorized(connection),
        })
    }
}

impl Connection for RecordingConnection {
    fn write(&mut self, frame: &[u8]) -> io::Result<WriteStatus> {
        match self.remaining.as_mut() {
            Some(0) => return Err(io::ErrorKind::BrokenPipe.into()),
            Some(left) => *left -= 1,
            None => {}
        }
        let line = String::from_utf8_lossy(frame).into_owned();
        self.wire.lock().frames.push(line);
        Ok(WriteStatus::Accepted)
    }

    fn wait_writable(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }

    fn destroy(&mut self) {
        self.wire.lock().destroyed += 1;
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}
