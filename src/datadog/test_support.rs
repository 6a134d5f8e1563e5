//! Scripted connector used by the transport's unit tests.
//!
//! Each connection attempt consumes the next [`Outcome`] and each write the
//! next [`WriteStep`]; unscripted attempts authorize and unscripted writes
//! are accepted. Counters record what the transport did to the socket.

use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    config::DatadogConfig,
    error::TransportError,
    transport::{Connection, Connector, Handshake, WriteStatus},
};

/// How a connection attempt unfolds.
pub(crate) enum Outcome {
    Authorize,
    Reject,
    RefuseOpen,
    StallHandshake,
    /// Block in the transport phase until the gate fires or closes, then
    /// authorize.
    Gate(Receiver<()>),
}

/// How a single write unfolds.
#[derive(Clone, Copy, Debug)]
pub(crate) enum WriteStep {
    Accept,
    Backpressure,
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Outcome>,
    writes: VecDeque<WriteStep>,
    opens: usize,
    destroyed: usize,
    writable_waits: usize,
    frames: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.lock().outcomes.extend(outcomes);
        self
    }

    pub(crate) fn with_writes(self, writes: impl IntoIterator<Item = WriteStep>) -> Self {
        self.script.lock().writes.extend(writes);
        self
    }

    pub(crate) fn opens(&self) -> usize {
        self.script.lock().opens
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.script.lock().destroyed
    }

    pub(crate) fn writable_waits(&self) -> usize {
        self.script.lock().writable_waits
    }

    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.script.lock().frames.clone()
    }

    /// `message` field of every frame written so far.
    pub(crate) fn messages(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|frame| {
                let line = std::str::from_utf8(frame).expect("utf-8 frame");
                let json = line
                    .trim_end_matches("\r\n")
                    .split_once(' ')
                    .map_or(line, |(_, body)| body);
                let body: Value = serde_json::from_str(json).expect("json body");
                body["message"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }
}

pub(crate) struct ScriptedStream {
    outcome: Outcome,
}

pub(crate) struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;
    type Connection = ScriptedConnection;

    fn open(&mut self, _config: &DatadogConfig) -> Result<ScriptedStream, TransportError> {
        let outcome = {
            let mut script = self.script.lock();
            script.opens += 1;
            script.outcomes.pop_front().unwrap_or(Outcome::Authorize)
        };
        match outcome {
            Outcome::RefuseOpen => Err(io::Error::from(io::ErrorKind::ConnectionRefused).into()),
            Outcome::Gate(gate) => {
                let _ = gate.recv_timeout(Duration::from_secs(5));
                Ok(ScriptedStream {
                    outcome: Outcome::Authorize,
                })
            }
            outcome => Ok(ScriptedStream { outcome }),
        }
    }

    fn handshake(
        &mut self,
        stream: ScriptedStream,
        _config: &DatadogConfig,
    ) -> Result<Handshake<ScriptedConnection>, TransportError> {
        let connection = ScriptedConnection {
            script: Arc::clone(&self.script),
        };
        match stream.outcome {
            Outcome::Reject => Ok(Handshake::Unauthorized {
                connection: Some(connection),
                reason: "self-signed certificate".into(),
            }),
            Outcome::StallHandshake => Err(TransportError::Timeout),
            _ => Ok(Handshake::Authorized(connection)),
        }
    }
}

impl Connection for ScriptedConnection {
    fn write(&mut self, frame: &[u8]) -> io::Result<WriteStatus> {
        let mut script = self.script.lock();
        match script.writes.pop_front().unwrap_or(WriteStep::Accept) {
            WriteStep::Accept => {
                script.frames.push(frame.to_vec());
                Ok(WriteStatus::Accepted)
            }
            WriteStep::Backpressure => {
                script.frames.push(frame.to_vec());
                Ok(WriteStatus::Pending)
            }
            WriteStep::Fail(kind) => Err(kind.into()),
        }
    }

    fn wait_writable(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        self.script.lock().writable_waits += 1;
        Ok(())
    }

    fn destroy(&mut self) {
        self.script.lock().destroyed += 1;
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}
