//! Helpers shared by the integration test binaries; each binary uses a
//! different subset.
#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod recording;

pub use recording::{ConnectPlan, RecordingConnector, wait_until};
