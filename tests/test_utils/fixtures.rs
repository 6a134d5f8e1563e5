//! Shared rstest fixtures for transport integration tests.

use std::time::Duration;

use femto_datadog::DatadogOptions;
use rstest::fixture;

/// Options pointing at a fake intake with a short reconnect interval.
#[fixture]
pub fn options(
    #[default(Duration::from_millis(20))] reconnect_interval: Duration,
) -> DatadogOptions {
    DatadogOptions::new()
        .with_host("intake.test")
        .with_api_key("integration-key")
        .with_reconnect_interval(reconnect_interval)
}
