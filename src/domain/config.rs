use std::time::Duration;

/// Validated runtime configuration, immutable for the process lifetime.
/// Produced only by `interfaces::config`, which owns loading and
/// validation.
#[derive(Clone, Debug)]
pub struct WatchdogConfig {
    pub source_url: String,
    pub contract_address: String,
    pub event_name: String,
    /// Wait between polls when the previous cycle succeeded.
    pub poll_interval: Duration,
    /// Wait before re-subscribing after a transient failure. Strictly
    /// greater than `poll_interval`; validation enforces it.
    pub retry_interval: Duration,
    pub alert_origin: String,
    pub alert_destination: String,
    /// When false (default), an unreachable endpoint at startup is treated
    /// as misconfiguration and is fatal. When true the first connect is
    /// retried with backoff like any other transient failure.
    pub retry_initial_connect: bool,
}
