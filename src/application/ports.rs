use async_trait::async_trait;

use crate::domain::{AlertMessage, DeliveryReceipt, FromPoint, Occurrence};

/// Transient failures of the event source. Both drive the recovery path;
/// the distinction only matters for logging.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
}

/// Failure to open a filter. The first two variants are validation causes
/// and fatal; a source-level rejection is transient.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("address rejected: {0}")]
    InvalidAddress(String),
    #[error("event '{0}' not present in the contract ABI")]
    UnknownEvent(String),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Failure to deliver one alert. Subsumes auth, quota and transport
/// failures; the watchdog never distinguishes them.
#[derive(Debug, thiserror::Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// A remote event source that can be probed for reachability.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, SourceError>;
}

/// An established endpoint that can open event filters.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn subscribe(
        &self,
        address: &str,
        event_name: &str,
        from: FromPoint,
    ) -> Result<Box<dyn EventFilter>, SubscribeError>;
}

/// A live subscription handle. `poll` yields occurrences in ascending
/// sequence order; an empty batch is a normal result, not an error.
#[async_trait]
pub trait EventFilter: Send + Sync {
    async fn poll(&mut self) -> Result<Vec<Occurrence>, SourceError>;
}

/// Deliver one alert out of band.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<DeliveryReceipt, DeliveryError>;
}
