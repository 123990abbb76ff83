use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::filter::OccurrenceFilterState;
use crate::application::ports::{
    AlertChannel, Connection, EventFilter, EventSource, SourceError, SubscribeError,
};
use crate::domain::{AlertMessage, FromPoint, Occurrence, SequenceId, WatchdogConfig};

/// The watchdog's explicit state machine. Retry and backoff policy live in
/// the transitions below rather than in ad hoc control flow.
#[derive(Debug, PartialEq)]
pub enum WatchdogState {
    Connecting,
    Subscribing,
    Polling,
    Alerting(Vec<Occurrence>),
    Sleeping,
    Recovering,
    Fatal,
}

impl WatchdogState {
    fn name(&self) -> &'static str {
        match self {
            WatchdogState::Connecting => "connecting",
            WatchdogState::Subscribing => "subscribing",
            WatchdogState::Polling => "polling",
            WatchdogState::Alerting(_) => "alerting",
            WatchdogState::Sleeping => "sleeping",
            WatchdogState::Recovering => "recovering",
            WatchdogState::Fatal => "fatal",
        }
    }
}

/// The only errors that escape the loop. Everything transient is converted
/// into a state change instead.
#[derive(Debug, thiserror::Error)]
pub enum WatchdogFatal {
    #[error("event source unreachable at startup: {0}")]
    Connect(SourceError),
    #[error("subscription rejected: {0}")]
    Subscribe(SubscribeError),
}

/// Orchestrator: owns the cursor and the filter handle, drives the
/// poll/alert cycle, and never terminates except on a fatal configuration
/// failure or cancellation.
pub struct Watchdog<'a> {
    config: &'a WatchdogConfig,
    source: &'a dyn EventSource,
    channel: &'a dyn AlertChannel,
    filter_state: OccurrenceFilterState,
    connection: Option<Box<dyn Connection>>,
    filter: Option<Box<dyn EventFilter>>,
    state: WatchdogState,
    cancel: Arc<AtomicBool>,
}

impl<'a> Watchdog<'a> {
    pub fn new(
        config: &'a WatchdogConfig,
        source: &'a dyn EventSource,
        channel: &'a dyn AlertChannel,
    ) -> Self {
        Self {
            config,
            source,
            channel,
            filter_state: OccurrenceFilterState::new(
                config.contract_address.clone(),
                config.event_name.clone(),
            ),
            connection: None,
            filter: None,
            state: WatchdogState::Connecting,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn cursor(&self) -> FromPoint {
        self.filter_state.from_point()
    }

    /// Setting this flag stops `run` at the next transition boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run until cancelled or fatally misconfigured.
    pub async fn run(&mut self) -> Result<(), WatchdogFatal> {
        while !self.cancel.load(Ordering::Relaxed) {
            self.step().await?;
        }
        info!("watchdog cancelled, shutting down");
        Ok(())
    }

    /// Drive the machine through a single poll/alert cycle: stops at the
    /// first quiet point, whether that is a normal sleep or a backoff after
    /// a transient failure.
    pub async fn run_once(&mut self) -> Result<(), WatchdogFatal> {
        loop {
            self.step().await?;
            if matches!(
                self.state,
                WatchdogState::Sleeping | WatchdogState::Recovering
            ) {
                return Ok(());
            }
        }
    }

    /// Execute exactly one transition.
    pub async fn step(&mut self) -> Result<(), WatchdogFatal> {
        // The placeholder doubles as the terminal state: a fatal early
        // return below leaves the machine parked there.
        let state = std::mem::replace(&mut self.state, WatchdogState::Fatal);
        let from = state.name();

        let next = match state {
            WatchdogState::Connecting => self.on_connect().await?,
            WatchdogState::Subscribing => self.on_subscribe().await?,
            WatchdogState::Polling => self.on_poll().await,
            WatchdogState::Alerting(batch) => self.on_alert(batch).await,
            WatchdogState::Sleeping => {
                tokio::time::sleep(self.config.poll_interval).await;
                WatchdogState::Polling
            }
            WatchdogState::Recovering => {
                tokio::time::sleep(self.config.retry_interval).await;
                if self.connection.is_some() {
                    WatchdogState::Subscribing
                } else {
                    WatchdogState::Connecting
                }
            }
            WatchdogState::Fatal => WatchdogState::Fatal,
        };

        debug!(from, to = next.name(), "state transition");
        self.state = next;
        Ok(())
    }

    async fn on_connect(&mut self) -> Result<WatchdogState, WatchdogFatal> {
        info!(url = %self.config.source_url, "connecting to event source");
        match self.source.connect().await {
            Ok(connection) => {
                self.connection = Some(connection);
                Ok(WatchdogState::Subscribing)
            }
            Err(e) if self.config.retry_initial_connect => {
                warn!(error = %e, "event source unreachable, will retry");
                Ok(WatchdogState::Recovering)
            }
            Err(e) => Err(WatchdogFatal::Connect(e)),
        }
    }

    async fn on_subscribe(&mut self) -> Result<WatchdogState, WatchdogFatal> {
        let Some(connection) = self.connection.as_deref() else {
            return Ok(WatchdogState::Connecting);
        };

        info!(from = %self.filter_state.from_point(), "opening event filter");
        match self.filter_state.open(connection).await {
            Ok(filter) => {
                self.filter = Some(filter);
                Ok(WatchdogState::Polling)
            }
            Err(e @ (SubscribeError::InvalidAddress(_) | SubscribeError::UnknownEvent(_))) => {
                Err(WatchdogFatal::Subscribe(e))
            }
            Err(SubscribeError::Source(e)) => {
                warn!(error = %e, "subscription attempt failed");
                Ok(WatchdogState::Recovering)
            }
        }
    }

    async fn on_poll(&mut self) -> WatchdogState {
        let Some(filter) = self.filter.as_mut() else {
            return WatchdogState::Subscribing;
        };

        match filter.poll().await {
            Ok(batch) if batch.is_empty() => WatchdogState::Sleeping,
            Ok(batch) => {
                info!(count = batch.len(), "new occurrences");
                WatchdogState::Alerting(batch)
            }
            Err(e) => {
                match &e {
                    SourceError::RateLimited(msg) => warn!(%msg, "source throttled the poll"),
                    SourceError::Connection(msg) => warn!(%msg, "poll failed"),
                }
                // most transient failures invalidate server-side filter
                // handles; re-open instead of reusing
                self.filter = None;
                WatchdogState::Recovering
            }
        }
    }

    /// Deliver the batch in ascending order. A failed send is logged and
    /// skipped; it neither blocks the rest of the batch nor gets retried
    /// on a later poll. The cursor advances past the whole batch either
    /// way.
    async fn on_alert(&mut self, batch: Vec<Occurrence>) -> WatchdogState {
        let mut highest: Option<SequenceId> = None;

        for occurrence in batch {
            let message = AlertMessage::for_occurrence(
                &occurrence,
                &self.config.alert_origin,
                &self.config.alert_destination,
            );
            match self.channel.send(&message).await {
                Ok(receipt) => {
                    info!(id = %receipt.id, key = %occurrence.key(), "alert delivered")
                }
                Err(e) => {
                    warn!(error = %e, key = %occurrence.key(), "alert delivery failed, occurrence skipped")
                }
            }
            highest = Some(match highest {
                Some(h) => h.max(occurrence.sequence),
                None => occurrence.sequence,
            });
        }

        if let Some(sequence) = highest {
            self.filter_state.advance_past(sequence);
        }
        WatchdogState::Sleeping
    }
}
