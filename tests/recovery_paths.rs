use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chainwatch::application::ports::{
    AlertChannel, DeliveryError, SourceError, SubscribeError,
};
use chainwatch::application::watchdog::{Watchdog, WatchdogFatal, WatchdogState};
use chainwatch::domain::{
    AlertMessage, DeliveryReceipt, FromPoint, SequenceId, WatchdogConfig,
};
use chainwatch::infrastructure::fake_source::{occurrence, ScriptedEventSource};

const ADDR: &str = "0x1111111111111111111111111111111111111111";

#[derive(Clone, Default)]
struct CountingChannel {
    count: Arc<AtomicU32>,
}

impl CountingChannel {
    fn new() -> Self {
        Self::default()
    }

    fn get(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertChannel for CountingChannel {
    async fn send(&self, _message: &AlertMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryReceipt {
            id: format!("SM{}", n),
        })
    }
}

fn test_config(event_name: &str) -> WatchdogConfig {
    WatchdogConfig {
        source_url: "http://localhost:8545".into(),
        contract_address: ADDR.into(),
        event_name: event_name.into(),
        poll_interval: Duration::from_millis(1),
        retry_interval: Duration::from_millis(2),
        alert_origin: "+15005550006".into(),
        alert_destination: "+15005550009".into(),
        retry_initial_connect: false,
    }
}

#[tokio::test]
async fn poll_failure_preserves_the_cursor_for_resubscription() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    source.push_poll(Ok(vec![occurrence("Transfer", ADDR, 100, 0, &[])]));
    source.push_poll(Err(SourceError::Connection("socket closed".into())));

    let channel = CountingChannel::new();
    let config = test_config("Transfer");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    // first cycle delivers and advances the cursor
    for _ in 0..4 {
        watchdog.step().await.unwrap();
    }
    assert_eq!(
        watchdog.cursor(),
        FromPoint::After(SequenceId::new(100, 0))
    );

    // sleeping -> polling -> recovering -> subscribing -> polling
    for _ in 0..4 {
        watchdog.step().await.unwrap();
    }
    assert!(matches!(watchdog.state(), WatchdogState::Polling));

    // the re-subscription used the pre-failure cursor, not latest
    assert_eq!(
        source.subscriptions(),
        vec![
            FromPoint::Latest,
            FromPoint::After(SequenceId::new(100, 0))
        ]
    );
    assert_eq!(
        watchdog.cursor(),
        FromPoint::After(SequenceId::new(100, 0))
    );
}

#[tokio::test]
async fn rate_limited_poll_recovers_after_backoff() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    source.push_poll(Err(SourceError::RateLimited("HTTP 429".into())));
    source.push_poll(Ok(vec![occurrence("Transfer", ADDR, 102, 3, &[])]));

    let channel = CountingChannel::new();
    let config = test_config("Transfer");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    // connect, subscribe, throttled poll, backoff, resubscribe, poll, alert
    for _ in 0..7 {
        watchdog.step().await.unwrap();
    }
    assert!(matches!(watchdog.state(), WatchdogState::Sleeping));

    assert_eq!(source.subscriptions().len(), 2);
    assert_eq!(channel.get(), 1);
    assert_eq!(
        watchdog.cursor(),
        FromPoint::After(SequenceId::new(102, 3))
    );
}

#[tokio::test]
async fn unknown_event_is_fatal() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    let channel = CountingChannel::new();
    let config = test_config("Mint");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    watchdog.step().await.unwrap();
    let err = watchdog.step().await.unwrap_err();
    assert!(matches!(
        err,
        WatchdogFatal::Subscribe(SubscribeError::UnknownEvent(_))
    ));
    assert!(matches!(watchdog.state(), WatchdogState::Fatal));
}

#[tokio::test]
async fn bad_address_checksum_is_fatal() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    let channel = CountingChannel::new();
    let mut config = test_config("Transfer");
    // mixed case with the first letter's case flipped
    config.contract_address = "0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed".into();
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    watchdog.step().await.unwrap();
    let err = watchdog.step().await.unwrap_err();
    assert!(matches!(
        err,
        WatchdogFatal::Subscribe(SubscribeError::InvalidAddress(_))
    ));
    assert!(matches!(watchdog.state(), WatchdogState::Fatal));
}

#[tokio::test]
async fn unreachable_source_at_startup_is_fatal_by_default() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    source.fail_connects(1);

    let channel = CountingChannel::new();
    let config = test_config("Transfer");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    let err = watchdog.step().await.unwrap_err();
    assert!(matches!(err, WatchdogFatal::Connect(_)));
    assert!(matches!(watchdog.state(), WatchdogState::Fatal));
}

#[tokio::test]
async fn unreachable_source_retries_when_configured() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    source.fail_connects(1);

    let channel = CountingChannel::new();
    let mut config = test_config("Transfer");
    config.retry_initial_connect = true;
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    // connecting -> recovering -> connecting -> subscribing -> polling
    for _ in 0..4 {
        watchdog.step().await.unwrap();
    }
    assert!(matches!(watchdog.state(), WatchdogState::Polling));
    assert_eq!(source.subscriptions().len(), 1);
}

#[tokio::test]
async fn cancellation_stops_the_loop_between_transitions() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    let channel = CountingChannel::new();
    let config = test_config("Transfer");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    watchdog.cancel_flag().store(true, Ordering::SeqCst);
    watchdog.run().await.unwrap();
    assert!(matches!(watchdog.state(), WatchdogState::Connecting));
}

#[tokio::test]
async fn run_once_stops_at_the_first_quiet_point() {
    let source = ScriptedEventSource::new(&["Transfer"]);
    source.push_poll(Ok(vec![occurrence("Transfer", ADDR, 50, 0, &[])]));

    let channel = CountingChannel::new();
    let config = test_config("Transfer");
    let mut watchdog = Watchdog::new(&config, &source, &channel);

    watchdog.run_once().await.unwrap();
    assert!(matches!(watchdog.state(), WatchdogState::Sleeping));
    assert_eq!(channel.get(), 1);
}
