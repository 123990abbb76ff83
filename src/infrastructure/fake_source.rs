//! Scripted event source for driving the watchdog in tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::ports::{
    Connection, EventFilter, EventSource, SourceError, SubscribeError,
};
use crate::domain::{FromPoint, Occurrence, SequenceId};
use crate::infrastructure::abi::parse_checksummed;

struct Shared {
    known_events: Vec<String>,
    polls: Mutex<VecDeque<Result<Vec<Occurrence>, SourceError>>>,
    connect_failures: Mutex<u32>,
    subscriptions: Mutex<Vec<FromPoint>>,
}

/// Each `push_poll` outcome is consumed by one `poll` call, in order; an
/// exhausted script polls empty. Subscriptions validate the address and
/// event name the way a real source would, and record the `FromPoint` they
/// were opened with.
pub struct ScriptedEventSource {
    shared: Arc<Shared>,
}

impl ScriptedEventSource {
    pub fn new(known_events: &[&str]) -> Self {
        Self {
            shared: Arc::new(Shared {
                known_events: known_events.iter().map(|s| s.to_string()).collect(),
                polls: Mutex::new(VecDeque::new()),
                connect_failures: Mutex::new(0),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn push_poll(&self, outcome: Result<Vec<Occurrence>, SourceError>) {
        self.shared.polls.lock().unwrap().push_back(outcome);
    }

    /// Fail the next `n` connect attempts before succeeding.
    pub fn fail_connects(&self, n: u32) {
        *self.shared.connect_failures.lock().unwrap() = n;
    }

    /// Every `FromPoint` a subscription was opened with, in order.
    pub fn subscriptions(&self) -> Vec<FromPoint> {
        self.shared.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for ScriptedEventSource {
    async fn connect(&self) -> Result<Box<dyn Connection>, SourceError> {
        let mut failures = self.shared.connect_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(SourceError::Connection("scripted connect failure".into()));
        }
        drop(failures);
        Ok(Box::new(ScriptedConnection {
            shared: self.shared.clone(),
        }))
    }
}

struct ScriptedConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn subscribe(
        &self,
        address: &str,
        event_name: &str,
        from: FromPoint,
    ) -> Result<Box<dyn EventFilter>, SubscribeError> {
        parse_checksummed(address).map_err(SubscribeError::InvalidAddress)?;
        if !self.shared.known_events.iter().any(|e| e == event_name) {
            return Err(SubscribeError::UnknownEvent(event_name.to_string()));
        }
        self.shared.subscriptions.lock().unwrap().push(from);
        Ok(Box::new(ScriptedFilter {
            shared: self.shared.clone(),
        }))
    }
}

struct ScriptedFilter {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventFilter for ScriptedFilter {
    async fn poll(&mut self) -> Result<Vec<Occurrence>, SourceError> {
        match self.shared.polls.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(Vec::new()),
        }
    }
}

/// Shorthand occurrence builder for test scripts.
pub fn occurrence(
    event_name: &str,
    address: &str,
    block: u64,
    log_index: u32,
    attrs: &[(&str, &str)],
) -> Occurrence {
    let attributes: BTreeMap<String, serde_json::Value> = attrs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    Occurrence {
        event_name: event_name.to_string(),
        source_address: address.to_string(),
        attributes,
        sequence: SequenceId::new(block, log_index),
    }
}
