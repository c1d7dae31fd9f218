use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::api::FetchError;

/// Outcome handed to every subscriber of an endpoint for one fetch.
///
/// All subscribers of the same fetch receive clones of the same `Arc`.
pub type PollResult = Result<Arc<Value>, Arc<FetchError>>;

/// A subscriber callback.
pub type Callback = Arc<dyn Fn(PollResult) + Send + Sync>;

/// Identifies one subscription within a [`Poller`](super::Poller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

/// Diagnostic view of one active endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub subscribers: usize,
    pub in_flight: bool,
    pub has_cached_data: bool,
    pub interval_ms: u64,
}

/// Everything the poller keeps for a single endpoint.
pub(crate) struct EndpointEntry {
    /// Distinguishes this entry from earlier incarnations of the same endpoint.
    pub(crate) generation: u64,
    pub(crate) interval: Duration,
    pub(crate) subscribers: HashMap<SubscriberId, Callback>,
    pub(crate) timer: Option<JoinHandle<()>>,
    pub(crate) cached: Option<Arc<Value>>,
    pub(crate) in_flight: bool,
}

impl EndpointEntry {
    pub(crate) fn new(generation: u64, interval: Duration) -> Self {
        Self {
            generation,
            interval,
            subscribers: HashMap::new(),
            timer: None,
            cached: None,
            in_flight: false,
        }
    }

    pub(crate) fn callbacks(&self) -> Vec<Callback> {
        self.subscribers.values().cloned().collect()
    }

    pub(crate) fn status(&self) -> EndpointStatus {
        EndpointStatus {
            subscribers: self.subscribers.len(),
            in_flight: self.in_flight,
            has_cached_data: self.cached.is_some(),
            interval_ms: self.interval.as_millis() as u64,
        }
    }

    /// Cancel the timer. An in-flight request is left to finish on its own.
    pub(crate) fn stop(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) endpoints: HashMap<String, EndpointEntry>,
    next_subscriber: u64,
    next_generation: u64,
}

impl Registry {
    pub(crate) fn next_subscriber_id(&mut self) -> SubscriberId {
        self.next_subscriber += 1;
        SubscriberId(self.next_subscriber)
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Entry for `endpoint`, only if it is still the incarnation `generation`.
    pub(crate) fn current(&mut self, endpoint: &str, generation: u64) -> Option<&mut EndpointEntry> {
        self.endpoints
            .get_mut(endpoint)
            .filter(|entry| entry.generation == generation)
    }

    pub(crate) fn status(&self) -> BTreeMap<String, EndpointStatus> {
        self.endpoints
            .iter()
            .map(|(endpoint, entry)| (endpoint.clone(), entry.status()))
            .collect()
    }

    /// Remove every endpoint, returning how many were active.
    pub(crate) fn drain(&mut self) -> usize {
        let count = self.endpoints.len();
        for (_, entry) in self.endpoints.drain() {
            entry.stop();
        }
        count
    }
}
