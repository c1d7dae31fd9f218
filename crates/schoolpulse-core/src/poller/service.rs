use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::registry::{Callback, EndpointEntry, EndpointStatus, PollResult, Registry, SubscriberId};
use crate::api::{Fetch, FetchError, RequestOptions};

// ============================================================================
// Constants
// ============================================================================

/// Polling cadence used when the first subscriber does not ask for one.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;

/// Hard limit on a single poll request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub default_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

struct Shared {
    fetcher: Arc<dyn Fetch>,
    config: PollerConfig,
    registry: Mutex<Registry>,
}

impl Shared {
    /// No callback ever runs under this lock, so a poisoned guard is still consistent.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_subscriber(&self, endpoint: &str, id: SubscriberId) -> bool {
        let mut registry = self.registry();
        let (removed, remaining) = match registry.endpoints.get_mut(endpoint) {
            Some(entry) => (entry.subscribers.remove(&id).is_some(), entry.subscribers.len()),
            None => return false,
        };

        if remaining == 0 {
            if let Some(entry) = registry.endpoints.remove(endpoint) {
                entry.stop();
                info!(endpoint, "Last subscriber left, polling stopped");
            }
        } else if removed {
            debug!(endpoint, remaining, "Subscriber removed");
        }
        removed
    }

    /// De-duplicated fetch of `endpoint`. Returns whether a request was issued.
    async fn fetch(self: Arc<Self>, endpoint: String) -> bool {
        let generation = {
            let mut registry = self.registry();
            let Some(entry) = registry.endpoints.get_mut(&endpoint) else {
                debug!(endpoint = %endpoint, "No subscribers, fetch skipped");
                return false;
            };
            if entry.in_flight {
                debug!(endpoint = %endpoint, "Request already in flight, skipping");
                return false;
            }
            entry.in_flight = true;
            entry.generation
        };
        let _in_flight = InFlightGuard {
            shared: &self,
            endpoint: &endpoint,
            generation,
        };

        let outcome = self.request(&endpoint).await;

        let callbacks = {
            let mut registry = self.registry();
            match registry.current(&endpoint, generation) {
                Some(entry) => {
                    if let Ok(data) = &outcome {
                        entry.cached = Some(Arc::clone(data));
                    }
                    entry.callbacks()
                }
                None => {
                    debug!(endpoint = %endpoint, "Endpoint torn down while request was in flight");
                    Vec::new()
                }
            }
        };

        match &outcome {
            Ok(_) => debug!(endpoint = %endpoint, subscribers = callbacks.len(), "Poll succeeded"),
            Err(e) if e.is_transient() => warn!(endpoint = %endpoint, error = %e, "Poll failed"),
            Err(e) => error!(
                endpoint = %endpoint,
                error = %e,
                "Poll failed, later ticks will likely fail the same way"
            ),
        }
        notify(&endpoint, &callbacks, &outcome);
        true
    }

    async fn request(&self, endpoint: &str) -> PollResult {
        let timeout = self.config.request_timeout;
        let options = RequestOptions::polling(timeout);

        let result = match time::timeout(timeout, self.fetcher.get(endpoint, &options)).await {
            Ok(Ok(envelope)) => envelope.into_data(),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::Timeout(timeout)),
        };
        result.map(Arc::new).map_err(Arc::new)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain();
    }
}

/// Clears the in-flight marker however the fetch ends, including cancellation.
struct InFlightGuard<'a> {
    shared: &'a Shared,
    endpoint: &'a str,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.shared.registry().current(self.endpoint, self.generation) {
            entry.in_flight = false;
        }
    }
}

/// Deliver one outcome to every callback; a panicking callback is logged and skipped.
fn notify(endpoint: &str, callbacks: &[Callback], outcome: &PollResult) {
    for callback in callbacks {
        let result = outcome.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(result))) {
            error!(
                endpoint,
                panic = panic_message(payload.as_ref()),
                "Subscriber callback panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

fn spawn_timer(shared: Weak<Shared>, endpoint: String, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The first tick completes immediately, giving the subscribe-time fetch.
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            // Detached so a slow request never delays the cadence.
            tokio::spawn(shared.fetch(endpoint.clone()));
        }
    })
}

/// Runs exactly one recurring fetch per endpoint and fans results out to
/// every subscriber of that endpoint.
///
/// Cloning is cheap; clones share the same registry. Must be used from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct Poller {
    shared: Arc<Shared>,
}

impl Poller {
    pub fn new(fetcher: Arc<dyn Fetch>, config: PollerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                fetcher,
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.shared.config
    }

    /// Register `on_result` for `endpoint`.
    ///
    /// The first subscriber of an endpoint starts its timer, which fetches
    /// immediately and then every `interval` (default
    /// [`PollerConfig::default_interval`]). Later subscribers join the
    /// existing cadence; their `interval` is ignored.
    pub fn subscribe<F>(
        &self,
        endpoint: impl Into<String>,
        on_result: F,
        interval: Option<Duration>,
    ) -> Subscription
    where
        F: Fn(PollResult) + Send + Sync + 'static,
    {
        let endpoint = endpoint.into();
        let callback: Callback = Arc::new(on_result);

        let mut registry = self.shared.registry();
        let id = registry.next_subscriber_id();

        match registry.endpoints.get_mut(&endpoint) {
            Some(entry) => {
                if let Some(requested) = interval.filter(|requested| *requested != entry.interval) {
                    debug!(
                        endpoint = %endpoint,
                        requested_ms = requested.as_millis() as u64,
                        active_ms = entry.interval.as_millis() as u64,
                        "Endpoint already polling, requested interval ignored"
                    );
                }
                entry.subscribers.insert(id, callback);
                debug!(endpoint = %endpoint, subscribers = entry.subscribers.len(), "Subscriber joined");
            }
            None => {
                let period = interval
                    .unwrap_or(self.shared.config.default_interval)
                    .max(MIN_POLL_INTERVAL);
                let generation = registry.next_generation();

                let mut entry = EndpointEntry::new(generation, period);
                entry.subscribers.insert(id, callback);
                entry.timer = Some(spawn_timer(Arc::downgrade(&self.shared), endpoint.clone(), period));
                registry.endpoints.insert(endpoint.clone(), entry);

                info!(endpoint = %endpoint, interval_ms = period.as_millis() as u64, "Polling started");
            }
        }
        drop(registry);

        Subscription {
            shared: Arc::downgrade(&self.shared),
            endpoint,
            id,
            active: true,
        }
    }

    /// Remove one subscriber. The last one out stops the timer and drops the cache.
    pub fn unsubscribe(&self, endpoint: &str, id: SubscriberId) -> bool {
        self.shared.remove_subscriber(endpoint, id)
    }

    /// Fetch `endpoint` now, unless a request for it is already in flight.
    ///
    /// Returns `false` when nothing was issued (in flight, or no subscribers).
    pub async fn refresh(&self, endpoint: &str) -> bool {
        Arc::clone(&self.shared).fetch(endpoint.to_string()).await
    }

    /// Last successful payload for `endpoint`, without touching the network.
    pub fn get_cached(&self, endpoint: &str) -> Option<Arc<Value>> {
        self.shared
            .registry()
            .endpoints
            .get(endpoint)
            .and_then(|entry| entry.cached.clone())
    }

    pub fn status(&self) -> BTreeMap<String, EndpointStatus> {
        self.shared.registry().status()
    }

    pub fn is_polling(&self, endpoint: &str) -> bool {
        self.shared.registry().endpoints.contains_key(endpoint)
    }

    pub fn endpoint_count(&self) -> usize {
        self.shared.registry().endpoints.len()
    }

    /// Cancel every timer and forget every endpoint.
    pub fn stop_all(&self) {
        let stopped = self.shared.registry().drain();
        if stopped > 0 {
            info!(endpoints = stopped, "All polling stopped");
        }
    }
}

/// Handle returned by [`Poller::subscribe`].
///
/// Dropping it unsubscribes, so hold it for as long as updates are wanted.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    shared: Weak<Shared>,
    endpoint: String,
    id: SubscriberId,
    active: bool,
}

impl Subscription {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_subscriber(&self.endpoint, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("endpoint", &self.endpoint)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
