use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::section::{self, Section};
use super::snapshot::{ContentSnapshot, DataSource};
use crate::api::{Fetch, FetchError, RequestOptions};
use crate::cache::{ContentCache, DEFAULT_CACHE_TIMEOUT_MS};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Cache entry holding the last full content payload.
pub const ALL_CONTENT_CACHE_KEY: &str = "all-public-content";

pub const DEFAULT_PRIMARY_ENDPOINT: &str = "/public/content";
pub const DEFAULT_FALLBACK_ENDPOINT: &str = "/public/landing";
pub const DEFAULT_MIN_DISPLAY_TIME_MS: u64 = 1500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStoreConfig {
    pub primary_endpoint: String,
    /// Narrower endpoint tried once after the primary exhausts its retries.
    pub fallback_endpoint: String,
    pub cache_timeout: Duration,
    /// Shortest time a load cycle keeps `loading` set.
    pub min_display_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            primary_endpoint: DEFAULT_PRIMARY_ENDPOINT.to_string(),
            fallback_endpoint: DEFAULT_FALLBACK_ENDPOINT.to_string(),
            cache_timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
            min_display_time: Duration::from_millis(DEFAULT_MIN_DISPLAY_TIME_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Owns the public content snapshot and the cache behind it.
///
/// Observers get read-only clones through [`snapshot`](Self::snapshot) or a
/// [`watch`](Self::watch) receiver that sees every intermediate state,
/// including each section as it is revealed.
pub struct ContentStore {
    fetcher: Arc<dyn Fetch>,
    config: ContentStoreConfig,
    cache: Mutex<ContentCache<Value>>,
    state: watch::Sender<ContentSnapshot>,
    /// Load cycles currently running; only touched inside `send_modify`.
    active_loads: AtomicUsize,
}

impl ContentStore {
    pub fn new(fetcher: Arc<dyn Fetch>, config: ContentStoreConfig) -> Self {
        let cache = ContentCache::new(config.cache_timeout);
        let (state, _) = watch::channel(ContentSnapshot::default());
        Self {
            fetcher,
            config,
            cache: Mutex::new(cache),
            state,
            active_loads: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ContentStoreConfig {
        &self.config
    }

    /// Run one load cycle and return the snapshot it settled on.
    ///
    /// A valid cache entry is served without touching the network unless
    /// `force_refresh` is set. Failures never escape: they end up in the
    /// snapshot's `error` and `retry_count`.
    pub async fn load(&self, force_refresh: bool) -> ContentSnapshot {
        let started = Instant::now();
        let cycle = LoadCycle::begin(self);

        let cached = if force_refresh {
            None
        } else {
            self.cached_payload()
        };

        match cached {
            Some(payload) => {
                debug!(key = ALL_CONTENT_CACHE_KEY, "Serving public content from cache");
                self.hold_for_min_display(started).await;
                self.apply_cached(&payload);
            }
            None => {
                self.fetch_and_apply().await;
                self.hold_for_min_display(started).await;
            }
        }

        cycle.complete();
        self.snapshot()
    }

    pub async fn refresh(&self) -> ContentSnapshot {
        self.load(false).await
    }

    pub async fn force_refresh(&self) -> ContentSnapshot {
        self.load(true).await
    }

    /// Drop the cached payload. Section values already shown are kept.
    pub fn clear_cache(&self) {
        if self.cache().remove(ALL_CONTENT_CACHE_KEY).is_some() {
            debug!(key = ALL_CONTENT_CACHE_KEY, "Content cache cleared");
        }
    }

    pub fn is_cache_valid(&self, name: &str) -> bool {
        self.cache().is_valid(name)
    }

    /// Human-readable age of the cached payload, if any.
    pub fn cache_age_display(&self) -> Option<String> {
        self.cache().age_display(ALL_CONTENT_CACHE_KEY)
    }

    pub fn snapshot(&self) -> ContentSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ContentSnapshot> {
        self.state.subscribe()
    }

    fn cache(&self) -> MutexGuard<'_, ContentCache<Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_payload(&self) -> Option<Value> {
        self.cache()
            .get_valid(ALL_CONTENT_CACHE_KEY)
            .map(|entry| entry.data.clone())
    }

    async fn fetch_content(&self, endpoint: &str) -> Result<Value, FetchError> {
        self.fetcher
            .get(endpoint, &RequestOptions::default())
            .await?
            .into_data()
    }

    async fn fetch_and_apply(&self) {
        self.state.send_modify(|s| s.error = None);

        let primary = self.config.primary_endpoint.as_str();
        let result = retry_with_backoff(self.config.retry, move || self.fetch_content(primary)).await;

        let primary_err = match result {
            Ok(payload) => {
                self.cache().insert(ALL_CONTENT_CACHE_KEY, payload.clone());
                self.reveal_progressively(&payload).await;
                info!(endpoint = primary, "Public content loaded");
                return;
            }
            Err(e) => e,
        };

        let fallback = self.config.fallback_endpoint.as_str();
        warn!(
            error = %primary_err,
            endpoint = fallback,
            "Primary content unavailable, trying fallback"
        );

        match self.fetch_content(fallback).await {
            Ok(payload) => {
                self.apply_fallback(&payload);
                info!(endpoint = fallback, "Loaded reduced content from fallback");
            }
            Err(fallback_err) => {
                let message = format!(
                    "Failed to load content: {}. Fallback failed: {}",
                    primary_err, fallback_err
                );
                error!(error = %message, "Public content unavailable");
                self.state.send_modify(|s| {
                    s.error = Some(message);
                    s.retry_count = s.retry_count.saturating_add(1);
                });
            }
        }
    }

    async fn reveal_progressively(&self, payload: &Value) {
        for section in Section::ALL {
            let value = section::from_primary(payload, section);
            self.state.send_modify(|s| s.reveal(section, value));
            // Let observers render each section before the next one lands
            tokio::task::yield_now().await;
        }

        self.state.send_modify(|s| {
            s.retry_count = 0;
            s.source = Some(DataSource::Network);
            s.last_updated = Some(Utc::now());
        });
    }

    fn apply_cached(&self, payload: &Value) {
        self.state.send_modify(|s| {
            for section in Section::ALL {
                s.reveal(section, section::from_primary(payload, section));
            }
            s.source = Some(DataSource::Cache);
        });
    }

    fn apply_fallback(&self, payload: &Value) {
        self.state.send_modify(|s| {
            for section in Section::FALLBACK {
                if let Some(value) = section::from_fallback(payload, section) {
                    s.fill(section, value);
                }
            }
            s.source = Some(DataSource::Fallback);
            s.last_updated = Some(Utc::now());
        });
    }

    async fn hold_for_min_display(&self, started: Instant) {
        let deadline = started + self.config.min_display_time;
        if Instant::now() < deadline {
            time::sleep_until(deadline).await;
        }
    }
}

/// Keeps `loading` set while any load cycle is running.
///
/// `initial_load` is cleared only by a cycle that reached the end; a cycle
/// dropped half-way (its future cancelled) just releases its share of
/// `loading`.
struct LoadCycle<'a> {
    store: &'a ContentStore,
    completed: bool,
}

impl<'a> LoadCycle<'a> {
    fn begin(store: &'a ContentStore) -> Self {
        store.state.send_modify(|s| {
            store.active_loads.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
        });
        Self {
            store,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for LoadCycle<'_> {
    fn drop(&mut self) {
        let completed = self.completed;
        let active_loads = &self.store.active_loads;
        self.store.state.send_modify(|s| {
            let previous = active_loads.fetch_sub(1, Ordering::SeqCst);
            if previous <= 1 {
                s.loading = false;
            }
            if completed {
                s.initial_load = false;
            }
        });
    }
}
