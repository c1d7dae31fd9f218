use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

/// Public content is considered fresh for 5 minutes.
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    /// Wall-clock time the entry was stored, for display.
    pub cached_at: DateTime<Utc>,
    /// Monotonic time the entry was stored; validity is judged against this.
    stored_at: Instant,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            stored_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn age_minutes(&self) -> u64 {
        self.age().as_secs() / 60
    }

    /// Coarse age for status lines: minutes, then hours and days rounded
    /// to the nearest unit.
    pub fn age_display(&self) -> String {
        const HOUR: u64 = 60;
        const DAY: u64 = 24 * HOUR;

        match self.age_minutes() {
            0 => "just now".to_string(),
            m if m < HOUR => format!("{}m ago", m),
            m if m < DAY => format!("{}h ago", (m + HOUR / 2) / HOUR),
            m => format!("{}d ago", (m + DAY / 2) / DAY),
        }
    }

    /// Valid while strictly younger than `timeout`.
    pub fn is_valid(&self, timeout: Duration) -> bool {
        self.age() < timeout
    }
}

/// In-memory, name-keyed cache with a single validity window.
///
/// Writes are last-writer-wins. Nothing is persisted; a restart starts cold.
#[derive(Debug)]
pub struct ContentCache<T> {
    entries: HashMap<String, CachedData<T>>,
    timeout: Duration,
}

impl<T> ContentCache<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The entry for `name`, only if it is still inside the validity window.
    pub fn get_valid(&self, name: &str) -> Option<&CachedData<T>> {
        match self.entries.get(name) {
            Some(entry) if entry.is_valid(self.timeout) => Some(entry),
            Some(entry) => {
                debug!(cache = name, age_secs = entry.age().as_secs(), "Cache entry expired");
                None
            }
            None => None,
        }
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|entry| entry.is_valid(self.timeout))
            .unwrap_or(false)
    }

    pub fn insert(&mut self, name: impl Into<String>, data: T) {
        self.entries.insert(name.into(), CachedData::new(data));
    }

    pub fn remove(&mut self, name: &str) -> Option<CachedData<T>> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human readable age of an entry, valid or not.
    pub fn age_display(&self, name: &str) -> Option<String> {
        self.entries.get(name).map(|entry| entry.age_display())
    }
}

// ============================================================================
// Tests
// ============================================================================
