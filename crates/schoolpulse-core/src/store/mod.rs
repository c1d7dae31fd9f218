//! Public content store.
//!
//! Loads the school's public content (settings, staff, events and the rest)
//! into one [`ContentSnapshot`], with a five minute cache, exponential retry,
//! a narrower fallback endpoint, and per-section loading flags so a UI can
//! reveal sections as they arrive.

mod content;
mod refresh;
mod section;
mod snapshot;

pub use content::{
    ContentStore, ContentStoreConfig, ALL_CONTENT_CACHE_KEY, DEFAULT_FALLBACK_ENDPOINT,
    DEFAULT_MIN_DISPLAY_TIME_MS, DEFAULT_PRIMARY_ENDPOINT,
};
pub use refresh::{spawn_auto_refresh, AutoRefreshHandle};
pub use section::{derive_stats, SchoolStats, Section};
pub use snapshot::{ContentSnapshot, DataSource};
