//! In-memory caching for fetched content.
//!
//! This module provides [`ContentCache`], a name-keyed store of
//! [`CachedData`] entries that are considered valid for a fixed window
//! (5 minutes for public content). Entries live only in process memory.

pub mod manager;

pub use manager::{CachedData, ContentCache, DEFAULT_CACHE_TIMEOUT_MS};
