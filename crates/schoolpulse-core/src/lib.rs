//! Core library for schoolpulse.
//!
//! Two client-side data components for a school website backend:
//!
//! - [`poller::Poller`] shares one timer and one in-flight request per
//!   endpoint among any number of subscribers.
//! - [`store::ContentStore`] loads the public content snapshot with caching,
//!   exponential retry, a fallback endpoint and per-section loading flags.
//!
//! Both talk to the backend only through the [`api::Fetch`] trait, so hosts
//! can inject [`api::HttpFetcher`] or their own transport.

pub mod api;
pub mod cache;
pub mod config;
pub mod poller;
pub mod retry;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiEnvelope, Fetch, FetchError, HttpFetcher, RequestOptions};
pub use config::Config;
pub use poller::{PollResult, Poller, PollerConfig, Subscription};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use store::{
    spawn_auto_refresh, AutoRefreshHandle, ContentSnapshot, ContentStore, ContentStoreConfig,
    DataSource, Section,
};
