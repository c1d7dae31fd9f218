//! Shared polling of backend endpoints.
//!
//! Many independent consumers often want the same periodically refreshed
//! resource. The [`Poller`] keeps one timer per distinct endpoint no matter
//! how many parties subscribe to it, allows at most one request per endpoint
//! in flight, and hands every result to all current subscribers.
//!
//! Lifecycle of an endpoint:
//! - the first [`Poller::subscribe`] creates its entry, fetches immediately
//!   and starts the repeating timer;
//! - dropping (or [`Subscription::unsubscribe`]-ing) the last handle cancels
//!   the timer and forgets the cached payload;
//! - [`Poller::stop_all`] tears everything down at shutdown.
//!
//! Failed polls are reported to subscribers and not retried out of band; the
//! next tick is the retry.

mod registry;
mod service;

pub use registry::{Callback, EndpointStatus, PollResult, SubscriberId};
pub use service::{
    Poller, PollerConfig, Subscription, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
