//! REST transport module for the school backend.
//!
//! This module provides the [`Fetch`] seam injected into the poller and the
//! content store, the `reqwest`-backed [`HttpFetcher`], and the shared
//! [`FetchError`] taxonomy.

pub mod client;
pub mod error;

pub use client::{ApiEnvelope, Fetch, HttpFetcher, RequestOptions, DEFAULT_API_BASE_URL};
pub use error::FetchError;
