//! Scripted in-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{ApiEnvelope, Fetch, FetchError, RequestOptions};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// `{ success: true, data }`
    Data(Value),
    /// `{ success: false, message }`
    Rejected(String),
    /// Transport-level failure.
    ServerError(String),
    /// Never answers.
    Hang,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Reply>>,
    standing: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    calls: Vec<(String, RequestOptions)>,
}

/// Answers from per-endpoint scripts and records every call.
///
/// One-shot replies queued with [`then`](Self::then) are used first; after
/// that the standing reply set with [`always`](Self::always) repeats.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    script: Mutex<Script>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn always(&self, endpoint: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .standing
            .insert(endpoint.to_string(), reply);
    }

    pub(crate) fn then(&self, endpoint: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn delay(&self, endpoint: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(endpoint.to_string(), delay);
    }

    pub(crate) fn calls(&self, endpoint: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(called, _)| called == endpoint)
            .count()
    }

    pub(crate) fn last_options(&self, endpoint: &str) -> Option<RequestOptions> {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .rev()
            .find(|(called, _)| called == endpoint)
            .map(|(_, options)| options.clone())
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn get(&self, endpoint: &str, options: &RequestOptions) -> Result<ApiEnvelope, FetchError> {
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push((endpoint.to_string(), options.clone()));
            let queued = script
                .queued
                .get_mut(endpoint)
                .and_then(|replies| replies.pop_front());
            let reply = queued.or_else(|| script.standing.get(endpoint).cloned());
            (reply, script.delays.get(endpoint).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Data(data)) => Ok(ApiEnvelope::ok(data)),
            Some(Reply::Rejected(message)) => Ok(ApiEnvelope::failure(message)),
            Some(Reply::ServerError(message)) => Err(FetchError::ServerError(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(FetchError::NotFound(endpoint.to_string())),
        }
    }
}
