use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::content::ContentStore;

/// Handle to a running auto-refresh task.
pub struct AutoRefreshHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl AutoRefreshHandle {
    /// Signal the task to stop and wait for it. A load already running is
    /// allowed to finish first.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.cancel_tx.send(());
        self.join.await
    }
}

/// Refresh `store` now and then every `interval` until stopped.
///
/// Ticks use [`ContentStore::refresh`], so the cache decides whether a tick
/// reaches the network.
pub fn spawn_auto_refresh(store: Arc<ContentStore>, interval: Duration) -> AutoRefreshHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let period = interval.max(Duration::from_millis(1));

    let join = tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, "Auto refresh started");

        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.recv() => {
                    info!("Auto refresh stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = store.refresh().await;
                    match snapshot.error {
                        Some(error) => warn!(error = %error, retry_count = snapshot.retry_count, "Auto refresh failed"),
                        None => debug!(source = ?snapshot.source, "Auto refresh complete"),
                    }
                }
            }
        }
    });

    AutoRefreshHandle { cancel_tx, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentStoreConfig, DEFAULT_PRIMARY_ENDPOINT};
    use crate::testing::{Reply, ScriptedFetcher};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_loads_immediately_then_follows_cache() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.always(DEFAULT_PRIMARY_ENDPOINT, Reply::Data(json!({"teachers": []})));
        let store = Arc::new(ContentStore::new(fetcher.clone(), ContentStoreConfig::default()));

        let handle = spawn_auto_refresh(store.clone(), Duration::from_secs(60));

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fetcher.calls(DEFAULT_PRIMARY_ENDPOINT), 1);
        assert!(!store.snapshot().initial_load);

        // Ticks inside the five minute cache window stay off the network
        time::sleep(Duration::from_secs(4 * 60)).await;
        assert_eq!(fetcher.calls(DEFAULT_PRIMARY_ENDPOINT), 1);

        time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(fetcher.calls(DEFAULT_PRIMARY_ENDPOINT), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_refreshing() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.always(DEFAULT_PRIMARY_ENDPOINT, Reply::Data(json!({})));
        let store = Arc::new(ContentStore::new(fetcher.clone(), ContentStoreConfig::default()));

        let handle = spawn_auto_refresh(store.clone(), Duration::from_secs(1));
        time::sleep(Duration::from_secs(2)).await;
        handle.stop().await.unwrap();

        store.clear_cache();
        let calls = fetcher.calls(DEFAULT_PRIMARY_ENDPOINT);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fetcher.calls(DEFAULT_PRIMARY_ENDPOINT), calls);
        assert!(!store.snapshot().loading);
    }
}
