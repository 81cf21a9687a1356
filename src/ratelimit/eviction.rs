//! Background eviction of idle key state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::key::KeyMode;
use super::store::KeyStore;

/// A periodic task sweeping idle keys out of a set of stores.
///
/// The task stops when [`EvictionTask::stop`] is called or when the task
/// handle is dropped.
pub(crate) struct EvictionTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl EvictionTask {
    /// Spawn the sweeper on the current tokio runtime.
    ///
    /// The first sweep happens one `interval` after spawning.
    pub(crate) fn spawn(
        stores: Vec<(KeyMode, Arc<KeyStore>)>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                idle_timeout_ms = idle_timeout.as_millis() as u64,
                "Key eviction task started"
            );

            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now();
                        for (mode, store) in &stores {
                            let evicted = store.evict(idle_timeout, now);
                            if evicted > 0 {
                                debug!(
                                    mode = %mode,
                                    evicted = evicted,
                                    remaining = store.len(),
                                    "Evicted idle keys"
                                );
                            }
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }

            info!("Key eviction task stopped");
        });

        Self { stop, handle }
    }

    /// Signal the task to stop and wait for it to finish.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
