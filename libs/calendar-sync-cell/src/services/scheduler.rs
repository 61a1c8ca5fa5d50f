use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// A background job that runs on a fixed period until shut down.
pub struct PeriodicTask {
    name: &'static str,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Runs `job` every `period`, first one period after spawning. A tick that
    /// arrives while the previous run is still going is skipped.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Started periodic task '{}' every {:?}", name, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Running periodic task '{}'", name);
                        job().await;
                    }
                    _ = cancelled.changed() => break,
                }
            }

            info!("Stopped periodic task '{}'", name);
        });

        Self { name, cancel, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn shutdown(self) {
        let _ = self.cancel.send(true);
        let _ = self.handle.await;
    }
}
