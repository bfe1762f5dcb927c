//! Periodic background jobs with cooperative shutdown.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owns a set of periodic job loops that share one shutdown signal.
///
/// Each loop awaits its job to completion before waiting for the next tick,
/// so runs of a single job never overlap. Shutdown is only observed between
/// runs: a job that is already executing finishes before its loop exits.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Spawn `job` to run immediately and then every `period`.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_delayed(name, Duration::ZERO, period, job);
    }

    /// Spawn `job` with its first run after `delay`, then every `period`.
    pub fn spawn_delayed<F, Fut>(
        &mut self,
        name: &'static str,
        delay: Duration,
        period: Duration,
        mut job: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // tokio intervals panic on a zero period.
        let period = period.max(Duration::from_millis(1));
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            tracing::info!("job '{}' started (period={:?})", name, period);
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + delay, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        tracing::debug!("job '{}' tick", name);
                        job().await;
                    }
                }
            }
            tracing::info!("job '{}' stopped", name);
        });
        self.tasks.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every loop to stop and wait for in-flight runs to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(err) = handle.await {
                tracing::warn!("job '{}' ended abnormally: {}", name, err);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
