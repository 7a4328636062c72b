use crate::errors::AuthError;
use crate::rate_limit::RateLimiter;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/// Periodically purges stale rate limiter entries so one-off callers do not
/// accumulate in memory.
pub struct SweepScheduler {
    limiter: Arc<RateLimiter>,
}

/// Owns the running sweep task. Dropping it without calling [`SweepHandle::stop`]
/// aborts the task.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepScheduler {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    #[instrument(skip(self))]
    pub fn run_sweep(&self) -> Result<usize, AuthError> {
        let removed = self.limiter.sweep()?;
        if removed > 0 {
            info!(removed, remaining = self.limiter.len(), "Swept stale rate limit entries");
        } else {
            debug!("Rate limit sweep found nothing to remove");
        }
        Ok(removed)
    }

    /// Starts the background sweep, ticking every `interval`. The first tick
    /// happens one full interval after start.
    pub fn start(self, interval: Duration) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut timer = time::interval_at(time::Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("Rate limit sweep started with interval: {:?}", interval);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.run_sweep() {
                            error!("Rate limit sweep failed: {:?}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Rate limit sweep stopped");
                        break;
                    }
                }
            }
        });

        SweepHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

impl SweepHandle {
    /// Signals the sweep to stop and waits for the task to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Rate limit sweep task ended abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_sweeps_and_stops() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(RateLimiter::with_limits(
            10,
            chrono::Duration::hours(1),
            clock.clone() as Arc<dyn Clock>,
        ));
        limiter.check_limit("+15551234567").unwrap();

        let handle = SweepScheduler::new(limiter.clone()).start(Duration::from_secs(3600));

        // Entry still fresh at the first tick.
        time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(limiter.len(), 1);

        clock.advance(chrono::Duration::hours(2));
        time::sleep(Duration::from_secs(3600)).await;
        assert!(limiter.is_empty());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_before_first_tick() {
        let limiter = Arc::new(RateLimiter::with_limits(
            10,
            chrono::Duration::hours(1),
            Arc::new(ManualClock::default()),
        ));
        let handle = SweepScheduler::new(limiter).start(Duration::from_secs(3600));
        handle.stop().await;
    }
}
