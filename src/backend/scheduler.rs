//! Fixed-interval periodic job scheduler: one task per registered job, each
//! with its own `tokio::time::interval`.
//!
//! `max_instances=1` falls out for free: a job's own task awaits the job
//! closure before taking its next tick, so a slow run simply delays the
//! next one rather than overlapping it. `MissedTickBehavior::Skip` collapses
//! several missed fires into a single catch-up tick instead of bursting.
//!
//! Job-level misfire grace: each invocation is bounded by `every - 1s`. A job
//! that runs longer than that is abandoned for this tick (the task keeps
//! running in the background until it finishes on its own) and logged as a
//! misfire rather than being allowed to block the next tick indefinitely.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

/// Register a recurring job. `every_secs` below 1 is clamped to 1 so a
/// misconfigured `every: 0s` can't spin the task loop.
pub fn spawn_periodic<F, Fut>(label: String, every_secs: u64, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let every_secs = every_secs.max(1);
    let misfire_grace = Duration::from_secs(every_secs.saturating_sub(1));
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(every_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            debug!("job {} firing", label);
            if timeout(misfire_grace, job()).await.is_err() {
                warn!(
                    "job {} misfired: did not complete within {}s",
                    label,
                    misfire_grace.as_secs()
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn job_runs_once_per_tick_and_never_overlaps() {
        let count = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let r = running.clone();
        let m = max_concurrent.clone();
        // every=2s gives a 1s misfire grace, comfortably above the 10ms job.
        let handle = spawn_periodic("test".to_string(), 2, move || {
            let c = c.clone();
            let r = r.clone();
            let m = m.clone();
            async move {
                let now_running = r.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now_running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::advance(Duration::from_millis(5000)).await;
        handle.abort();

        assert!(count.load(Ordering::SeqCst) >= 2);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn misfired_job_does_not_block_subsequent_ticks() {
        let fires = Arc::new(AtomicUsize::new(0));
        let f = fires.clone();
        // every=2s gives a 1s misfire grace; the job sleeps far past that,
        // so each tick should still fire on schedule instead of stalling.
        let handle = spawn_periodic("slow".to_string(), 2, move || {
            let f = f.clone();
            async move {
                f.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
        });

        tokio::time::advance(Duration::from_secs(7)).await;
        handle.abort();

        assert!(fires.load(Ordering::SeqCst) >= 3);
    }
}
