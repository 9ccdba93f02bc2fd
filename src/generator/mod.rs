use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::contracts::{LockResultExt, PrimeError};
use crate::log::ActivityLog;
use crate::sequence::PrimeSequence;

/// Background task that discovers primes indefinitely, starting at 2.
///
/// The generator is the only writer of the [`PrimeSequence`]. Each step
/// tests the cursor by trial division against the primes found so far,
/// publishes on success, and optionally sleeps `delay` before the next
/// candidate. `stop` pauses after the in-flight step; a later `start`
/// resumes at the stored cursor with no loss or duplication.
pub struct PrimeGenerator {
    sequence: Arc<PrimeSequence>,
    log: Arc<ActivityLog>,
    running: Arc<AtomicBool>,
    /// Wakes the worker out of its delay sleep on stop
    stop_notify: Arc<Notify>,
    /// Handle to the background task
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl PrimeGenerator {
    pub fn new(sequence: Arc<PrimeSequence>, log: Arc<ActivityLog>) -> Self {
        Self {
            sequence,
            log,
            running: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            task_handle: RwLock::new(None),
        }
    }

    /// Begins or resumes background generation. Returns immediately; a
    /// no-op when the worker is already running.
    pub fn start(&self, delay: Duration) -> Result<(), PrimeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sequence = Arc::clone(&self.sequence);
        let log = Arc::clone(&self.log);
        let running = Arc::clone(&self.running);
        let stop_notify = Arc::clone(&self.stop_notify);

        let handle = tokio::spawn(async move {
            tracing::info!("prime generator started");

            while running.load(Ordering::SeqCst) {
                let step = sequence.test_candidate().and_then(|(candidate, is_prime)| {
                    if is_prime {
                        sequence.record_prime(candidate)?;
                        log.append(format!("found prime: {}", candidate))?;
                        tracing::debug!(prime = candidate, "published prime");
                    } else {
                        sequence.record_composite(candidate)?;
                    }
                    Ok(())
                });

                if let Err(e) = step {
                    tracing::error!(error = %e, "generator step failed");
                    running.store(false, Ordering::SeqCst);
                    break;
                }

                if delay.is_zero() {
                    // stay cooperative so a zero-delay worker cannot
                    // monopolize its runtime thread
                    tokio::task::yield_now().await;
                } else {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = stop_notify.notified() => {},
                    }
                }
            }

            tracing::info!("prime generator paused");
        });

        let mut task_handle = self.task_handle.write().map_lock_err()?;
        *task_handle = Some(handle);

        Ok(())
    }

    /// Signals the worker to pause after its current step and waits for it.
    /// The sequence and cursor are kept for a later resume.
    pub async fn stop(&self) -> Result<(), PrimeError> {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_one();

        let handle = {
            let mut task_handle = self.task_handle.write().map_lock_err()?;
            task_handle.take()
        };

        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| PrimeError::TaskJoin(e.to_string()))?;
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The generator's own activity log (one entry per published prime).
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_generator() -> (Arc<PrimeSequence>, PrimeGenerator) {
        let sequence = Arc::new(PrimeSequence::new());
        let log = Arc::new(ActivityLog::new());
        let generator = PrimeGenerator::new(Arc::clone(&sequence), log);
        (sequence, generator)
    }

    async fn wait_until_len(sequence: &PrimeSequence, n: usize) {
        sequence
            .wait_for(|primes| (primes.len() >= n).then_some(()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn generates_primes_in_order() {
        let (sequence, generator) = new_generator();
        generator.start(Duration::ZERO).unwrap();

        wait_until_len(&sequence, 10).await;
        generator.stop().await.unwrap();

        let primes = sequence.snapshot().unwrap();
        assert_eq!(&primes[..10], &[2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[tokio::test]
    async fn start_is_noop_when_running() {
        let (sequence, generator) = new_generator();
        generator.start(Duration::ZERO).unwrap();
        generator.start(Duration::ZERO).unwrap();

        wait_until_len(&sequence, 5).await;
        generator.stop().await.unwrap();

        // a second worker would have raced the cursor and corrupted order
        let primes = sequence.snapshot().unwrap();
        for window in primes.windows(2) {
            assert!(window[0] < window[1], "sequence out of order");
        }
    }

    #[tokio::test]
    async fn resume_continues_at_cursor() {
        let (sequence, generator) = new_generator();
        generator.start(Duration::ZERO).unwrap();
        wait_until_len(&sequence, 8).await;
        generator.stop().await.unwrap();
        assert!(!generator.is_running());

        let before = sequence.snapshot().unwrap();
        let cursor = sequence.cursor().unwrap();

        generator.start(Duration::ZERO).unwrap();
        wait_until_len(&sequence, before.len() + 8).await;
        generator.stop().await.unwrap();

        let after = sequence.snapshot().unwrap();
        // prefix preserved: nothing re-emitted, nothing skipped
        assert_eq!(&after[..before.len()], &before[..]);
        assert!(after[before.len()] > cursor - 1);
        for window in after.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[tokio::test]
    async fn stop_interrupts_delay_sleep() {
        let (sequence, generator) = new_generator();
        generator.start(Duration::from_secs(60)).unwrap();

        // first step runs before the first sleep
        wait_until_len(&sequence, 1).await;

        let stopped = tokio::time::timeout(Duration::from_secs(5), generator.stop()).await;
        assert!(stopped.is_ok(), "stop should not wait out the delay");
    }

    #[tokio::test]
    async fn logs_each_published_prime() {
        let (sequence, generator) = new_generator();
        generator.start(Duration::ZERO).unwrap();
        wait_until_len(&sequence, 3).await;
        generator.stop().await.unwrap();

        let entries = generator.log().entries().unwrap();
        assert_eq!(entries[0], "found prime: 2");
        assert_eq!(entries[1], "found prime: 3");
        assert_eq!(entries[2], "found prime: 5");
    }
}
