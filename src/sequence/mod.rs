use std::sync::RwLock;

use tokio::sync::Notify;

use crate::contracts::{LockResultExt, PrimeError};

/// Primes found so far plus the next candidate to test.
///
/// Both live under one lock so readers always observe the invariant:
/// `primes` holds exactly the primes in `[2, cursor)`, in ascending order,
/// with no gaps.
#[derive(Debug)]
struct SequenceState {
    primes: Vec<u64>,
    cursor: u64,
}

/// The append-only record of discovered primes.
///
/// The generator is the single writer; any number of oracle callers read
/// concurrently. Every successful append signals `published` so blocked
/// callers re-evaluate their predicate instead of polling.
#[derive(Debug)]
pub struct PrimeSequence {
    state: RwLock<SequenceState>,
    published: Notify,
}

impl PrimeSequence {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SequenceState {
                primes: Vec::new(),
                cursor: 2,
            }),
            published: Notify::new(),
        }
    }

    /// Returns a copy of all primes found so far. Never blocks; the result
    /// can be stale the instant it returns.
    pub fn snapshot(&self) -> Result<Vec<u64>, PrimeError> {
        Ok(self.state.read().map_lock_err()?.primes.clone())
    }

    /// Returns the prime at the given rank (0-based) if it has been found.
    pub fn nth(&self, rank: usize) -> Result<Option<u64>, PrimeError> {
        Ok(self.state.read().map_lock_err()?.primes.get(rank).copied())
    }

    /// Number of primes found so far.
    pub fn len(&self) -> Result<usize, PrimeError> {
        Ok(self.state.read().map_lock_err()?.primes.len())
    }

    pub fn is_empty(&self) -> Result<bool, PrimeError> {
        Ok(self.state.read().map_lock_err()?.primes.is_empty())
    }

    /// The next candidate the generator will test.
    pub fn cursor(&self) -> Result<u64, PrimeError> {
        Ok(self.state.read().map_lock_err()?.cursor)
    }

    /// Tests the current candidate by trial division against the known
    /// primes up to its square root. Correct by the sequence invariant:
    /// every prime below the cursor is already present.
    pub(crate) fn test_candidate(&self) -> Result<(u64, bool), PrimeError> {
        let state = self.state.read().map_lock_err()?;
        let candidate = state.cursor;
        let is_prime = state
            .primes
            .iter()
            .take_while(|&&p| p.saturating_mul(p) <= candidate)
            .all(|&p| candidate % p != 0);
        Ok((candidate, is_prime))
    }

    /// Appends the current candidate as a prime, advances the cursor, and
    /// wakes every blocked caller. Single writer: the generator task.
    pub(crate) fn record_prime(&self, candidate: u64) -> Result<(), PrimeError> {
        {
            let mut state = self.state.write().map_lock_err()?;
            debug_assert_eq!(state.cursor, candidate);
            debug_assert!(state.primes.last().is_none_or(|&last| last < candidate));
            state.primes.push(candidate);
            state.cursor = candidate + 1;
        }
        self.published.notify_waiters();
        Ok(())
    }

    /// Advances the cursor past a composite candidate. No wakeup: blocking
    /// predicates only depend on the primes themselves.
    pub(crate) fn record_composite(&self, candidate: u64) -> Result<(), PrimeError> {
        let mut state = self.state.write().map_lock_err()?;
        debug_assert_eq!(state.cursor, candidate);
        state.cursor = candidate + 1;
        Ok(())
    }

    /// Blocks until `predicate` yields a value against the known primes.
    ///
    /// The wakeup is registered before the predicate runs, so a publication
    /// racing with the check cannot be missed. Re-evaluated after every
    /// append; no busy-waiting.
    pub async fn wait_for<T>(
        &self,
        mut predicate: impl FnMut(&[u64]) -> Option<T>,
    ) -> Result<T, PrimeError> {
        loop {
            let notified = self.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.read().map_lock_err()?;
                if let Some(value) = predicate(&state.primes) {
                    return Ok(value);
                }
            }

            notified.await;
        }
    }
}

impl Default for PrimeSequence {
    fn default() -> Self {
        Self::new()
    }
}
