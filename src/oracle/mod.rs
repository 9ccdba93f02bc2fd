use std::sync::Arc;

use futures::future::join_all;

use crate::contracts::PrimeError;
use crate::sequence::PrimeSequence;

/// Query façade over the shared [`PrimeSequence`].
///
/// Any number of callers may query concurrently; a caller blocks
/// (cooperatively, on the generator's publish signal) exactly until its
/// answer is decidable, and an answer is only returned once it can no
/// longer be falsified by later publications.
pub struct PrimeOracle {
    sequence: Arc<PrimeSequence>,
    /// Max count of known-prime candidates tested as one unit of
    /// factorization work. Fixed for the oracle's lifetime.
    partition_size: usize,
}

impl PrimeOracle {
    pub fn new(sequence: Arc<PrimeSequence>, partition_size: usize) -> Result<Self, PrimeError> {
        if partition_size == 0 {
            return Err(PrimeError::InvalidPartitionSize);
        }
        Ok(Self {
            sequence,
            partition_size,
        })
    }

    /// Returns the smallest prime `p >= q`, or `q` itself if `q` is prime.
    ///
    /// The sequence holds exactly the primes below the cursor, so the
    /// answer is decidable precisely when a known prime `>= q` exists: any
    /// smaller qualifying prime would already be in the sequence. Blocks
    /// until that holds.
    pub async fn next_prime(&self, q: u64) -> Result<u64, PrimeError> {
        self.sequence
            .wait_for(|primes| {
                let idx = primes.partition_point(|&p| p < q);
                primes.get(idx).copied()
            })
            .await
    }

    /// Returns the ascending, possibly-repeated prime factors of `q`.
    ///
    /// Candidate primes are consumed in consecutive windows of
    /// `partition_size`. A window is evaluated once it is fully known, or
    /// as soon as a known prime inside it exceeds the square root of the
    /// remaining cofactor (at that point any remaining cofactor > 1 is
    /// itself prime). Blocks on windows not yet fully known.
    pub async fn prime_factors(&self, q: u64) -> Result<Vec<u64>, PrimeError> {
        if q < 2 {
            return Err(PrimeError::QueryOutOfRange { value: q, min: 2 });
        }

        let size = self.partition_size;
        let mut factors = Vec::new();
        let mut cofactor = q;
        let mut window_start = 0usize;

        while cofactor > 1 {
            let entry = cofactor;
            let window: Vec<u64> = self
                .sequence
                .wait_for(move |primes| {
                    let known = &primes[window_start.min(primes.len())..];
                    if known.len() >= size {
                        Some(known[..size].to_vec())
                    } else if known.iter().any(|&p| p.saturating_mul(p) > entry) {
                        // partial window already reaches past the square
                        // root of the cofactor: the search can terminate
                        Some(known.to_vec())
                    } else {
                        None
                    }
                })
                .await?;

            // Multiplicities against the window's entry cofactor are
            // independent per distinct prime, so probe them concurrently
            // and apply the divisions in ascending order afterwards.
            let probes = window.into_iter().map(|p| async move {
                let mut n = entry;
                let mut count = 0u32;
                while n % p == 0 {
                    n /= p;
                    count += 1;
                }
                (p, count)
            });

            for (p, count) in join_all(probes).await {
                for _ in 0..count {
                    factors.push(p);
                    cofactor /= p;
                }
                if cofactor == 1 {
                    break;
                }
                if p.saturating_mul(p) > cofactor {
                    // every prime below p has been divided out, so the
                    // remaining cofactor has no divisor but itself
                    factors.push(cofactor);
                    cofactor = 1;
                    break;
                }
            }

            window_start += size;
        }

        Ok(factors)
    }

    /// Snapshot copy of the primes found so far. Never blocks; intended
    /// for diagnostics only.
    pub fn known_primes(&self) -> Result<Vec<u64>, PrimeError> {
        self.sequence.snapshot()
    }

    pub fn partition_size(&self) -> usize {
        self.partition_size
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Sequence pre-filled with the primes below 50.
    fn seeded_sequence() -> Arc<PrimeSequence> {
        let sequence = Arc::new(PrimeSequence::new());
        let mut cursor = 2u64;
        for p in [
            2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47,
        ] {
            while cursor < p {
                sequence.record_composite(cursor).unwrap();
                cursor += 1;
            }
            sequence.record_prime(p).unwrap();
            cursor = p + 1;
        }
        sequence
    }

    #[test]
    fn rejects_zero_partition_size() {
        let sequence = Arc::new(PrimeSequence::new());
        assert!(matches!(
            PrimeOracle::new(sequence, 0),
            Err(PrimeError::InvalidPartitionSize)
        ));
    }

    #[tokio::test]
    async fn next_prime_answers_from_known_primes() {
        let oracle = PrimeOracle::new(seeded_sequence(), 4).unwrap();

        assert_eq!(oracle.next_prime(0).await.unwrap(), 2);
        assert_eq!(oracle.next_prime(2).await.unwrap(), 2);
        assert_eq!(oracle.next_prime(10).await.unwrap(), 11);
        assert_eq!(oracle.next_prime(11).await.unwrap(), 11);
        assert_eq!(oracle.next_prime(44).await.unwrap(), 47);
    }

    #[tokio::test]
    async fn next_prime_blocks_until_decidable() {
        let sequence = Arc::new(PrimeSequence::new());
        let oracle = PrimeOracle::new(Arc::clone(&sequence), 1).unwrap();

        let query = tokio::spawn(async move { oracle.next_prime(4).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!query.is_finished(), "4 is not yet decidable");

        sequence.record_prime(2).unwrap();
        sequence.record_prime(3).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!query.is_finished(), "no known prime >= 4 yet");

        sequence.record_composite(4).unwrap();
        sequence.record_prime(5).unwrap();
        assert_eq!(query.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn prime_factors_rejects_values_below_two() {
        let oracle = PrimeOracle::new(seeded_sequence(), 1).unwrap();
        for q in [0, 1] {
            assert!(matches!(
                oracle.prime_factors(q).await,
                Err(PrimeError::QueryOutOfRange { value, min: 2 }) if value == q
            ));
        }
    }

    #[tokio::test]
    async fn prime_factors_of_28_with_partition_one() {
        let oracle = PrimeOracle::new(seeded_sequence(), 1).unwrap();
        assert_eq!(oracle.prime_factors(28).await.unwrap(), vec![2, 2, 7]);
    }

    #[tokio::test]
    async fn prime_factors_terminates_early_on_large_cofactor() {
        // 2 * 1009: 1009 is far beyond the seeded primes, but the window
        // passes sqrt(1009) long before, so no blocking is needed
        let oracle = PrimeOracle::new(seeded_sequence(), 4).unwrap();
        assert_eq!(oracle.prime_factors(2018).await.unwrap(), vec![2, 1009]);
    }

    #[tokio::test]
    async fn prime_factors_handles_prime_powers_and_primes() {
        let oracle = PrimeOracle::new(seeded_sequence(), 3).unwrap();
        assert_eq!(oracle.prime_factors(2).await.unwrap(), vec![2]);
        assert_eq!(oracle.prime_factors(64).await.unwrap(), vec![2; 6]);
        assert_eq!(oracle.prime_factors(43).await.unwrap(), vec![43]);
        assert_eq!(
            oracle.prime_factors(2 * 3 * 3 * 31).await.unwrap(),
            vec![2, 3, 3, 31]
        );
    }

    #[tokio::test]
    async fn prime_factors_blocks_until_window_is_known() {
        let sequence = Arc::new(PrimeSequence::new());
        let oracle = PrimeOracle::new(Arc::clone(&sequence), 2).unwrap();

        // 35 = 5 * 7: needs the window [2, 3] and then [5, 7]
        let query = tokio::spawn(async move { oracle.prime_factors(35).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!query.is_finished());

        let mut cursor = 2u64;
        for p in [2u64, 3, 5, 7] {
            while cursor < p {
                sequence.record_composite(cursor).unwrap();
                cursor += 1;
            }
            sequence.record_prime(p).unwrap();
            cursor = p + 1;
        }

        assert_eq!(query.await.unwrap(), vec![5, 7]);
    }

    #[tokio::test]
    async fn known_primes_never_blocks() {
        let sequence = Arc::new(PrimeSequence::new());
        let oracle = PrimeOracle::new(Arc::clone(&sequence), 1).unwrap();
        assert!(oracle.known_primes().unwrap().is_empty());

        sequence.record_prime(2).unwrap();
        assert_eq!(oracle.known_primes().unwrap(), vec![2]);
    }
}
