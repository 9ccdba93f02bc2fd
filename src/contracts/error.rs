use std::sync::{MutexGuard, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrimeError {
    #[error("partition size must be at least 1")]
    InvalidPartitionSize,

    #[error("query value {value} out of range (minimum {min})")]
    QueryOutOfRange { value: u64, min: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Extension trait for converting lock errors to PrimeError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a PrimeError.
    fn map_lock_err(self) -> Result<T, PrimeError>;
}

impl<'a, T> LockResultExt<RwLockReadGuard<'a, T>>
    for Result<RwLockReadGuard<'a, T>, PoisonError<RwLockReadGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockReadGuard<'a, T>, PrimeError> {
        self.map_err(|e| PrimeError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<RwLockWriteGuard<'a, T>>
    for Result<RwLockWriteGuard<'a, T>, PoisonError<RwLockWriteGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<RwLockWriteGuard<'a, T>, PrimeError> {
        self.map_err(|e| PrimeError::LockPoisoned(e.to_string()))
    }
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, PrimeError> {
        self.map_err(|e| PrimeError::LockPoisoned(e.to_string()))
    }
}
