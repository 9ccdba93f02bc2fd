use std::sync::RwLock;

use crate::contracts::{LockResultExt, PrimeError};

/// Append-only, thread-safe record of notable events.
///
/// Each subsystem (server, generator) owns its own instance; entries are
/// retained for the process lifetime and exposed read-only for diagnostics
/// and tests.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: RwLock<Vec<String>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one completed event. Entries keep creation order.
    pub fn append(&self, entry: impl Into<String>) -> Result<(), PrimeError> {
        let entry = entry.into();
        tracing::info!(entry = %entry, "activity");
        self.entries.write().map_lock_err()?.push(entry);
        Ok(())
    }

    /// Returns a copy of all entries in creation order.
    pub fn entries(&self) -> Result<Vec<String>, PrimeError> {
        Ok(self.entries.read().map_lock_err()?.clone())
    }

    pub fn len(&self) -> Result<usize, PrimeError> {
        Ok(self.entries.read().map_lock_err()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PrimeError> {
        Ok(self.entries.read().map_lock_err()?.is_empty())
    }
}
