//! Serialized access to the shared [`EntryStore`].
//!
//! One `LogService` is built per server and shared by `Arc` between the
//! acceptor and every session worker. All reads and writes of the store go
//! through its mutex. A session's command and the snapshot that answers it
//! happen under one guard, so no other session can append in between. The
//! mutex is never held while a reply is on the wire.

use std::time::Duration;

use tokio::{
    sync::{Mutex, MutexGuard},
    time::timeout,
};
use tracing::debug;

use crate::{
    command::Command,
    error::LogError,
    store::{Entry, EntryStore},
};

/// Default bound on how long an operation waits for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the log at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    pub entries: usize,
    pub bytes: usize,
    pub capacity: usize,
}

#[derive(Debug)]
pub struct LogService {
    store: Mutex<EntryStore>,
    lock_timeout: Duration,
}

impl LogService {
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            store: Mutex::new(EntryStore::new(capacity)),
            lock_timeout,
        }
    }

    /// Appends `bytes` as one entry, displacing the oldest entry if full.
    pub async fn apply_write(&self, bytes: &[u8]) -> Result<(), LogError> {
        // Copy outside the lock; only the slot swap happens under it.
        let entry = Entry::try_from_slice(bytes)?;
        let displaced = {
            let mut store = self.lock().await?;
            store.append(entry)
        };
        if let Some(displaced) = displaced {
            debug!(bytes = displaced.len(), "overwrote oldest log entry");
        }
        Ok(())
    }

    /// Global offset of byte `offset` in the `index`-th oldest entry.
    pub async fn apply_seek(&self, index: usize, offset: usize) -> Result<usize, LogError> {
        let store = self.lock().await?;
        Ok(store.index().resolve(index, offset)?)
    }

    /// Snapshot of the content from `global` through the end of the log.
    ///
    /// Empty when `global` is at or past the end.
    pub async fn read_from(&self, global: usize) -> Result<Vec<u8>, LogError> {
        let store = self.lock().await?;
        snapshot(&store, global)
    }

    /// Applies `command` and snapshots the log from the resulting cursor,
    /// both under the same guard.
    ///
    /// A seek moves `cursor` only once its reply has been taken, so a failed
    /// command leaves the cursor where it was.
    pub async fn apply_and_read(
        &self,
        command: Command<'_>,
        cursor: &mut usize,
    ) -> Result<Vec<u8>, LogError> {
        match command {
            Command::Write(bytes) => {
                let entry = Entry::try_from_slice(bytes)?;
                let (displaced, reply) = {
                    let mut store = self.lock().await?;
                    let displaced = store.append(entry);
                    (displaced, snapshot(&store, *cursor))
                };
                if let Some(displaced) = displaced {
                    debug!(bytes = displaced.len(), "overwrote oldest log entry");
                }
                reply
            }
            Command::Seek { index, offset } => {
                let store = self.lock().await?;
                let global = store.index().resolve(index, offset)?;
                let reply = snapshot(&store, global)?;
                *cursor = global;
                Ok(reply)
            }
        }
    }

    pub async fn stats(&self) -> Result<LogStats, LogError> {
        let store = self.lock().await?;
        Ok(LogStats {
            entries: store.entry_count(),
            bytes: store.total_bytes(),
            capacity: store.capacity(),
        })
    }

    async fn lock(&self) -> Result<MutexGuard<'_, EntryStore>, LogError> {
        timeout(self.lock_timeout, self.store.lock())
            .await
            .map_err(|_| LogError::LockTimeout {
                waited: self.lock_timeout,
            })
    }
}

fn snapshot(store: &EntryStore, global: usize) -> Result<Vec<u8>, LogError> {
    let requested = store.total_bytes().saturating_sub(global);
    let mut snapshot = Vec::new();
    snapshot
        .try_reserve_exact(requested)
        .map_err(|_| LogError::Allocation { requested })?;
    for chunk in store.index().tail(global) {
        snapshot.extend_from_slice(chunk);
    }
    Ok(snapshot)
}

impl Default for LogService {
    fn default() -> Self {
        Self::new(crate::store::DEFAULT_CAPACITY, DEFAULT_LOCK_TIMEOUT)
    }
}
