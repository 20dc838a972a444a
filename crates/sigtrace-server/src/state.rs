//! Server state shared between the merge loop and the query surface.
//!
//! The durable store sits behind a `std::sync::Mutex`: the merge loop runs
//! on a blocking thread and the backends hold a `rusqlite::Connection`,
//! which is `Send` but not `Sync`.

use std::sync::{Mutex, MutexGuard};

use sigtrace_storage::{CachedSignatureStore, SignatureStore};

use crate::error::ServerError;
use crate::status::PipelineStatus;

pub struct ServerState<S> {
    store: Mutex<CachedSignatureStore<S>>,
    pub status: PipelineStatus,
}

impl<S: SignatureStore> ServerState<S> {
    /// Wraps `store` in a read-through cache.
    pub fn new(store: S) -> Self {
        ServerState {
            store: Mutex::new(CachedSignatureStore::new(store)),
            status: PipelineStatus::new(),
        }
    }

    /// Locks the durable store. A poisoned lock is fatal for the current
    /// pipeline generation.
    pub fn lock_store(&self) -> Result<MutexGuard<'_, CachedSignatureStore<S>>, ServerError> {
        self.store.lock().map_err(|_| ServerError::LockPoisoned)
    }

    /// Clears a poisoned store lock before a new pipeline generation starts.
    /// Backend transactions roll back on unwind and the cache only takes
    /// committed writes, so the store itself is still consistent.
    pub fn clear_poison(&self) {
        self.store.clear_poison();
    }
}
