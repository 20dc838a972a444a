//! [`CachedSignatureStore`]: a read-through / write-through cache over any
//! [`SignatureStore`].
//!
//! Reads populate the cache from the backend on a miss; writes go to the
//! backend first and then to the cache. Writes made inside
//! [`CachedSignatureStore::run_atomically`] are collected in a pending
//! overlay and folded into the cache only after the backend commits, so a
//! rolled-back transaction never leaves uncommitted contracts visible.

use std::collections::HashMap;

use sigtrace_core::{CallObservation, GemInfo, MethodIdentity, SignatureInfo};

use crate::error::StorageError;
use crate::traits::{AtomicWork, SignatureStore};

/// Cache of committed signatures in front of a durable backend.
pub struct CachedSignatureStore<S> {
    inner: S,
    /// Committed signatures read from or written to `inner`
    cache: HashMap<MethodIdentity, SignatureInfo>,
}

impl<S: SignatureStore> CachedSignatureStore<S> {
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: S) -> Self {
        CachedSignatureStore {
            inner,
            cache: HashMap::new(),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached signatures.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn load(&mut self, method: &MethodIdentity) -> Result<Option<&SignatureInfo>, StorageError> {
        if !self.cache.contains_key(method) {
            match self.inner.get_signature(method)? {
                Some(info) => {
                    self.cache.insert(method.clone(), info);
                }
                None => return Ok(None),
            }
        }
        Ok(self.cache.get(method))
    }

    /// Returns a copy of the committed signature for `method`.
    pub fn get_signature(&mut self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError> {
        Ok(self.load(method)?.cloned())
    }

    /// True when the committed contract for the observed method already
    /// represents `obs` completely (see [`Contract::subsumes`]).
    ///
    /// [`Contract::subsumes`]: sigtrace_core::Contract::subsumes
    pub fn subsumes(&mut self, obs: &CallObservation) -> Result<bool, StorageError> {
        Ok(self
            .load(&obs.method)?
            .map_or(false, |info| info.contract.subsumes(obs)))
    }

    /// Writes `info` to the backend, then to the cache.
    pub fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError> {
        self.inner.put_signature(info)?;
        self.cache.insert(info.method.clone(), info.clone());
        Ok(())
    }

    pub fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError> {
        self.inner.registered_methods(owner)
    }

    pub fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError> {
        self.inner.insert_call_if_not_contains(call)
    }

    pub fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError> {
        self.inner.calls_for_method(method)
    }

    pub fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError> {
        self.inner.gem_versions(name)
    }

    pub fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
        self.inner.calls_for_gem(gem)
    }

    /// Runs `work` atomically against the backend.
    ///
    /// The cache is updated with the signatures written by `work` only if
    /// the backend transaction commits.
    pub fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError> {
        let mut pending: HashMap<MethodIdentity, SignatureInfo> = HashMap::new();
        let committed = &self.cache;
        self.inner
            .run_atomically(&mut |txn: &mut dyn SignatureStore| {
                // The backend may retry the closure; start each attempt clean.
                pending.clear();
                let mut view = CachedTransaction {
                    txn,
                    committed,
                    pending: &mut pending,
                };
                work(&mut view)
            })?;
        self.cache.extend(pending);
        Ok(())
    }
}

/// Transactional view handed to work inside
/// [`CachedSignatureStore::run_atomically`].
struct CachedTransaction<'t, 'p> {
    txn: &'t mut dyn SignatureStore,
    committed: &'p HashMap<MethodIdentity, SignatureInfo>,
    pending: &'p mut HashMap<MethodIdentity, SignatureInfo>,
}

impl SignatureStore for CachedTransaction<'_, '_> {
    fn get_signature(&self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError> {
        if let Some(info) = self.pending.get(method).or_else(|| self.committed.get(method)) {
            return Ok(Some(info.clone()));
        }
        self.txn.get_signature(method)
    }

    fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError> {
        self.txn.put_signature(info)?;
        self.pending.insert(info.method.clone(), info.clone());
        Ok(())
    }

    fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError> {
        self.txn.registered_methods(owner)
    }

    fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError> {
        self.txn.insert_call_if_not_contains(call)
    }

    fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError> {
        self.txn.calls_for_method(method)
    }

    fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError> {
        self.txn.gem_versions(name)
    }

    fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
        self.txn.calls_for_gem(gem)
    }

    fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError> {
        work(self)
    }
}
