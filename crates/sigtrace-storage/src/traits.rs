//! The [`SignatureStore`] trait defining the durable storage contract.
//!
//! Two kinds of data live behind the trait:
//! - **Signatures**: one [`SignatureInfo`] per [`MethodIdentity`], replaced
//!   wholesale on every write.
//! - **Call log**: an append-only set of distinct [`CallObservation`]s, where
//!   two observations are the same entry when their
//!   [`call_fingerprint`](crate::hash::call_fingerprint)s match.
//!
//! Multi-write units go through [`SignatureStore::run_atomically`]: the work
//! closure receives a transactional view of the same trait and every write
//! made through it is committed together or not at all.

use sigtrace_core::{CallObservation, GemInfo, MethodIdentity, SignatureInfo};

use crate::error::StorageError;

/// A unit of work executed inside [`SignatureStore::run_atomically`].
pub type AtomicWork<'a> = dyn FnMut(&mut dyn SignatureStore) -> Result<(), StorageError> + 'a;

/// The storage contract for learned signatures and the call log.
///
/// The trait is synchronous; the ingestion pipeline calls it from a single
/// dedicated thread.
pub trait SignatureStore {
    /// Returns the stored signature for `method`, if any.
    fn get_signature(&self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError>;

    /// Inserts or replaces the signature for `info.method`.
    ///
    /// Contracts that fail [`Contract::validate`](sigtrace_core::Contract::validate)
    /// are rejected with [`StorageError::Contract`].
    fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError>;

    /// Lists every method of `owner` that has a stored signature, ordered by
    /// method name.
    fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError>;

    /// Appends `call` to the call log unless an equivalent entry exists.
    ///
    /// Returns `true` if a new entry was written.
    fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError>;

    /// Returns the logged calls of `method` in insertion order.
    fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError>;

    /// Lists the distinct versions of gem `name` that appear in the call log.
    fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError>;

    /// Returns the logged calls made from `gem`, in insertion order.
    fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError>;

    /// Runs `work` as one all-or-nothing transaction.
    ///
    /// If `work` returns an error, or the commit itself fails, none of the
    /// writes made through the view are kept and the error is returned.
    fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError>;
}
