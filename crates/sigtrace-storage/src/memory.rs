//! In-memory implementation of [`SignatureStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests and for ephemeral
//! servers that do not need persistence. It has the same semantics as the
//! SQLite backend, including all-or-nothing [`SignatureStore::run_atomically`].

use std::collections::{BTreeSet, HashMap, HashSet};

use sigtrace_core::{CallObservation, Contract, GemInfo, MethodIdentity, SignatureInfo};

use crate::error::StorageError;
use crate::hash::call_fingerprint;
use crate::traits::{AtomicWork, SignatureStore};

/// In-memory implementation of [`SignatureStore`].
///
/// Atomic work runs against a scratch copy of the store which replaces the
/// live data only when the work succeeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryStore {
    /// Contracts indexed by method identity
    signatures: HashMap<MethodIdentity, Contract>,
    /// Call log in insertion order
    calls: Vec<CallObservation>,
    /// Fingerprints of every logged call
    fingerprints: HashSet<String>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored signatures.
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Number of call-log entries.
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

impl SignatureStore for InMemoryStore {
    fn get_signature(&self, method: &MethodIdentity) -> Result<Option<SignatureInfo>, StorageError> {
        Ok(self
            .signatures
            .get(method)
            .map(|contract| SignatureInfo::new(method.clone(), contract.clone())))
    }

    fn put_signature(&mut self, info: &SignatureInfo) -> Result<(), StorageError> {
        info.contract.validate()?;
        self.signatures
            .insert(info.method.clone(), info.contract.clone());
        Ok(())
    }

    fn registered_methods(&self, owner: &str) -> Result<Vec<MethodIdentity>, StorageError> {
        let mut methods: Vec<MethodIdentity> = self
            .signatures
            .keys()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect();
        methods.sort();
        Ok(methods)
    }

    fn insert_call_if_not_contains(&mut self, call: &CallObservation) -> Result<bool, StorageError> {
        if !self.fingerprints.insert(call_fingerprint(call)) {
            return Ok(false);
        }
        self.calls.push(call.clone());
        Ok(true)
    }

    fn calls_for_method(&self, method: &MethodIdentity) -> Result<Vec<CallObservation>, StorageError> {
        Ok(self
            .calls
            .iter()
            .filter(|c| &c.method == method)
            .cloned()
            .collect())
    }

    fn gem_versions(&self, name: &str) -> Result<Vec<String>, StorageError> {
        let versions: BTreeSet<&str> = self
            .calls
            .iter()
            .filter_map(|c| c.gem.as_ref())
            .filter(|g| g.name == name)
            .map(|g| g.version.as_str())
            .collect();
        Ok(versions.into_iter().map(str::to_string).collect())
    }

    fn calls_for_gem(&self, gem: &GemInfo) -> Result<Vec<CallObservation>, StorageError> {
        Ok(self
            .calls
            .iter()
            .filter(|c| c.gem.as_ref() == Some(gem))
            .cloned()
            .collect())
    }

    fn run_atomically(&mut self, work: &mut AtomicWork<'_>) -> Result<(), StorageError> {
        let mut scratch = self.clone();
        work(&mut scratch)?;
        *self = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(owner: &str, name: &str, args: &[&str], ret: &str) -> CallObservation {
        CallObservation::positional(MethodIdentity::new(owner, name), args.iter().copied(), ret)
    }

    fn signature_of(obs: &CallObservation) -> SignatureInfo {
        SignatureInfo::new(obs.method.clone(), Contract::from_observation(obs))
    }

    #[test]
    fn test_put_and_get_signature() {
        let mut store = InMemoryStore::new();
        let obs = call("Foo", "bar", &["Integer"], "String");
        assert!(store.get_signature(&obs.method).unwrap().is_none());

        store.put_signature(&signature_of(&obs)).unwrap();
        let loaded = store.get_signature(&obs.method).unwrap().unwrap();
        assert!(loaded.contract.accept(&obs));
        assert_eq!(store.signature_count(), 1);
    }

    #[test]
    fn test_put_rejects_invalid_contract() {
        let mut store = InMemoryStore::new();
        let info = SignatureInfo::new(MethodIdentity::new("Foo", "bar"), Contract::new());
        assert!(matches!(store.put_signature(&info), Err(StorageError::Contract(_))));
        assert_eq!(store.signature_count(), 0);
    }

    #[test]
    fn test_registered_methods_by_owner() {
        let mut store = InMemoryStore::new();
        for (owner, name) in [("Foo", "zeta"), ("Foo", "alpha"), ("Bar", "alpha")] {
            store.put_signature(&signature_of(&call(owner, name, &[], "NilClass"))).unwrap();
        }
        let methods = store.registered_methods("Foo").unwrap();
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(store.registered_methods("Baz").unwrap().is_empty());
    }

    #[test]
    fn test_call_log_skips_duplicates() {
        let mut store = InMemoryStore::new();
        let obs = call("Foo", "bar", &["Integer"], "String");
        assert!(store.insert_call_if_not_contains(&obs).unwrap());
        assert!(!store.insert_call_if_not_contains(&obs).unwrap());
        assert!(store
            .insert_call_if_not_contains(&call("Foo", "bar", &["Float"], "String"))
            .unwrap());
        assert_eq!(store.calls_for_method(&obs.method).unwrap().len(), 2);
    }

    #[test]
    fn test_run_atomically_commits() {
        let mut store = InMemoryStore::new();
        let obs = call("Foo", "bar", &["Integer"], "String");
        store
            .run_atomically(&mut |txn| {
                txn.put_signature(&signature_of(&obs))?;
                txn.insert_call_if_not_contains(&obs)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.signature_count(), 1);
        assert_eq!(store.call_count(), 1);
    }

    #[test]
    fn test_run_atomically_rolls_back_on_error() {
        let mut store = InMemoryStore::new();
        let obs = call("Foo", "bar", &["Integer"], "String");
        let result = store.run_atomically(&mut |txn| {
            txn.put_signature(&signature_of(&obs))?;
            txn.insert_call_if_not_contains(&obs)?;
            Err(StorageError::TransactionAborted {
                reason: "test".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store, InMemoryStore::new());
    }

    #[test]
    fn test_calls_filtered_by_gem() {
        let mut store = InMemoryStore::new();
        let gem = |version: &str| GemInfo { name: "foo".into(), version: version.into() };
        let mut old = call("Foo", "bar", &["Integer"], "String");
        old.gem = Some(gem("0.9.0"));
        let mut new = call("Foo", "bar", &["Float"], "String");
        new.gem = Some(gem("1.0.0"));
        store.insert_call_if_not_contains(&new).unwrap();
        store.insert_call_if_not_contains(&old).unwrap();
        store.insert_call_if_not_contains(&call("Foo", "bar", &[], "nil")).unwrap();

        assert_eq!(store.gem_versions("foo").unwrap(), vec!["0.9.0", "1.0.0"]);
        assert_eq!(store.calls_for_gem(&gem("0.9.0")).unwrap(), vec![old]);
    }
}
