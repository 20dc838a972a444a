//! Not-yet-durable contracts and call-log entries.
//!
//! [`Staging`] is owned by the merge loop and never shared; it is only ever
//! drained by [`crate::flush::flush`].

use indexmap::IndexMap;

use sigtrace_core::{CallObservation, Contract, MethodIdentity};

/// Newly learned contracts plus the calls waiting to be archived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Staging {
    /// Contracts in first-learned order
    contracts: IndexMap<MethodIdentity, Contract>,
    pending_calls: Vec<CallObservation>,
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// The staged contract for `method`, if any.
    pub fn contract(&self, method: &MethodIdentity) -> Option<&Contract> {
        self.contracts.get(method)
    }

    /// Iterates staged contracts in first-learned order.
    pub fn contracts(&self) -> impl Iterator<Item = (&MethodIdentity, &Contract)> {
        self.contracts.iter()
    }

    pub fn pending_calls(&self) -> &[CallObservation] {
        &self.pending_calls
    }

    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    pub fn pending_call_count(&self) -> usize {
        self.pending_calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty() && self.pending_calls.is_empty()
    }

    /// Folds `obs` into the staged contract for its method, creating one if
    /// needed. Returns true if the contract changed.
    pub fn learn(&mut self, obs: &CallObservation) -> bool {
        self.contracts
            .entry(obs.method.clone())
            .or_default()
            .merge_observation(obs)
    }

    /// Replaces the staged contract for `method`.
    pub fn stage_contract(&mut self, method: MethodIdentity, contract: Contract) {
        self.contracts.insert(method, contract);
    }

    /// Queues `obs` for the durable call log.
    pub fn archive(&mut self, obs: CallObservation) {
        self.pending_calls.push(obs);
    }

    pub fn clear(&mut self) {
        self.contracts.clear();
        self.pending_calls.clear();
    }
}
