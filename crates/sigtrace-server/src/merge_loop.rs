//! The single-threaded merge loop: decode, fast path, learn, flush.
//!
//! Each [`MergeLoop::poll_once`] call is one cycle:
//! 1. If staging or the pending call log exceeds the flush threshold, flush
//!    without dequeuing.
//! 2. Otherwise dequeue: blocking if the previous cycle flushed, non-blocking
//!    if not. An empty non-blocking dequeue also flushes.
//! 3. Decode the record, dropping malformed and synthetic ones.
//! 4. Fast path: the staged contract for the method (or, when nothing is
//!    staged for it, the committed one) already subsumes the observation;
//!    only the call is archived.
//! 5. Slow path: learn the observation into staging and archive the call.
//!
//! After a flush the processing flag is cleared if the queue is empty.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use sigtrace_core::{decode_record, CallObservation};
use sigtrace_storage::SignatureStore;

use crate::error::ServerError;
use crate::flush::{flush, FlushReport};
use crate::queue::QueueConsumer;
use crate::staging::Staging;
use crate::state::ServerState;

/// What one cycle of the merge loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Staging was flushed (possibly as a no-op).
    Flushed(FlushReport),
    /// The flush transaction failed; staging is kept for the next flush.
    FlushFailed,
    /// The observation extended a staged contract.
    Learned,
    /// The observation was already represented; only its call was archived.
    FastPath,
    /// The record was malformed or synthetic.
    Discarded,
    /// Every producer is gone and the queue is drained.
    Closed,
}

pub struct MergeLoop<S> {
    queue: QueueConsumer,
    staging: Staging,
    state: Arc<ServerState<S>>,
    flush_threshold: usize,
    previous_poll_ended_with_flush: bool,
}

impl<S: SignatureStore> MergeLoop<S> {
    pub fn new(queue: QueueConsumer, state: Arc<ServerState<S>>, flush_threshold: usize) -> Self {
        MergeLoop {
            queue,
            staging: Staging::new(),
            state,
            flush_threshold,
            previous_poll_ended_with_flush: false,
        }
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Runs cycles until the queue closes, flushing whatever is staged on
    /// the way out.
    pub fn run(mut self) -> Result<(), ServerError> {
        info!("merge loop started");
        while self.poll_once()? != PollOutcome::Closed {}
        if let PollOutcome::FlushFailed = self.flush_staging()? {
            warn!(
                contracts = self.staging.contract_count(),
                calls = self.staging.pending_call_count(),
                "merge loop stopped with unflushed staging"
            );
        }
        info!("merge loop stopped");
        Ok(())
    }

    /// Runs one cycle.
    pub fn poll_once(&mut self) -> Result<PollOutcome, ServerError> {
        if self.over_threshold() {
            return self.flush_staging();
        }

        let record = if self.previous_poll_ended_with_flush {
            match self.queue.take() {
                Some(record) => record,
                None => return Ok(PollOutcome::Closed),
            }
        } else {
            match self.queue.poll() {
                Some(record) => record,
                None => return self.flush_staging(),
            }
        };
        self.previous_poll_ended_with_flush = false;

        let started = Instant::now();
        let decoded = decode_record(&record);
        self.state.status.add_decode_time(started.elapsed());
        let obs = match decoded {
            Ok(obs) => obs,
            Err(err) => {
                warn!(error = %err, record = %record, "discarding malformed record");
                return Ok(PollOutcome::Discarded);
            }
        };
        if obs.is_synthetic() {
            return Ok(PollOutcome::Discarded);
        }

        let started = Instant::now();
        let outcome = self.absorb(obs);
        self.state.status.add_merge_time(started.elapsed());
        outcome
    }

    fn over_threshold(&self) -> bool {
        self.staging.pending_call_count() > self.flush_threshold
            || self.staging.contract_count() > self.flush_threshold
    }

    fn absorb(&mut self, obs: CallObservation) -> Result<PollOutcome, ServerError> {
        let known = match self.staging.contract(&obs.method) {
            Some(contract) => contract.subsumes(&obs),
            None => self.state.lock_store()?.subsumes(&obs)?,
        };
        let outcome = if known {
            PollOutcome::FastPath
        } else {
            self.staging.learn(&obs);
            PollOutcome::Learned
        };
        self.staging.archive(obs);
        Ok(outcome)
    }

    fn flush_staging(&mut self) -> Result<PollOutcome, ServerError> {
        let result = {
            let mut durable = self.state.lock_store()?;
            flush(&mut self.staging, &mut *durable)
        };
        self.previous_poll_ended_with_flush = true;
        if self.queue.is_empty() {
            self.state.status.set_processing(false);
        }
        match result {
            Ok(report) => Ok(PollOutcome::Flushed(report)),
            Err(err) => {
                error!(
                    error = %err,
                    contracts = self.staging.contract_count(),
                    calls = self.staging.pending_call_count(),
                    "flush failed, keeping staging for retry"
                );
                Ok(PollOutcome::FlushFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flush::tests::FailingStore;
    use crate::queue::{observation_queue, QueueProducer};
    use sigtrace_core::MethodIdentity;
    use sigtrace_storage::InMemoryStore;

    fn record(owner: &str, name: &str, args: &[&str], ret: &str) -> String {
        let args: Vec<serde_json::Value> = args
            .iter()
            .enumerate()
            .map(|(i, ty)| serde_json::json!({"name": format!("a{i}"), "kind": "req", "type": ty}))
            .collect();
        serde_json::json!({
            "receiver_name": owner,
            "method_name": name,
            "args": args,
            "return_type_name": ret,
        })
        .to_string()
    }

    fn setup<S: SignatureStore>(store: S, threshold: usize) -> (QueueProducer, MergeLoop<S>, Arc<ServerState<S>>) {
        let (producer, consumer) = observation_queue(64);
        let state = Arc::new(ServerState::new(store));
        let merge_loop = MergeLoop::new(consumer, Arc::clone(&state), threshold);
        (producer, merge_loop, state)
    }

    #[test]
    fn test_end_to_end_learning_and_flush() {
        let (producer, mut merge_loop, state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        producer.blocking_push(record("Foo", "m", &["String"], "String")).unwrap();

        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::FastPath);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert_eq!(merge_loop.staging().pending_call_count(), 3);

        let report = match merge_loop.poll_once().unwrap() {
            PollOutcome::Flushed(report) => report,
            other => panic!("expected flush, got {other:?}"),
        };
        assert_eq!(report.committed, 1);
        assert_eq!(report.calls_archived, 2);
        assert!(merge_loop.staging().is_empty());

        let method = MethodIdentity::new("Foo", "m");
        let mut store = state.lock_store().unwrap();
        let contract = store.get_signature(&method).unwrap().unwrap().contract;
        let bucket = contract.bucket(1).unwrap();
        assert_eq!(bucket.arg_union(0).unwrap().len(), 2);
        assert_eq!(bucket.returns().len(), 1);
        let int_call = sigtrace_core::CallObservation::positional(method.clone(), ["Integer"], "String");
        let bool_call = sigtrace_core::CallObservation::positional(method, ["TrueClass"], "String");
        assert!(contract.accept(&int_call));
        assert!(!contract.accept(&bool_call));
    }

    #[test]
    fn test_committed_contract_serves_fast_path() {
        let (producer, mut merge_loop, _state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert!(matches!(merge_loop.poll_once().unwrap(), PollOutcome::Flushed(_)));

        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::FastPath);
        assert_eq!(merge_loop.staging().contract_count(), 0);
        assert_eq!(merge_loop.staging().pending_call_count(), 1);
    }

    #[test]
    fn test_new_return_type_is_learned() {
        let (producer, mut merge_loop, _state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        producer.blocking_push(record("Foo", "m", &["Integer"], "Symbol")).unwrap();
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
    }

    #[test]
    fn test_malformed_and_synthetic_records_discarded() {
        let (producer, mut merge_loop, state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push("{not json".to_string()).unwrap();
        producer.blocking_push(record("#<Class:Foo>", "new", &[], "Foo")).unwrap();
        producer.blocking_push(record("Foo", "m", &[], "NilClass")).unwrap();

        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Discarded);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Discarded);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert!(matches!(merge_loop.poll_once().unwrap(), PollOutcome::Flushed(_)));

        let store = state.lock_store().unwrap();
        assert!(store.registered_methods("#<Class:Foo>").unwrap().is_empty());
        assert!(store
            .calls_for_method(&MethodIdentity::new("#<Class:Foo>", "new"))
            .unwrap()
            .is_empty());
        assert_eq!(store.inner().call_count(), 1);
    }

    #[test]
    fn test_threshold_forces_flush_before_dequeue() {
        let (producer, mut merge_loop, _state) = setup(InMemoryStore::new(), 2);
        for ty in ["Integer", "String", "Float", "Symbol"] {
            producer.blocking_push(record("Foo", "m", &[ty], "String")).unwrap();
        }
        for _ in 0..3 {
            assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        }
        assert!(matches!(merge_loop.poll_once().unwrap(), PollOutcome::Flushed(_)));
        assert_eq!(producer.len(), 1);
        // A flush is followed by a blocking take.
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
    }

    #[test]
    fn test_contract_count_alone_forces_flush() {
        let (producer, mut merge_loop, state) = setup(InMemoryStore::new(), 2);
        for name in ["a", "b", "c"] {
            let obs = sigtrace_core::CallObservation::positional(MethodIdentity::new("Foo", name), ["Integer"], "String");
            merge_loop
                .staging
                .stage_contract(obs.method.clone(), sigtrace_core::Contract::from_observation(&obs));
        }
        assert_eq!(merge_loop.staging().pending_call_count(), 0);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();

        let report = match merge_loop.poll_once().unwrap() {
            PollOutcome::Flushed(report) => report,
            other => panic!("expected flush, got {other:?}"),
        };
        assert_eq!(report.committed, 3);
        assert_eq!(report.calls_archived, 0);
        assert_eq!(producer.len(), 1);
        assert_eq!(state.lock_store().unwrap().inner().signature_count(), 3);
    }

    #[test]
    fn test_processing_flag_cleared_after_idle_flush() {
        let (producer, mut merge_loop, state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push(record("Foo", "m", &[], "NilClass")).unwrap();
        state.status.set_processing(true);

        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert!(state.status.is_processing());
        assert!(matches!(merge_loop.poll_once().unwrap(), PollOutcome::Flushed(_)));
        assert!(!state.status.is_processing());
    }

    #[test]
    fn test_failed_flush_keeps_staging_and_alternates() {
        let store = FailingStore {
            failures: 1,
            ..FailingStore::default()
        };
        let (producer, mut merge_loop, state) = setup(store, 128);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Learned);
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::FlushFailed);
        assert_eq!(merge_loop.staging().contract_count(), 1);

        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::FastPath);
        drop(producer);
        assert!(matches!(merge_loop.poll_once().unwrap(), PollOutcome::Flushed(_)));
        assert_eq!(merge_loop.poll_once().unwrap(), PollOutcome::Closed);

        let store = state.lock_store().unwrap();
        assert_eq!(store.inner().inner.signature_count(), 1);
        assert_eq!(store.inner().inner.call_count(), 1);
    }

    #[test]
    fn test_run_flushes_on_close() {
        let (producer, merge_loop, state) = setup(InMemoryStore::new(), 128);
        producer.blocking_push(record("Foo", "m", &["Integer"], "String")).unwrap();
        drop(producer);
        merge_loop.run().unwrap();
        assert_eq!(state.lock_store().unwrap().inner().signature_count(), 1);
    }
}
