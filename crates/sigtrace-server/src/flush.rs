//! Atomic transfer of [`Staging`] into the durable store.
//!
//! One flush is one [`CachedSignatureStore::run_atomically`] call:
//! - every staged contract that validates is merged into the committed
//!   contract for its method (or becomes it) and written back;
//! - a staged contract that fails validation is skipped and dropped;
//! - every pending call is archived unless an equivalent entry exists.
//!
//! Staging is cleared only after the transaction commits. On failure it is
//! left untouched so the next flush retries the same data; re-merging an
//! already committed contract is a no-op, so a retry never double counts.

use tracing::{debug, warn};

use sigtrace_core::SignatureInfo;
use sigtrace_storage::{CachedSignatureStore, SignatureStore, StorageError};

use crate::staging::Staging;

/// What a successful flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Contracts written to the durable store
    pub committed: usize,
    /// Staged contracts dropped because they failed validation
    pub rejected: usize,
    /// Calls newly added to the call log
    pub calls_archived: usize,
}

/// Drains `staging` into `durable` in a single transaction.
///
/// An empty staging area is a no-op that does not open a transaction.
pub fn flush<S: SignatureStore>(
    staging: &mut Staging,
    durable: &mut CachedSignatureStore<S>,
) -> Result<FlushReport, StorageError> {
    if staging.is_empty() {
        return Ok(FlushReport::default());
    }

    let mut report = FlushReport::default();
    durable.run_atomically(&mut |txn: &mut dyn SignatureStore| {
        report = FlushReport::default();

        for (method, staged) in staging.contracts() {
            if let Err(err) = staged.validate() {
                warn!(%method, error = %err, "staged contract failed validation, not storing");
                report.rejected += 1;
                continue;
            }
            let staged = SignatureInfo::new(method.clone(), staged.clone());
            let merged = match txn.get_signature(method)? {
                Some(mut stored) => {
                    stored.merge(&staged)?;
                    stored
                }
                None => staged,
            };
            if let Err(err) = merged.contract.validate() {
                warn!(%method, error = %err, "merged contract failed validation, not storing");
                report.rejected += 1;
                continue;
            }
            txn.put_signature(&merged)?;
            report.committed += 1;
        }

        for call in staging.pending_calls() {
            if txn.insert_call_if_not_contains(call)? {
                report.calls_archived += 1;
            }
        }
        Ok(())
    })?;

    debug!(
        committed = report.committed,
        rejected = report.rejected,
        calls_archived = report.calls_archived,
        "flushed staging"
    );
    staging.clear();
    Ok(report)
}
