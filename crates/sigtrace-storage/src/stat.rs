//! Per-gem stat files.
//!
//! A [`StatFile`] holds the contracts learned from the calls of one gem
//! version. Exporting one lets a different database start from those
//! contracts; importing merges them into whatever that database already
//! knows.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sigtrace_core::{Contract, GemInfo, MethodIdentity, SignatureInfo};

use crate::error::StorageError;
use crate::traits::SignatureStore;

/// Contracts learned from one gem version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFile {
    pub gem: GemInfo,
    /// Sorted by method identity.
    pub signatures: Vec<SignatureInfo>,
}

impl StatFile {
    /// Conventional file name, `<gem>-<version>.json`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.gem.name, self.gem.version)
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Outcome of [`import_stat_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Signatures written, merged or new
    pub imported: usize,
    /// Signatures skipped because their contract failed validation
    pub rejected: usize,
}

/// Orders dotted version strings segment by segment, numerically where both
/// segments are numbers.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Picks the available version closest to `requested`: an exact match, else
/// the newest older version, else the oldest newer one.
pub fn closest_version<'a>(requested: &str, available: &'a [String]) -> Option<&'a str> {
    let older = available
        .iter()
        .filter(|v| compare_versions(v, requested) != Ordering::Greater)
        .max_by(|a, b| compare_versions(a, b));
    let newer = available
        .iter()
        .filter(|v| compare_versions(v, requested) == Ordering::Greater)
        .min_by(|a, b| compare_versions(a, b));
    older.or(newer).map(String::as_str)
}

/// Newest of `available`.
pub fn latest_version(available: &[String]) -> Option<&str> {
    available
        .iter()
        .max_by(|a, b| compare_versions(a, b))
        .map(String::as_str)
}

/// Builds the stat file for `gem` from its archived calls.
///
/// Returns `None` when the call log holds no calls from that gem version.
pub fn export_stat_file<S: SignatureStore + ?Sized>(
    store: &S,
    gem: &GemInfo,
) -> Result<Option<StatFile>, StorageError> {
    let calls = store.calls_for_gem(gem)?;
    if calls.is_empty() {
        return Ok(None);
    }

    let mut contracts: BTreeMap<MethodIdentity, Contract> = BTreeMap::new();
    for call in &calls {
        if call.is_synthetic() {
            continue;
        }
        contracts
            .entry(call.method.clone())
            .or_default()
            .merge_observation(call);
    }

    let signatures = contracts
        .into_iter()
        .map(|(method, contract)| SignatureInfo::new(method, contract))
        .collect();
    Ok(Some(StatFile {
        gem: gem.clone(),
        signatures,
    }))
}

/// Merges every valid signature of `stat` into `store` in one atomic unit.
pub fn import_stat_file<S: SignatureStore + ?Sized>(
    store: &mut S,
    stat: &StatFile,
) -> Result<ImportReport, StorageError> {
    let mut report = ImportReport::default();
    store.run_atomically(&mut |txn| {
        report = ImportReport::default();
        for incoming in &stat.signatures {
            if !incoming.contract.is_valid() {
                report.rejected += 1;
                continue;
            }
            let merged = match txn.get_signature(&incoming.method)? {
                Some(mut existing) => {
                    existing.merge(incoming)?;
                    existing
                }
                None => incoming.clone(),
            };
            txn.put_signature(&merged)?;
            report.imported += 1;
        }
        Ok(())
    })?;
    Ok(report)
}
