//! The contract engine: learned structural summaries of method calls.
//!
//! A [`Contract`] groups every observed call shape of one method into
//! buckets keyed by arity. Each [`ShapeBucket`] holds, per argument
//! position, the union of argument types seen at that position, plus the
//! union of return types. Contracts only ever grow: merging is a pointwise
//! set union, so it is idempotent for shapes that are already represented.
//!
//! Type unions are [`IndexSet`]s so the rendered contract lists types in the
//! order they were first observed. Equality ignores that order.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::observation::CallObservation;

/// All observed calls of one arity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShapeBucket {
    /// One type union per argument position.
    args: Vec<IndexSet<String>>,
    /// Union of return types.
    returns: IndexSet<String>,
}

impl ShapeBucket {
    fn with_arity(arity: usize) -> Self {
        ShapeBucket {
            args: vec![IndexSet::new(); arity],
            returns: IndexSet::new(),
        }
    }

    /// Number of argument positions recorded in this bucket.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// The type union at argument position `index`.
    pub fn arg_union(&self, index: usize) -> Option<&IndexSet<String>> {
        self.args.get(index)
    }

    /// All argument-position unions in order.
    pub fn arg_unions(&self) -> &[IndexSet<String>] {
        &self.args
    }

    /// The union of return types.
    pub fn returns(&self) -> &IndexSet<String> {
        &self.returns
    }

    /// True when every argument type of `obs` is already in the union for
    /// its position.
    fn covers_args(&self, obs: &CallObservation) -> bool {
        self.args.len() == obs.arity()
            && self
                .args
                .iter()
                .zip(obs.arg_types())
                .all(|(union, ty)| union.contains(ty))
    }

    fn add_observation(&mut self, obs: &CallObservation) -> bool {
        let mut changed = false;
        for (union, ty) in self.args.iter_mut().zip(obs.arg_types()) {
            changed |= union.insert(ty.to_string());
        }
        changed |= self.returns.insert(obs.return_type.clone());
        changed
    }

    fn union_with(&mut self, other: &ShapeBucket) -> bool {
        let mut changed = false;
        if self.args.len() < other.args.len() {
            self.args.resize(other.args.len(), IndexSet::new());
            changed = true;
        }
        for (union, theirs) in self.args.iter_mut().zip(&other.args) {
            for ty in theirs {
                changed |= union.insert(ty.clone());
            }
        }
        for ty in &other.returns {
            changed |= self.returns.insert(ty.clone());
        }
        changed
    }
}

/// Learned summary of all observed call shapes of one method.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contract {
    buckets: BTreeMap<usize, ShapeBucket>,
}

impl Contract {
    /// Creates a contract that accepts nothing.
    pub fn new() -> Self {
        Contract::default()
    }

    /// Creates a contract learned from a single observation.
    pub fn from_observation(obs: &CallObservation) -> Self {
        let mut contract = Contract::new();
        contract.merge_observation(obs);
        contract
    }

    /// True when no call shape has been learned yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The bucket for `arity`, if any call of that arity was learned.
    pub fn bucket(&self, arity: usize) -> Option<&ShapeBucket> {
        self.buckets.get(&arity)
    }

    /// Arities with a learned bucket, ascending.
    pub fn arities(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.keys().copied()
    }

    /// Number of arity buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// True iff the call shape of `obs` is already subsumed: a bucket of the
    /// same arity exists whose per-position unions contain every argument
    /// type of `obs`. The return type is not consulted.
    pub fn accept(&self, obs: &CallObservation) -> bool {
        self.buckets
            .get(&obs.arity())
            .map_or(false, |bucket| bucket.covers_args(obs))
    }

    /// True iff merging `obs` would not change this contract: the call shape
    /// is accepted and the return type is already in the bucket's union.
    pub fn subsumes(&self, obs: &CallObservation) -> bool {
        self.buckets.get(&obs.arity()).map_or(false, |bucket| {
            bucket.covers_args(obs) && bucket.returns.contains(&obs.return_type)
        })
    }

    /// Folds `obs` into the bucket for its arity, creating the bucket if
    /// needed. Returns `true` if the contract changed.
    pub fn merge_observation(&mut self, obs: &CallObservation) -> bool {
        let arity = obs.arity();
        let created = !self.buckets.contains_key(&arity);
        let bucket = self
            .buckets
            .entry(arity)
            .or_insert_with(|| ShapeBucket::with_arity(arity));
        bucket.add_observation(obs) || created
    }

    /// Unions every bucket of `other` into the matching bucket of `self`.
    /// Returns `true` if the contract changed.
    ///
    /// Only meaningful for contracts of the same method; see
    /// [`SignatureInfo::merge`](crate::signature::SignatureInfo::merge).
    pub fn merge_contract(&mut self, other: &Contract) -> bool {
        let mut changed = false;
        for (&arity, theirs) in &other.buckets {
            match self.buckets.get_mut(&arity) {
                Some(ours) => changed |= ours.union_with(theirs),
                None => {
                    self.buckets.insert(arity, theirs.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Structural self-check: every bucket has as many argument unions as its
    /// arity key, and no bucket, position or return union is empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.buckets.is_empty() {
            return Err(CoreError::InvalidContract {
                reason: "contract has no call shapes".to_string(),
            });
        }
        for (&arity, bucket) in &self.buckets {
            if bucket.args.len() != arity {
                return Err(CoreError::InvalidContract {
                    reason: format!(
                        "bucket for arity {} records {} argument positions",
                        arity,
                        bucket.args.len()
                    ),
                });
            }
            if bucket.returns.is_empty() {
                return Err(CoreError::InvalidContract {
                    reason: format!("bucket for arity {} has no return types", arity),
                });
            }
            if let Some(pos) = bucket.args.iter().position(|u| u.is_empty()) {
                return Err(CoreError::InvalidContract {
                    reason: format!("bucket for arity {} has no types at position {}", arity, pos),
                });
            }
        }
        Ok(())
    }

    /// Boolean form of [`Contract::validate`].
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn write_union(f: &mut fmt::Formatter<'_>, union: &IndexSet<String>) -> fmt::Result {
    for (i, ty) in union.iter().enumerate() {
        if i > 0 {
            f.write_str(" | ")?;
        }
        f.write_str(ty)?;
    }
    Ok(())
}

/// Renders one line per bucket, e.g. `(Integer | String, Symbol) -> String`.
impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, bucket) in self.buckets.values().enumerate() {
            if line > 0 {
                f.write_str("\n")?;
            }
            f.write_str("(")?;
            for (i, union) in bucket.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_union(f, union)?;
            }
            f.write_str(") -> ")?;
            write_union(f, &bucket.returns)?;
        }
        Ok(())
    }
}
