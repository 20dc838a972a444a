//! Method identity, the sole key into every contract store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix the runtime uses for compiler-generated singleton classes,
/// e.g. `#<Class:DidYouMean::Jaro>`.
pub const SYNTHETIC_PREFIX: &str = "#<";

/// An (owning type, method name) pair.
///
/// Two identities are equal iff both fields match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodIdentity {
    /// Fully qualified name of the type that owns the method.
    pub owner: String,
    /// Method name.
    pub name: String,
}

impl MethodIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        MethodIdentity {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// True when the owner is a synthetic/anonymous construct.
    pub fn is_synthetic(&self) -> bool {
        is_synthetic_type(&self.owner)
    }
}

/// True when a type descriptor denotes a synthetic/anonymous construct.
pub fn is_synthetic_type(type_name: &str) -> bool {
    type_name.starts_with(SYNTHETIC_PREFIX)
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.name)
    }
}
