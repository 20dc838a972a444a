//! [`SignatureInfo`]: a method identity paired with its contract.

use serde::{Deserialize, Serialize};

use crate::contract::Contract;
use crate::error::CoreError;
use crate::id::MethodIdentity;

/// The unit of durable storage reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub method: MethodIdentity,
    pub contract: Contract,
}

impl SignatureInfo {
    pub fn new(method: MethodIdentity, contract: Contract) -> Self {
        SignatureInfo { method, contract }
    }

    /// Unions `other`'s contract into this one.
    ///
    /// Fails without modifying `self` when the two signatures belong to
    /// different methods.
    pub fn merge(&mut self, other: &SignatureInfo) -> Result<bool, CoreError> {
        if self.method != other.method {
            return Err(CoreError::IdentityMismatch {
                expected: self.method.clone(),
                found: other.method.clone(),
            });
        }
        Ok(self.contract.merge_contract(&other.contract))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::CallObservation;

    #[test]
    fn test_merge_same_method() {
        let id = MethodIdentity::new("Foo", "bar");
        let a = CallObservation::positional(id.clone(), ["Integer"], "String");
        let b = CallObservation::positional(id.clone(), ["Float"], "String");
        let mut stored = SignatureInfo::new(id.clone(), Contract::from_observation(&a));
        let staged = SignatureInfo::new(id, Contract::from_observation(&b));

        assert!(stored.merge(&staged).unwrap());
        assert!(stored.contract.accept(&a));
        assert!(stored.contract.accept(&b));
    }

    #[test]
    fn test_merge_rejects_other_method() {
        let a = MethodIdentity::new("Foo", "bar");
        let b = MethodIdentity::new("Foo", "baz");
        let obs = CallObservation::positional(b.clone(), ["Integer"], "String");
        let mut stored = SignatureInfo::new(a, Contract::new());
        let err = stored
            .merge(&SignatureInfo::new(b, Contract::from_observation(&obs)))
            .unwrap_err();
        assert!(matches!(err, CoreError::IdentityMismatch { .. }));
        assert!(stored.contract.is_empty());
    }
}
