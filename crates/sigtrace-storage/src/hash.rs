//! Deterministic call-log fingerprints using blake3.
//!
//! A fingerprint covers the call shape only: method identity, argument types
//! in position order, and return type. Receiver, parameter names and
//! provenance do not participate, so the first archived entry for a shape
//! wins.
//!
//! Every field is length-prefixed before hashing so that no two distinct
//! shapes can produce the same byte stream.

use sigtrace_core::CallObservation;

fn update_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Computes the blake3 fingerprint of a call's shape.
pub fn hash_call_shape(call: &CallObservation) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    update_field(&mut hasher, &call.method.owner);
    update_field(&mut hasher, &call.method.name);
    hasher.update(&(call.arity() as u64).to_le_bytes());
    for ty in call.arg_types() {
        update_field(&mut hasher, ty);
    }
    update_field(&mut hasher, &call.return_type);
    hasher.finalize()
}

/// Hex form of [`hash_call_shape`], as stored in the call log.
pub fn call_fingerprint(call: &CallObservation) -> String {
    hash_call_shape(call).to_hex().to_string()
}
