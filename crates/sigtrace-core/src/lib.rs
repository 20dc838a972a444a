//! Core data model for learned method signatures.
//!
//! # Modules
//!
//! - [`id`]: `MethodIdentity`, the key of every contract store
//! - [`observation`]: `CallObservation` and its argument/provenance parts
//! - [`contract`]: the `Contract` accept/merge/validate engine
//! - [`signature`]: `SignatureInfo`, the unit of durable storage
//! - [`decode`]: JSON-line wire record decoder
//! - [`error`]: `CoreError`

pub mod contract;
pub mod decode;
pub mod error;
pub mod id;
pub mod observation;
pub mod signature;

// Re-export commonly used types
pub use contract::{Contract, ShapeBucket};
pub use decode::decode_record;
pub use error::CoreError;
pub use id::MethodIdentity;
pub use observation::{ArgumentInfo, CallObservation, CallSite, GemInfo, ParamKind};
pub use signature::SignatureInfo;
