//! Durable storage for learned method signatures.
//!
//! Provides the [`SignatureStore`] trait defining the storage contract that
//! all backends implement, plus the [`InMemoryStore`] and [`SqliteStore`] as
//! first-class backends, and [`CachedSignatureStore`], the read-through /
//! write-through cache the ingestion pipeline talks to.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`traits`]: SignatureStore trait definition
//! - [`hash`]: call-log fingerprints
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema migrations and connection setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`cache`]: CachedSignatureStore
//! - [`stat`]: per-gem stat file export and import

pub mod cache;
pub mod error;
pub mod hash;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod stat;
pub mod traits;

// Re-export key types for ergonomic use.
pub use cache::CachedSignatureStore;
pub use error::StorageError;
pub use hash::call_fingerprint;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use stat::{ImportReport, StatFile};
pub use traits::{AtomicWork, SignatureStore};
