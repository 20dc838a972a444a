//! Concurrent ingestion pipeline that learns method signature contracts from
//! runtime call observations streamed over TCP.
//!
//! Connections are accepted by [`acceptor`], read line by line by [`reader`]
//! and handed to a single [`merge_loop::MergeLoop`] through the bounded
//! [`queue`]. The merge loop learns into [`staging::Staging`] and periodically
//! [`flush`]es it into the durable store. [`server::SignatureServer`] ties the
//! pieces together and exposes the query surface.

pub mod acceptor;
pub mod config;
pub mod error;
pub mod flush;
pub mod merge_loop;
pub mod queue;
pub mod reader;
pub mod server;
pub mod staging;
pub mod state;
pub mod status;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::SignatureServer;
