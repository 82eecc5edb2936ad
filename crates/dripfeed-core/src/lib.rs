//! # Dripfeed Core
//!
//! Shared foundation for the dripfeed dispatcher: error taxonomy, deployment
//! configuration, tenant records, and the tenant configuration store.
//!
//! The dispatch engine (`dripfeed-dispatch`) depends on this crate through
//! the [`ConfigSource`] seam only. It never touches the store file directly,
//! and it re-reads the tenant record on every cycle so configuration edits
//! land without a restart.

pub mod config;
pub mod error;
pub mod store;
pub mod tenant;

pub use config::{DispatchConfig, DripfeedConfig, MirrorTarget, SinkConfig, TransportConfig};
pub use error::{DripfeedError, Result};
pub use store::{ConfigSource, FileStore, MemStore};
pub use tenant::{Target, TenantConfig};
