//! Error taxonomy shared across the dripfeed crates.

use thiserror::Error;

/// Convenience alias used throughout dripfeed.
pub type Result<T> = std::result::Result<T, DripfeedError>;

/// All dripfeed errors.
///
/// The supervisor rejections (`AlreadyRunning`, `NotRunning`,
/// `NotConfigured`) are user-visible: their display strings go back to
/// whoever drives the control surface. Per-delivery failures are not errors
/// at all; they are classified outcomes and never leave the dispatch loop
/// as `Err`.
#[derive(Error, Debug)]
pub enum DripfeedError {
    /// A recurring job already exists for this tenant.
    #[error("tenant '{0}' already has a running job")]
    AlreadyRunning(String),

    /// No recurring job exists for this tenant.
    #[error("tenant '{0}' has no running job")]
    NotRunning(String),

    /// The tenant's stored record cannot back a running job.
    #[error("tenant '{tenant}' is not configured: {reason}")]
    NotConfigured { tenant: String, reason: String },

    /// Deployment configuration problems (unreadable file, bad TOML,
    /// malformed endpoint template).
    #[error("config error: {0}")]
    Config(String),

    /// Tenant store I/O or validation problems.
    #[error("store error: {0}")]
    Store(String),

    /// HTTP failure outside the delivery path (sink posting).
    #[error("transport error: {0}")]
    Transport(String),

    /// Filesystem errors surfaced while managing local state.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DripfeedError {
    /// Shorthand for [`DripfeedError::NotConfigured`].
    pub fn not_configured(tenant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            tenant: tenant.into(),
            reason: reason.into(),
        }
    }
}
