//! Tenant records, the per-tenant unit of persisted configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One outbound destination for a tenant's recurring message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Opaque destination id; substituted into the delivery endpoint
    /// template.
    pub id: String,
    /// Message body delivered to this target each cycle.
    pub body: String,
}

impl Target {
    pub fn new(id: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            body: body.to_string(),
        }
    }
}

/// Persisted per-tenant configuration.
///
/// The dispatch loop holds a copy for at most one cycle: every iteration
/// re-reads the record from the store, so edits take effect on the next
/// cycle without restarting the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Opaque stable tenant identifier (the store's map key).
    pub tenant_id: String,
    /// Bearer credential attached verbatim as the `Authorization` header on
    /// every delivery.
    pub credential: String,
    /// Seconds between two fan-out cycles. Must be > 0 (store-enforced).
    pub interval_secs: u64,
    /// Ordered delivery targets, unique by id (last write wins).
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Optional tenant-owned report sink; receives a copy of every report.
    #[serde(default)]
    pub log_sink_url: Option<String>,
    /// Start this tenant automatically when the host boots.
    #[serde(default)]
    pub active: bool,
}

impl TenantConfig {
    /// Create a record with no targets yet.
    pub fn new(tenant_id: &str, credential: &str, interval_secs: u64) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            credential: credential.to_string(),
            interval_secs,
            targets: Vec::new(),
            log_sink_url: None,
            active: false,
        }
    }

    /// Append a target (builder-style).
    pub fn with_target(mut self, id: &str, body: &str) -> Self {
        self.targets.push(Target::new(id, body));
        self
    }

    /// Set the tenant-owned report sink (builder-style).
    pub fn with_log_sink(mut self, url: &str) -> Self {
        self.log_sink_url = Some(url.to_string());
        self
    }

    /// Sleep between two fan-out cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Drop duplicate target ids, keeping the last occurrence of each.
    pub fn dedup_targets(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept: Vec<Target> = Vec::with_capacity(self.targets.len());
        for target in self.targets.drain(..).rev() {
            if seen.insert(target.id.clone()) {
                kept.push(target);
            }
        }
        kept.reverse();
        self.targets = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_order() {
        let config = TenantConfig::new("acme", "tok-1", 60)
            .with_target("a", "one")
            .with_target("b", "two");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].id, "a");
        assert_eq!(config.targets[1].id, "b");
        assert_eq!(config.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_dedup_last_write_wins() {
        let mut config = TenantConfig::new("acme", "tok-1", 60)
            .with_target("a", "first")
            .with_target("b", "middle")
            .with_target("a", "second");
        config.dedup_targets();
        assert_eq!(config.targets.len(), 2);
        // The later "a" wins, in its later position.
        assert_eq!(config.targets[0].id, "b");
        assert_eq!(config.targets[1].id, "a");
        assert_eq!(config.targets[1].body, "second");
    }

    #[test]
    fn test_serde_defaults() {
        let config: TenantConfig = serde_json::from_str(
            r#"{"tenant_id": "t1", "credential": "c", "interval_secs": 30}"#,
        )
        .unwrap();
        assert!(config.targets.is_empty());
        assert!(config.log_sink_url.is_none());
        assert!(!config.active);
    }
}
