//! Dripfeed deployment configuration.
//!
//! One TOML file per deployment (`~/.dripfeed/config.toml` by default)
//! describing the delivery endpoint, fan-out pacing policy, report sinks,
//! and the tenant store location. Per-tenant state lives in the store, never
//! here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DripfeedError, Result};

/// Root deployment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DripfeedConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl DripfeedConfig {
    /// Load config from the default path (`~/.dripfeed/config.toml`).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DripfeedError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DripfeedError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DripfeedError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// The dripfeed home directory (`~/.dripfeed`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dripfeed")
    }

    /// Resolved tenant store path (config override or the default).
    pub fn store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(p) => PathBuf::from(p),
            None => Self::home_dir().join("tenants.json"),
        }
    }
}

/// Delivery transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-target endpoint URL with a literal `{target}` placeholder.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    /// Hard timeout for every outbound request, in seconds. One hung
    /// target must never stall a tenant's whole cycle.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_endpoint_template() -> String {
    "https://discord.com/api/v10/channels/{target}/messages".into()
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl TransportConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Fan-out pacing and mirror policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Fixed delay between two targets of the same tenant, in seconds.
    /// Deployment-level; tenants cannot change it.
    #[serde(default = "default_pacing")]
    pub pacing_secs: u64,
    /// Optional extra delivery appended to every tenant's cycle. Absent by
    /// default; deployments that want one must declare it here explicitly.
    #[serde(default)]
    pub mirror_target: Option<MirrorTarget>,
}

fn default_pacing() -> u64 {
    3
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_secs: default_pacing(),
            mirror_target: None,
        }
    }
}

impl DispatchConfig {
    /// Inter-target pacing as a [`Duration`].
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}

/// An explicitly declared secondary delivery target with its own body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorTarget {
    pub id: String,
    pub body: String,
}

/// Report sink settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Operator-owned sink; receives every report from every tenant when set.
    #[serde(default)]
    pub ops_url: Option<String>,
}

/// Tenant store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the tenants JSON file (default `~/.dripfeed/tenants.json`).
    #[serde(default)]
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DripfeedConfig::default();
        assert!(config.transport.endpoint_template.contains("{target}"));
        assert_eq!(config.transport.request_timeout_secs, 30);
        assert_eq!(config.dispatch.pacing_secs, 3);
        assert!(config.dispatch.mirror_target.is_none());
        assert!(config.sinks.ops_url.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: DripfeedConfig = toml::from_str(
            r#"
            [transport]
            endpoint_template = "https://example.test/api/{target}/post"

            [dispatch]
            pacing_secs = 1

            [dispatch.mirror_target]
            id = "ops-room"
            body = "mirror copy"

            [sinks]
            ops_url = "https://hooks.example.test/ops"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.transport.endpoint_template,
            "https://example.test/api/{target}/post"
        );
        // Unspecified fields keep their defaults.
        assert_eq!(config.transport.request_timeout_secs, 30);
        assert_eq!(config.dispatch.pacing_secs, 1);
        let mirror = config.dispatch.mirror_target.unwrap();
        assert_eq!(mirror.id, "ops-room");
        assert_eq!(config.sinks.ops_url.as_deref(), Some("https://hooks.example.test/ops"));
    }

    #[test]
    fn test_store_path_override() {
        let mut config = DripfeedConfig::default();
        assert!(config.store_path().ends_with("tenants.json"));
        config.store.path = Some("/var/lib/dripfeed/t.json".into());
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/dripfeed/t.json"));
    }
}
