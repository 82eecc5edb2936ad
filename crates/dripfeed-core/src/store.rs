//! Tenant configuration store, a JSON file keyed by tenant id.
//!
//! The dispatch engine reads through the [`ConfigSource`] seam and re-reads
//! on every cycle; [`FileStore`] therefore goes to disk on every `load`
//! instead of caching, so an edit saved by the configuration front-end is
//! visible on the very next cycle of an already-running job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{DripfeedError, Result};
use crate::tenant::TenantConfig;

/// Read seam the dispatch engine depends on.
///
/// `Ok(None)` means the record definitively does not exist; I/O problems
/// are `Err` so callers can tell "gone" from "unreadable right now". A
/// running job terminates on the former and retries on the latter.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load(&self, tenant_id: &str) -> Result<Option<TenantConfig>>;
}

/// On-disk envelope.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    tenants: BTreeMap<String, TenantConfig>,
    /// Stamp of the last successful write.
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// JSON-file tenant store.
///
/// Reads always hit the disk; writes are read-modify-write cycles
/// serialized by an internal lock so the configuration front-end and the
/// host never clobber each other's edits.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create room for) a store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Insert or replace a tenant record.
    ///
    /// Rejects empty tenant ids and zero intervals; collapses duplicate
    /// target ids (last write wins). An empty target list is accepted: the
    /// record may be filled in before the job is ever started.
    pub fn upsert(&self, mut config: TenantConfig) -> Result<()> {
        if config.tenant_id.is_empty() {
            return Err(DripfeedError::Store("tenant_id must not be empty".into()));
        }
        if config.interval_secs == 0 {
            return Err(DripfeedError::Store(format!(
                "tenant '{}': interval_secs must be > 0",
                config.tenant_id
            )));
        }
        config.dedup_targets();

        let _guard = self.write_lock.lock().unwrap();
        let mut file = self.read_file()?;
        file.tenants.insert(config.tenant_id.clone(), config);
        self.write_file(file)
    }

    /// Remove a tenant record. Returns whether it existed.
    pub fn remove(&self, tenant_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap();
        let mut file = self.read_file()?;
        let existed = file.tenants.remove(tenant_id).is_some();
        if existed {
            self.write_file(file)?;
        }
        Ok(existed)
    }

    /// Flip a tenant's autostart flag.
    pub fn set_active(&self, tenant_id: &str, active: bool) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut file = self.read_file()?;
        match file.tenants.get_mut(tenant_id) {
            Some(config) => config.active = active,
            None => {
                return Err(DripfeedError::Store(format!(
                    "unknown tenant '{tenant_id}'"
                )));
            }
        }
        self.write_file(file)
    }

    /// All stored tenants, in stable (id) order.
    pub fn list(&self) -> Result<Vec<TenantConfig>> {
        Ok(self.read_file()?.tenants.into_values().collect())
    }

    fn read_file(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            DripfeedError::Store(format!("failed to read {}: {e}", self.path.display()))
        })?;
        // A corrupt file is an error, not an empty store: silently treating
        // it as empty would let the next write clobber every tenant.
        serde_json::from_str(&content).map_err(|e| {
            DripfeedError::Store(format!("corrupt tenant file {}: {e}", self.path.display()))
        })
    }

    fn write_file(&self, mut file: StoreFile) -> Result<()> {
        file.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| DripfeedError::Store(format!("serialize error: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            DripfeedError::Store(format!("failed to write {}: {e}", self.path.display()))
        })?;
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for FileStore {
    async fn load(&self, tenant_id: &str) -> Result<Option<TenantConfig>> {
        Ok(self.read_file()?.tenants.get(tenant_id).cloned())
    }
}

/// In-memory [`ConfigSource`] backed by a mutex-guarded map.
///
/// For tests and for embedders that manage tenant records themselves.
#[derive(Default)]
pub struct MemStore {
    tenants: Mutex<HashMap<String, TenantConfig>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&self, config: TenantConfig) {
        self.tenants
            .lock()
            .unwrap()
            .insert(config.tenant_id.clone(), config);
    }

    /// Delete a record.
    pub fn remove(&self, tenant_id: &str) {
        self.tenants.lock().unwrap().remove(tenant_id);
    }
}

#[async_trait]
impl ConfigSource for MemStore {
    async fn load(&self, tenant_id: &str) -> Result<Option<TenantConfig>> {
        Ok(self.tenants.lock().unwrap().get(tenant_id).cloned())
    }
}
