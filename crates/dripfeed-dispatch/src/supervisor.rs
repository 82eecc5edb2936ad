//! The tenant-keyed registry of running jobs.
//!
//! At most one job per tenant at any instant. The whole start sequence
//! (duplicate check, config load and validation, spawn, registry insert)
//! happens under a single registry lock hold, so two racing starts for the
//! same tenant cannot both get through. Stop removes the entry immediately
//! and signals the job; it never waits for the loop to unwind.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dripfeed_core::{ConfigSource, DispatchConfig, DripfeedError, MirrorTarget, Result};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::delivery::Deliver;
use crate::job::{DispatchEnv, JobContext, run_job};
use crate::sink::ReportPublisher;

/// Process-unique job ids.
static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime options for the dispatch engine.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Fixed delay between two deliveries of one tenant's pass.
    pub pacing: Duration,
    /// Optional extra delivery appended to every pass of every tenant.
    pub mirror_target: Option<MirrorTarget>,
    /// How long [`Supervisor::shutdown_all`] waits per job.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(3),
            mirror_target: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatchOptions {
    /// Derive options from the deployment config section.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            pacing: config.pacing(),
            mirror_target: config.mirror_target.clone(),
            ..Self::default()
        }
    }
}

/// One running job, as the registry tracks it.
pub(crate) struct RunningJob {
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
    pub messages_sent: Arc<AtomicU64>,
    pub cancel: watch::Sender<bool>,
    pub handle: JoinHandle<()>,
}

pub(crate) type Registry = Arc<Mutex<HashMap<String, RunningJob>>>;

/// Read-only snapshot of one running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStats {
    pub tenant_id: String,
    pub started_at: DateTime<Utc>,
    pub messages_sent: u64,
    pub uptime_secs: i64,
}

/// Owns the registry and the start/stop semantics.
pub struct Supervisor {
    registry: Registry,
    env: Arc<DispatchEnv>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn ConfigSource>,
        deliver: Arc<dyn Deliver>,
        publisher: ReportPublisher,
        options: DispatchOptions,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            env: Arc::new(DispatchEnv {
                store,
                deliver,
                publisher,
                pacing: options.pacing,
                mirror_target: options.mirror_target,
            }),
            shutdown_timeout: options.shutdown_timeout,
        }
    }

    /// Start a tenant's recurring job.
    ///
    /// Fails with [`DripfeedError::AlreadyRunning`] when the tenant already
    /// has a job, and with [`DripfeedError::NotConfigured`] when its record
    /// is missing, has no targets, or has an empty credential. The first
    /// cycle begins immediately.
    pub async fn start(&self, tenant_id: &str) -> Result<JobStats> {
        let mut jobs = self.registry.lock().await;
        if jobs.contains_key(tenant_id) {
            return Err(DripfeedError::AlreadyRunning(tenant_id.to_string()));
        }

        let config = self
            .env
            .store
            .load(tenant_id)
            .await?
            .ok_or_else(|| DripfeedError::not_configured(tenant_id, "no stored record"))?;
        if config.credential.is_empty() {
            return Err(DripfeedError::not_configured(tenant_id, "credential is empty"));
        }
        if config.targets.is_empty() {
            return Err(DripfeedError::not_configured(tenant_id, "no targets configured"));
        }

        let job_id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        let messages_sent = Arc::new(AtomicU64::new(0));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(run_job(
            Arc::clone(&self.env),
            JobContext {
                tenant_id: tenant_id.to_string(),
                job_id,
                started_at,
                messages_sent: Arc::clone(&messages_sent),
                initial_interval: config.interval(),
            },
            Arc::clone(&self.registry),
            cancel_rx,
        ));
        jobs.insert(
            tenant_id.to_string(),
            RunningJob {
                job_id,
                started_at,
                messages_sent,
                cancel: cancel_tx,
                handle,
            },
        );

        tracing::info!("🚀 started job for tenant '{tenant_id}'");
        Ok(JobStats {
            tenant_id: tenant_id.to_string(),
            started_at,
            messages_sent: 0,
            uptime_secs: 0,
        })
    }

    /// Stop a tenant's job.
    ///
    /// The registry entry is gone when this returns, so a follow-up start
    /// succeeds immediately. The loop itself winds down at its next
    /// cancellation point; an in-flight delivery is never aborted.
    pub async fn stop(&self, tenant_id: &str) -> Result<()> {
        let job = {
            let mut jobs = self.registry.lock().await;
            jobs.remove(tenant_id)
                .ok_or_else(|| DripfeedError::NotRunning(tenant_id.to_string()))?
        };
        let _ = job.cancel.send(true);
        tracing::info!("⏹ stopped job for tenant '{tenant_id}'");
        Ok(())
    }

    /// Snapshot of a tenant's running job, `None` when idle.
    pub async fn stats(&self, tenant_id: &str) -> Option<JobStats> {
        let jobs = self.registry.lock().await;
        jobs.get(tenant_id).map(|job| JobStats {
            tenant_id: tenant_id.to_string(),
            started_at: job.started_at,
            messages_sent: job.messages_sent.load(Ordering::Relaxed),
            uptime_secs: Utc::now().signed_duration_since(job.started_at).num_seconds(),
        })
    }

    /// Whether a tenant currently has a running job.
    pub async fn is_running(&self, tenant_id: &str) -> bool {
        self.registry.lock().await.contains_key(tenant_id)
    }

    /// Tenants with a running job, sorted.
    pub async fn running(&self) -> Vec<String> {
        let jobs = self.registry.lock().await;
        let mut ids: Vec<String> = jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn running_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Cancel every job and wait, bounded per job, for the loops to wind
    /// down. Used at host shutdown so in-flight deliveries can finish.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, RunningJob)> = {
            let mut jobs = self.registry.lock().await;
            jobs.drain().collect()
        };
        if drained.is_empty() {
            return;
        }

        tracing::info!("⏬ shutting down {} running job(s)", drained.len());
        for (_, job) in &drained {
            let _ = job.cancel.send(true);
        }
        for (tenant_id, job) in drained {
            if tokio::time::timeout(self.shutdown_timeout, job.handle)
                .await
                .is_err()
            {
                tracing::warn!("⚠️ job for tenant '{tenant_id}' did not wind down in time");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dripfeed_core::{MemStore, TenantConfig};
    use tokio::time::timeout;

    use super::*;
    use crate::mock::{MockDeliver, RecordingSink};

    struct Harness {
        store: Arc<MemStore>,
        deliver: Arc<MockDeliver>,
        sink: Arc<RecordingSink>,
        supervisor: Supervisor,
    }

    fn harness(options: DispatchOptions) -> Harness {
        let store = Arc::new(MemStore::new());
        let deliver = Arc::new(MockDeliver::new());
        let sink = Arc::new(RecordingSink::default());
        let supervisor = Supervisor::new(
            store.clone(),
            deliver.clone(),
            ReportPublisher::new(sink.clone(), None),
            options,
        );
        Harness {
            store,
            deliver,
            sink,
            supervisor,
        }
    }

    fn fast_options() -> DispatchOptions {
        DispatchOptions {
            pacing: Duration::ZERO,
            ..DispatchOptions::default()
        }
    }

    fn tenant(interval_secs: u64) -> TenantConfig {
        TenantConfig::new("tenant-a", "token", interval_secs).with_target("chan-1", "hello")
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let h = harness(fast_options());
        h.store.insert(tenant(60));

        h.supervisor.start("tenant-a").await.unwrap();
        let err = h.supervisor.start("tenant-a").await.unwrap_err();

        assert!(matches!(err, DripfeedError::AlreadyRunning(_)));
        assert_eq!(h.supervisor.running_count().await, 1);
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_start_needs_record() {
        let h = harness(fast_options());

        let err = h.supervisor.start("tenant-a").await.unwrap_err();

        assert!(matches!(err, DripfeedError::NotConfigured { .. }));
        assert!(!h.supervisor.is_running("tenant-a").await);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_record() {
        let h = harness(fast_options());

        h.store.insert(TenantConfig::new("tenant-a", "token", 60));
        let err = h.supervisor.start("tenant-a").await.unwrap_err();
        assert!(matches!(err, DripfeedError::NotConfigured { .. }));

        h.store
            .insert(TenantConfig::new("tenant-a", "", 60).with_target("chan-1", "x"));
        let err = h.supervisor.start("tenant-a").await.unwrap_err();
        assert!(matches!(err, DripfeedError::NotConfigured { .. }));

        // Neither rejection left a ghost entry behind.
        assert_eq!(h.supervisor.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_racing_starts_one_winner() {
        let store = Arc::new(MemStore::new());
        store.insert(tenant(60));
        let supervisor = Arc::new(Supervisor::new(
            store,
            Arc::new(MockDeliver::new()),
            ReportPublisher::new(Arc::new(RecordingSink::default()), None),
            fast_options(),
        ));

        let first = tokio::spawn({
            let s = Arc::clone(&supervisor);
            async move { s.start("tenant-a").await }
        });
        let second = tokio::spawn({
            let s = Arc::clone(&supervisor);
            async move { s.start("tenant-a").await }
        });
        let (first, second) = (first.await.unwrap(), second.await.unwrap());

        // Exactly one winner, whichever task got the lock first.
        assert!(first.is_ok() ^ second.is_ok());
        assert_eq!(supervisor.running_count().await, 1);
        supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_stop_not_running() {
        let h = harness(fast_options());
        let err = h.supervisor.stop("tenant-a").await.unwrap_err();
        assert!(matches!(err, DripfeedError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_lifecycle_and_counter_reset() {
        let h = harness(fast_options());
        h.store.insert(tenant(60));

        h.supervisor.start("tenant-a").await.unwrap();
        assert!(h.deliver.wait_for_calls(1).await);

        // The counter increments just after the transport returns; poll
        // rather than assuming the increment already landed.
        let counted = timeout(Duration::from_secs(2), async {
            loop {
                let sent = h
                    .supervisor
                    .stats("tenant-a")
                    .await
                    .map(|stats| stats.messages_sent)
                    .unwrap_or(0);
                if sent >= 1 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(counted.is_ok());
        let stats = h.supervisor.stats("tenant-a").await.unwrap();
        assert_eq!(stats.tenant_id, "tenant-a");

        h.supervisor.stop("tenant-a").await.unwrap();
        assert!(h.supervisor.stats("tenant-a").await.is_none());

        // A fresh start begins a fresh counter.
        let restarted = h.supervisor.start("tenant-a").await.unwrap();
        assert_eq!(restarted.messages_sent, 0);
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_counter_persists_across_cycles() {
        let h = harness(fast_options());
        h.store.insert(tenant(1));

        h.supervisor.start("tenant-a").await.unwrap();

        // One success per cycle: a count of two can only come from the
        // counter carrying over between loop iterations.
        let accumulated = timeout(Duration::from_secs(5), async {
            loop {
                let sent = h
                    .supervisor
                    .stats("tenant-a")
                    .await
                    .map(|stats| stats.messages_sent)
                    .unwrap_or(0);
                if sent >= 2 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(accumulated.is_ok());
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_stop_cuts_interval_short() {
        let h = harness(fast_options());
        // One-hour interval: only cancellation can end the sleep in time.
        h.store.insert(tenant(3_600));

        h.supervisor.start("tenant-a").await.unwrap();
        assert!(h.deliver.wait_for_calls(1).await);

        let handle = {
            let jobs = h.supervisor.registry.lock().await;
            jobs.get("tenant-a").unwrap().handle.abort_handle()
        };
        h.supervisor.stop("tenant-a").await.unwrap();

        // The loop observes the signal and exits well before the interval.
        let exited = timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(exited.is_ok());
    }

    #[tokio::test]
    async fn test_edit_applies_next_cycle() {
        let h = harness(fast_options());
        h.store.insert(tenant(1));

        h.supervisor.start("tenant-a").await.unwrap();
        assert!(h.deliver.wait_for_calls(1).await);

        // Edit the stored record while the job is running.
        h.store.insert(
            TenantConfig::new("tenant-a", "token", 1).with_target("chan-1", "updated body"),
        );

        let updated = timeout(Duration::from_secs(5), async {
            loop {
                if h.deliver
                    .calls()
                    .iter()
                    .any(|call| call.body == "updated body")
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(updated.is_ok());
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_deleted_record_self_stops() {
        let h = harness(fast_options());
        h.store.insert(tenant(1));

        h.supervisor.start("tenant-a").await.unwrap();
        assert!(h.deliver.wait_for_calls(1).await);

        h.store.remove("tenant-a");

        let freed = timeout(Duration::from_secs(5), async {
            while h.supervisor.is_running("tenant-a").await {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(freed.is_ok());

        // The tenant is startable again once re-stored.
        h.store.insert(tenant(60));
        h.supervisor.start("tenant-a").await.unwrap();
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let h = harness(fast_options());
        for id in ["tenant-a", "tenant-b", "tenant-c"] {
            h.store
                .insert(TenantConfig::new(id, "token", 60).with_target("chan-1", "hi"));
            h.supervisor.start(id).await.unwrap();
        }
        assert_eq!(h.supervisor.running_count().await, 3);

        h.supervisor.shutdown_all().await;

        assert_eq!(h.supervisor.running_count().await, 0);
        assert!(h.supervisor.running().await.is_empty());
    }

    #[tokio::test]
    async fn test_running_sorted() {
        let h = harness(fast_options());
        for id in ["zeta", "alpha", "mid"] {
            h.store
                .insert(TenantConfig::new(id, "token", 60).with_target("chan-1", "hi"));
            h.supervisor.start(id).await.unwrap();
        }

        assert_eq!(h.supervisor.running().await, vec!["alpha", "mid", "zeta"]);
        h.supervisor.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_tenant_sink_receives() {
        let h = harness(fast_options());
        h.store.insert(
            TenantConfig::new("tenant-a", "token", 60)
                .with_target("chan-1", "hello")
                .with_log_sink("https://tenant.example/hook"),
        );

        h.supervisor.start("tenant-a").await.unwrap();
        assert!(h.deliver.wait_for_calls(1).await);

        let posted = timeout(Duration::from_secs(2), async {
            while h.sink.post_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(posted.is_ok());
        assert_eq!(h.sink.posted_urls()[0], "https://tenant.example/hook");
        h.supervisor.shutdown_all().await;
    }
}
