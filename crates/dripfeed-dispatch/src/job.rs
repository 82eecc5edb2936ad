//! The per-tenant recurring job.
//!
//! A job is one tokio task driving one tenant's loop: re-read the tenant
//! record, run one fan-out pass, sleep the tenant's interval, repeat. The
//! record is re-read from the store on every iteration, so edits take
//! effect at the next cycle without a restart.
//!
//! A job ends in exactly two ways: its cancel signal flips (stop or
//! shutdown), or the tenant record disappears from the store, in which
//! case the job removes its own registry entry on the way out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dripfeed_core::{ConfigSource, MirrorTarget};
use tokio::sync::watch;

use crate::cycle::{run_cycle, sleep_unless_cancelled};
use crate::delivery::Deliver;
use crate::sink::ReportPublisher;
use crate::supervisor::Registry;

/// Shared dispatch machinery, one per supervisor, shared by every job.
pub(crate) struct DispatchEnv {
    pub store: Arc<dyn ConfigSource>,
    pub deliver: Arc<dyn Deliver>,
    pub publisher: ReportPublisher,
    /// Fixed delay between two deliveries of one pass.
    pub pacing: Duration,
    /// Optional extra delivery appended to every pass.
    pub mirror_target: Option<MirrorTarget>,
}

/// Identity and counters of one running job.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub tenant_id: String,
    /// Process-unique id, so a terminating job can prove a registry entry
    /// is its own and not a successor's.
    pub job_id: u64,
    pub started_at: DateTime<Utc>,
    pub messages_sent: Arc<AtomicU64>,
    /// Interval from the config the job was started with; used as the
    /// retry delay until a store read succeeds.
    pub initial_interval: Duration,
}

/// Drive one tenant's loop until cancelled or the record disappears.
pub(crate) async fn run_job(
    env: Arc<DispatchEnv>,
    ctx: JobContext,
    registry: Registry,
    mut cancel: watch::Receiver<bool>,
) {
    tracing::info!("▶️ job started for tenant '{}'", ctx.tenant_id);
    let mut interval = ctx.initial_interval;

    loop {
        if *cancel.borrow() {
            break;
        }

        let config = match env.store.load(&ctx.tenant_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                // Definitively gone: treat as an implicit stop.
                tracing::warn!(
                    "🗑 tenant '{}' no longer stored; job terminating",
                    ctx.tenant_id
                );
                remove_if_current(&registry, &ctx).await;
                return;
            }
            Err(e) => {
                // Unreadable is not gone. Keep the schedule and retry.
                tracing::warn!("⚠️ tenant '{}': store read failed: {e}", ctx.tenant_id);
                if !sleep_unless_cancelled(interval, &mut cancel).await {
                    break;
                }
                continue;
            }
        };
        interval = config.interval();

        if config.targets.is_empty() {
            tracing::warn!("💤 tenant '{}' has no targets, idling", ctx.tenant_id);
        } else {
            let stats = run_cycle(&config, &env, &ctx, &mut cancel).await;
            if stats.cancelled {
                break;
            }
            tracing::info!(
                "📬 tenant '{}': cycle complete, {}/{} delivered, {} total",
                ctx.tenant_id,
                stats.succeeded,
                stats.attempted,
                ctx.messages_sent.load(Ordering::Relaxed)
            );
        }

        if !sleep_unless_cancelled(interval, &mut cancel).await {
            break;
        }
    }

    tracing::info!("⏹ job for tenant '{}' cancelled", ctx.tenant_id);
}

/// Remove this job's registry entry, unless a newer job already replaced
/// it. Stop followed by a quick restart must never lose the new entry to
/// the old job's cleanup.
async fn remove_if_current(registry: &Registry, ctx: &JobContext) {
    let mut jobs = registry.lock().await;
    if jobs
        .get(&ctx.tenant_id)
        .is_some_and(|job| job.job_id == ctx.job_id)
    {
        jobs.remove(&ctx.tenant_id);
    }
}
