//! One fan-out pass over a tenant's target list.
//!
//! Targets run strictly in list order, one at a time, with a fixed pacing
//! sleep between consecutive deliveries. A failed target is reported like
//! any other outcome and never aborts the rest of the pass; the only thing
//! that cuts a pass short is cancellation.

use std::sync::atomic::Ordering;
use std::time::Duration;

use dripfeed_core::{Target, TenantConfig};
use tokio::sync::watch;

use crate::job::{DispatchEnv, JobContext};
use crate::report::{Report, ReportContext};

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CycleStats {
    pub attempted: usize,
    pub succeeded: usize,
    /// True when cancellation cut the pass short.
    pub cancelled: bool,
}

/// Run one fan-out pass with the given tenant snapshot.
///
/// Increments the job's success counter once per successful regular target
/// and publishes one report per attempted delivery. Mirror deliveries are
/// attempted and reported like any other, but never counted.
pub(crate) async fn run_cycle(
    config: &TenantConfig,
    env: &DispatchEnv,
    ctx: &JobContext,
    cancel: &mut watch::Receiver<bool>,
) -> CycleStats {
    let mut stats = CycleStats::default();

    let mirror = env
        .mirror_target
        .as_ref()
        .map(|m| Target::new(&m.id, &m.body));
    let total = config.targets.len() + usize::from(mirror.is_some());

    for (index, target) in config.targets.iter().chain(mirror.as_ref()).enumerate() {
        if *cancel.borrow() {
            stats.cancelled = true;
            break;
        }
        let counted = index < config.targets.len();

        let outcome = env.deliver.deliver(&config.credential, target).await;
        stats.attempted += 1;
        if outcome.success() {
            stats.succeeded += 1;
            if counted {
                ctx.messages_sent.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(
                "📨 tenant '{}': delivered to target '{}'",
                config.tenant_id,
                target.id
            );
        } else {
            tracing::warn!(
                "📭 tenant '{}': target '{}' {}{}",
                config.tenant_id,
                target.id,
                outcome.classification.label(),
                outcome
                    .detail()
                    .map(|d| format!(": {d}"))
                    .unwrap_or_default()
            );
        }

        let report = Report::for_outcome(
            &outcome,
            &ReportContext {
                tenant_id: &config.tenant_id,
                body: &target.body,
                messages_sent: ctx.messages_sent.load(Ordering::Relaxed),
                interval_secs: config.interval_secs,
                started_at: ctx.started_at,
            },
        );
        env.publisher
            .publish(&config.tenant_id, &report, config.log_sink_url.as_deref())
            .await;

        // Pace between deliveries, never after the last one.
        if index + 1 < total && !sleep_unless_cancelled(env.pacing, cancel).await {
            stats.cancelled = true;
            break;
        }
    }

    stats
}

/// Sleep that the cancel signal can interrupt. Returns `false` when the
/// job was cancelled (or the cancel sender vanished) before the duration
/// elapsed.
pub(crate) async fn sleep_unless_cancelled(
    duration: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> bool {
    if *cancel.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = cancel.changed() => match changed {
            Ok(()) => !*cancel.borrow(),
            Err(_) => false,
        },
    }
}
