//! Status report formatting.
//!
//! One report per delivery attempt, shaped like a webhook embed: severity
//! color, tenant and target identity, an excerpt of the delivered body, the
//! running counter, the next scheduled dispatch and job uptime. Building a
//! report is pure string work; it never performs I/O and never fails.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::outcome::{Classification, DispatchOutcome, Severity};

const COLOR_POSITIVE: u32 = 0x2ECC71;
const COLOR_WARNING: u32 = 0xE67E22;
const COLOR_NEGATIVE: u32 = 0xE74C3C;

/// How many characters of the delivered body a report quotes.
const EXCERPT_CHARS: usize = 120;

/// Everything a report needs beyond the outcome itself.
pub struct ReportContext<'a> {
    pub tenant_id: &'a str,
    /// Body that was delivered to this target.
    pub body: &'a str,
    /// Running success counter, already including this outcome if it
    /// succeeded.
    pub messages_sent: u64,
    pub interval_secs: u64,
    pub started_at: DateTime<Utc>,
}

/// A formatted status report, ready for sink delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub title: String,
    pub color: u32,
    pub description: String,
    pub footer: String,
    pub timestamp: DateTime<Utc>,
}

impl Report {
    /// Build the report for one delivery outcome.
    pub fn for_outcome(outcome: &DispatchOutcome, ctx: &ReportContext<'_>) -> Self {
        Self::build(outcome, ctx, Utc::now())
    }

    /// Deterministic core, split out so tests can pin `now`.
    fn build(outcome: &DispatchOutcome, ctx: &ReportContext<'_>, now: DateTime<Utc>) -> Self {
        let next_dispatch = next_dispatch_at(now, ctx.interval_secs);
        let uptime = now.signed_duration_since(ctx.started_at).num_seconds();

        let description = format!(
            "**Status:** {status}\n\
             **Tenant:** {tenant}\n\
             **Target:** {target}\n\
             **Message:** {message}\n\
             **Sent:** {sent}\n\
             **Next dispatch:** {next}\n\
             **Uptime:** {uptime}",
            status = status_line(outcome),
            tenant = ctx.tenant_id,
            target = outcome.target_id,
            message = excerpt(ctx.body),
            sent = ctx.messages_sent,
            next = next_dispatch.format("%H:%M:%S UTC"),
            uptime = humanize_secs(uptime),
        );

        Self {
            title: "Dripfeed delivery report".to_string(),
            color: color_for(outcome.classification.severity()),
            description,
            footer: format!("dripfeed v{}", env!("CARGO_PKG_VERSION")),
            timestamp: now,
        }
    }

    /// Wire payload for sink delivery: `{"embeds": [embed]}`.
    pub fn embeds_payload(&self) -> serde_json::Value {
        json!({
            "embeds": [{
                "title": self.title,
                "color": self.color,
                "description": self.description,
                "footer": { "text": self.footer },
                "timestamp": self.timestamp.to_rfc3339(),
            }]
        })
    }
}

/// `now + interval_secs`, clamped to chrono's maximum instead of overflowing.
fn next_dispatch_at(now: DateTime<Utc>, interval_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(interval_secs).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn color_for(severity: Severity) -> u32 {
    match severity {
        Severity::Positive => COLOR_POSITIVE,
        Severity::Warning => COLOR_WARNING,
        Severity::Negative => COLOR_NEGATIVE,
    }
}

fn status_line(outcome: &DispatchOutcome) -> String {
    let mut line = match &outcome.classification {
        Classification::Success => "✅ delivered".to_string(),
        Classification::RateLimited { retry_after_secs } => {
            format!("⏳ rate limited, retry in {retry_after_secs}s")
        }
        Classification::AuthFailure => "❌ auth failure, credential rejected".to_string(),
        Classification::OtherFailure { reason } => format!("❌ failed: {reason}"),
        Classification::TransportError { reason } => format!("❌ transport_error: {reason}"),
    };
    if let Some(code) = outcome.http_status {
        line.push_str(&format!(" (HTTP {code})"));
    }
    line
}

/// First `EXCERPT_CHARS` characters of the body, quoted. Counted in chars,
/// not bytes, so multibyte text cannot split a character.
fn excerpt(body: &str) -> String {
    if body.chars().count() > EXCERPT_CHARS {
        let taken: String = body.chars().take(EXCERPT_CHARS).collect();
        format!("\"{taken}…\"")
    } else {
        format!("\"{body}\"")
    }
}

/// Render whole seconds as `1d 2h 3m 4s`, dropping leading zero units.
fn humanize_secs(total: i64) -> String {
    let total = total.max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
