//! Report sinks.
//!
//! A sink is an HTTP endpoint that accepts the embed payload of a
//! [`Report`]. The publisher fans one report out to the deployment-wide ops
//! sink and the tenant's own sink; sink trouble is logged and swallowed,
//! because reporting must never change dispatch behavior.

use std::sync::Arc;

use async_trait::async_trait;
use dripfeed_core::{DripfeedError, Result, TransportConfig};

use crate::report::Report;

/// Transport seam for report delivery.
#[async_trait]
pub trait SinkTransport: Send + Sync {
    /// Post one report to one sink URL.
    async fn post(&self, url: &str, report: &Report) -> Result<()>;
}

/// Webhook transport: POST the embed payload as JSON.
pub struct WebhookSink {
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DripfeedError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SinkTransport for WebhookSink {
    async fn post(&self, url: &str, report: &Report) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .json(&report.embeds_payload())
            .send()
            .await
            .map_err(|e| DripfeedError::Transport(format!("sink unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DripfeedError::Transport(format!(
                "sink rejected report: {status}: {body}"
            )));
        }
        Ok(())
    }
}

/// Fans each report out to every configured sink.
pub struct ReportPublisher {
    transport: Arc<dyn SinkTransport>,
    /// Deployment-wide sink, receives every tenant's reports.
    ops_url: Option<String>,
}

impl ReportPublisher {
    pub fn new(transport: Arc<dyn SinkTransport>, ops_url: Option<String>) -> Self {
        Self { transport, ops_url }
    }

    /// Push one report to the ops sink and the tenant sink, in that order.
    /// Failures are logged per sink and otherwise ignored.
    pub async fn publish(&self, tenant_id: &str, report: &Report, tenant_url: Option<&str>) {
        for url in self.sink_urls(tenant_url) {
            if let Err(e) = self.transport.post(url, report).await {
                tracing::warn!("⚠️ report for tenant '{tenant_id}' dropped by sink: {e}");
            }
        }
    }

    fn sink_urls<'a>(&'a self, tenant_url: Option<&'a str>) -> impl Iterator<Item = &'a str> {
        self.ops_url.as_deref().into_iter().chain(tenant_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FailingSink, RecordingSink};
    use crate::outcome::{classify, DispatchOutcome};
    use crate::report::ReportContext;
    use chrono::Utc;

    fn report() -> Report {
        let outcome = DispatchOutcome::new("chan-1", 200, classify(200, ""));
        Report::for_outcome(
            &outcome,
            &ReportContext {
                tenant_id: "tenant-a",
                body: "hi",
                messages_sent: 1,
                interval_secs: 60,
                started_at: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn test_ops_then_tenant_order() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = ReportPublisher::new(sink.clone(), Some("https://ops.example/hook".into()));

        publisher
            .publish("tenant-a", &report(), Some("https://tenant.example/hook"))
            .await;

        let urls = sink.posted_urls();
        assert_eq!(urls, vec!["https://ops.example/hook", "https://tenant.example/hook"]);
    }

    #[tokio::test]
    async fn test_no_sinks_no_posts() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = ReportPublisher::new(sink.clone(), None);

        publisher.publish("tenant-a", &report(), None).await;

        assert!(sink.posted_urls().is_empty());
    }

    #[tokio::test]
    async fn test_failures_swallowed() {
        let publisher = ReportPublisher::new(
            Arc::new(FailingSink),
            Some("https://ops.example/hook".into()),
        );

        // Must not panic or propagate.
        publisher
            .publish("tenant-a", &report(), Some("https://tenant.example/hook"))
            .await;
    }

    /// Rejects one URL, records the rest.
    struct PartialSink {
        inner: RecordingSink,
        down_url: String,
    }

    #[async_trait]
    impl SinkTransport for PartialSink {
        async fn post(&self, url: &str, report: &Report) -> Result<()> {
            if url == self.down_url {
                return Err(DripfeedError::Transport(format!("sink {url} is down")));
            }
            self.inner.post(url, report).await
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_the_other() {
        let sink = Arc::new(PartialSink {
            inner: RecordingSink::default(),
            down_url: "https://ops.example/hook".to_string(),
        });
        let publisher =
            ReportPublisher::new(sink.clone(), Some("https://ops.example/hook".into()));

        publisher
            .publish("tenant-a", &report(), Some("https://tenant.example/hook"))
            .await;

        // The ops sink failed, the tenant sink still got its copy.
        assert_eq!(sink.inner.posted_urls(), vec!["https://tenant.example/hook"]);
    }
}
