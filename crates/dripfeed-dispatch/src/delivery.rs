//! Outbound delivery transport.
//!
//! One call is one attempt: a single POST with a bounded timeout, no
//! retries, no redelivery. Whatever happens on the wire comes back as a
//! classified [`DispatchOutcome`], never as an `Err` that could knock a
//! dispatch loop off its schedule.

use async_trait::async_trait;
use dripfeed_core::{DripfeedError, Result, Target, TransportConfig};

use crate::outcome::{DispatchOutcome, classify};

/// Delivery seam between the dispatch loop and the wire.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Attempt exactly one delivery of `target.body` to `target.id`.
    async fn deliver(&self, credential: &str, target: &Target) -> DispatchOutcome;
}

/// HTTP delivery against a templated per-target endpoint.
#[derive(Debug)]
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint_template: String,
}

impl HttpDelivery {
    /// Build the shared client. Fails when the endpoint template has no
    /// `{target}` placeholder or the client cannot be constructed.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        if !config.endpoint_template.contains("{target}") {
            return Err(DripfeedError::Config(format!(
                "endpoint template '{}' has no {{target}} placeholder",
                config.endpoint_template
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DripfeedError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            endpoint_template: config.endpoint_template.clone(),
        })
    }

    fn endpoint_for(&self, target_id: &str) -> String {
        self.endpoint_template.replace("{target}", target_id)
    }
}

#[async_trait]
impl Deliver for HttpDelivery {
    async fn deliver(&self, credential: &str, target: &Target) -> DispatchOutcome {
        let url = self.endpoint_for(&target.id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", credential)
            .json(&serde_json::json!({ "content": target.body }))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                DispatchOutcome::new(&target.id, status, classify(status, &body))
            }
            Err(e) => {
                tracing::debug!("request to target '{}' never completed: {e}", target.id);
                DispatchOutcome::transport_error(&target.id, e.to_string())
            }
        }
    }
}
