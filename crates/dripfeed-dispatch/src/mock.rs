//! In-memory fakes for exercising the dispatch pipeline without a network.
//!
//! Used by this crate's own tests and handy for embedders writing theirs.
//! Pairs with [`dripfeed_core::MemStore`] for fully in-process setups.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dripfeed_core::{DripfeedError, Result, Target};

use crate::delivery::Deliver;
use crate::outcome::{Classification, DispatchOutcome};
use crate::report::Report;
use crate::sink::SinkTransport;

/// One recorded delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCall {
    pub target_id: String,
    pub body: String,
    pub credential: String,
}

/// Scriptable [`Deliver`] that records every call.
///
/// Every target succeeds unless an outcome was scripted for it with
/// [`MockDeliver::script_outcome`].
#[derive(Default)]
pub struct MockDeliver {
    calls: Mutex<Vec<DeliveryCall>>,
    outcomes: Mutex<HashMap<String, Classification>>,
}

impl MockDeliver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future delivery to `target_id` classify as `outcome`.
    pub fn script_outcome(&self, target_id: &str, outcome: Classification) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(target_id.to_string(), outcome);
    }

    pub fn calls(&self) -> Vec<DeliveryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Target ids in the order they were attempted.
    pub fn attempted_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.target_id.clone())
            .collect()
    }

    /// Wait until at least `n` deliveries were attempted. Capped at a few
    /// seconds so a wedged test fails instead of hanging.
    pub async fn wait_for_calls(&self, n: usize) -> bool {
        for _ in 0..400 {
            if self.call_count() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl Deliver for MockDeliver {
    async fn deliver(&self, credential: &str, target: &Target) -> DispatchOutcome {
        self.calls.lock().unwrap().push(DeliveryCall {
            target_id: target.id.clone(),
            body: target.body.clone(),
            credential: credential.to_string(),
        });

        let classification = self
            .outcomes
            .lock()
            .unwrap()
            .get(&target.id)
            .cloned()
            .unwrap_or(Classification::Success);

        match &classification {
            Classification::Success => DispatchOutcome::new(&target.id, 200, classification),
            Classification::AuthFailure => DispatchOutcome::new(&target.id, 401, classification),
            Classification::RateLimited { .. } => {
                DispatchOutcome::new(&target.id, 429, classification)
            }
            Classification::OtherFailure { .. } => {
                DispatchOutcome::new(&target.id, 500, classification)
            }
            Classification::TransportError { reason } => {
                DispatchOutcome::transport_error(&target.id, reason.clone())
            }
        }
    }
}

/// [`SinkTransport`] that records every post and always succeeds.
#[derive(Default)]
pub struct RecordingSink {
    posts: Mutex<Vec<(String, Report)>>,
}

impl RecordingSink {
    pub fn posts(&self) -> Vec<(String, Report)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn posted_urls(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl SinkTransport for RecordingSink {
    async fn post(&self, url: &str, report: &Report) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), report.clone()));
        Ok(())
    }
}

/// [`SinkTransport`] that rejects every post.
pub struct FailingSink;

#[async_trait]
impl SinkTransport for FailingSink {
    async fn post(&self, url: &str, _report: &Report) -> Result<()> {
        Err(DripfeedError::Transport(format!("sink {url} is down")))
    }
}
