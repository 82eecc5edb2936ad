//! Outcome classification for delivery attempts.
//!
//! Every attempt against a target yields exactly one [`DispatchOutcome`].
//! The status partition is exhaustive and load-bearing: report colors and
//! log severity both derive from it.
//!
//! | HTTP status     | classification                              |
//! |-----------------|---------------------------------------------|
//! | 200, 201, 204   | `Success`                                   |
//! | 401, 403        | `AuthFailure`                               |
//! | 429             | `RateLimited` (retry_after from body, or 0) |
//! | anything else   | `OtherFailure` (body message, or the code)  |
//!
//! Requests that never produced a status (timeout, DNS, refused connection)
//! become `TransportError`. That variant is minted by the transport, never
//! by [`classify`].

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The remote accepted the message.
    Success,
    /// The credential was rejected (401 or 403).
    AuthFailure,
    /// The remote throttled us; `retry_after_secs` is its suggested wait,
    /// rounded up to whole seconds, zero when it did not say.
    RateLimited { retry_after_secs: u64 },
    /// Any other status. `reason` is the body's `message` field when the
    /// body is JSON and has one, otherwise `"Error <code>"`.
    OtherFailure { reason: String },
    /// The request never completed at the HTTP level.
    TransportError { reason: String },
}

/// Report severity, derived from the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Positive,
    Warning,
    Negative,
}

impl Classification {
    /// Severity bucket: rate limiting is transient, everything else that
    /// is not success is negative.
    pub fn severity(&self) -> Severity {
        match self {
            Classification::Success => Severity::Positive,
            Classification::RateLimited { .. } => Severity::Warning,
            _ => Severity::Negative,
        }
    }

    /// Short stable label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::AuthFailure => "auth_failure",
            Classification::RateLimited { .. } => "rate_limited",
            Classification::OtherFailure { .. } => "failure",
            Classification::TransportError { .. } => "transport_error",
        }
    }
}

/// Outcome of one delivery attempt against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub target_id: String,
    /// HTTP status, when the request got far enough to have one.
    pub http_status: Option<u16>,
    pub classification: Classification,
}

impl DispatchOutcome {
    pub fn new(target_id: &str, http_status: u16, classification: Classification) -> Self {
        Self {
            target_id: target_id.to_string(),
            http_status: Some(http_status),
            classification,
        }
    }

    /// Outcome for a request that never reached the remote.
    pub fn transport_error(target_id: &str, reason: impl Into<String>) -> Self {
        Self {
            target_id: target_id.to_string(),
            http_status: None,
            classification: Classification::TransportError {
                reason: reason.into(),
            },
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.classification, Classification::Success)
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.classification {
            Classification::RateLimited { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        }
    }

    /// Failure detail, when the classification carries one.
    pub fn detail(&self) -> Option<&str> {
        match &self.classification {
            Classification::OtherFailure { reason }
            | Classification::TransportError { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Map an HTTP status and response body to a classification.
///
/// Pure. The body is parsed as JSON and silently ignored when it is not.
pub fn classify(status: u16, body: &str) -> Classification {
    match status {
        200 | 201 | 204 => Classification::Success,
        401 | 403 => Classification::AuthFailure,
        429 => Classification::RateLimited {
            retry_after_secs: parse_retry_after(body),
        },
        other => Classification::OtherFailure {
            reason: failure_reason(other, body),
        },
    }
}

/// Read `retry_after` seconds from a 429 body. The field is fractional on
/// the wire; callers sleep in whole seconds, so round up.
fn parse_retry_after(body: &str) -> u64 {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return 0;
    };
    value["retry_after"]
        .as_f64()
        .map(|secs| secs.max(0.0).ceil() as u64)
        .unwrap_or(0)
}

/// Failure reason for a non-special status: the body's `message` field when
/// present, otherwise `"Error <code>"`.
fn failure_reason(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("Error {status}"))
}
