//! # Dripfeed Dispatch
//!
//! The recurring-dispatch engine: a tenant-keyed supervisor running one
//! delivery loop per started tenant, with classified outcomes and webhook
//! status reports per attempt.
//!
//! ## Architecture
//! ```text
//! Supervisor (registry: tenant id → running job, at most one each)
//!   ├── start / stop / stats / shutdown_all
//!   └── per tenant: recurring job (tokio task)
//!         loop: re-read TenantConfig from the store
//!           ├── fan-out pass: targets in order, paced
//!           │     ├── Deliver: one POST, bounded timeout, no retry
//!           │     ├── classify: Success | AuthFailure | RateLimited | ...
//!           │     └── Report → ReportPublisher → ops sink + tenant sink
//!           └── sleep interval (cancel-interruptible)
//! ```
//!
//! Delivery failures are outcomes, not errors: they are reported to the
//! sinks and the loop keeps its schedule. The only way a job ends by
//! itself is its tenant record disappearing from the store.

pub mod delivery;
pub mod mock;
pub mod outcome;
pub mod report;
pub mod sink;
pub mod supervisor;

mod cycle;
mod job;

pub use delivery::{Deliver, HttpDelivery};
pub use outcome::{Classification, DispatchOutcome, Severity, classify};
pub use report::{Report, ReportContext};
pub use sink::{ReportPublisher, SinkTransport, WebhookSink};
pub use supervisor::{DispatchOptions, JobStats, Supervisor};
