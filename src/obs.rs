//! Optional observability helpers for limiters and the webhook receiver.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `topgg.op` with the `op` and `stage` fields,
//!   plus events for pacing delays, server lifecycle changes, and rejected deliveries.
//! - Enable `metrics` to count outcomes in `topgg_op_total{op, outcome}` and to record how long
//!   limiters held callers back in the `topgg_op_wait_seconds{op}` histogram.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;
pub(crate) use self::tracing::{trace_debug, trace_info, trace_warn};

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Waiting for a rate limiter slot.
	RatelimitAcquire,
	/// Recording a finished call on a rate limiter.
	RatelimitRelease,
	/// Authenticating and dispatching one webhook delivery.
	WebhookDispatch,
	/// Starting or stopping the webhook server.
	WebhookLifecycle,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::RatelimitAcquire => "ratelimit_acquire",
			OpKind::RatelimitRelease => "ratelimit_release",
			OpKind::WebhookDispatch => "webhook_dispatch",
			OpKind::WebhookLifecycle => "webhook_lifecycle",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Request refused before any work was done (e.g. bad credential).
	Rejected,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Rejected => "rejected",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
