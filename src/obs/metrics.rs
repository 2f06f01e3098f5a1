// self
use crate::{
	_prelude::*,
	obs::{OpKind, OpOutcome},
};

/// Bumps `topgg_op_total{op, outcome}` when the `metrics` feature is on.
pub fn record_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("topgg_op_total", "op" => kind.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how long a limiter made its caller wait in `topgg_op_wait_seconds{op}`.
///
/// Zero waits are skipped so the histogram only describes calls that were actually paced.
pub fn record_wait(kind: OpKind, waited: Duration) {
	if waited.is_zero() {
		return;
	}

	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("topgg_op_wait_seconds", "op" => kind.as_str())
			.record(waited.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = kind;
	}
}
