// self
use crate::{_prelude::*, obs::OpKind};

/// Future returned by [`OpSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// `topgg.op` span covering one limiter or webhook operation.
///
/// Async operations (acquiring a slot, dispatching a vote, binding the server) run inside
/// [`instrument`](Self::instrument). Releases happen synchronously, often from `Drop`, so they
/// use [`entered`](Self::entered) instead.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a span for `kind`; `stage` names the call site, e.g. `acquire` or `start`.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("topgg.op", op = kind.as_str(), stage) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Runs `fut` inside the span without holding an entered guard across its await points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Enters the span until the returned guard drops.
	///
	/// The guard is not `Send`; keep it out of async code.
	pub fn entered(self) -> OpGuard {
		OpGuard {
			#[cfg(feature = "tracing")]
			_entered: self.span.entered(),
		}
	}
}

/// Keeps an [`OpSpan`] entered for the rest of a synchronous scope.
#[derive(Debug)]
#[must_use = "The span is exited as soon as the guard is dropped."]
pub struct OpGuard {
	#[cfg(feature = "tracing")]
	_entered: tracing::span::EnteredSpan,
}

/// Debug-level event, for pacing decisions; nothing without `tracing`.
macro_rules! trace_debug {
	($($arg:tt)*) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::debug!($($arg)*);
		}
	}};
}
/// Info-level event, for server lifecycle and route changes; nothing without `tracing`.
macro_rules! trace_info {
	($($arg:tt)*) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::info!($($arg)*);
		}
	}};
}
/// Warn-level event, for rejected deliveries and failed releases; nothing without `tracing`.
macro_rules! trace_warn {
	($($arg:tt)*) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::warn!($($arg)*);
		}
	}};
}
pub(crate) use {trace_debug, trace_info, trace_warn};
