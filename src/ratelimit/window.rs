//! Sliding-window limiter for a single rate-limited resource.
//!
//! The limiter remembers when recent calls finished and admits a new call only while fewer than
//! `max_calls` calls are either recorded inside the trailing `period` or currently in flight
//! (acquired but not yet released). Acquirers queue on a FIFO lock that each one holds for its
//! entire wait, so at most one caller is ever computing or sleeping for a slot.

// crates.io
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	ratelimit::{AcquireFuture, Ratelimit, ReleaseError},
};

const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Serializable limiter settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
	/// Calls admitted per period.
	pub max_calls: u32,
	/// Window length, expressed in (fractional) seconds on the wire.
	#[serde(
		rename = "period_secs",
		default = "default_period",
		deserialize_with = "de_period_secs",
		serialize_with = "ser_period_secs"
	)]
	pub period: Duration,
}
impl LimiterConfig {
	/// Creates settings for `max_calls` per one-second window.
	pub fn new(max_calls: u32) -> Self {
		Self { max_calls, period: DEFAULT_PERIOD }
	}

	/// Overrides the window length.
	pub fn with_period(mut self, period: Duration) -> Self {
		self.period = period;

		self
	}
}

/// Paces calls so that at most `max_calls` happen within any trailing `period`.
///
/// Cloning the limiter yields another handle to the same window; this is how one limiter is
/// shared between several [`CompositeLimiter`](crate::ratelimit::CompositeLimiter)s.
#[derive(Clone)]
pub struct SlidingWindowLimiter(Arc<WindowShared>);
impl SlidingWindowLimiter {
	/// Creates a limiter admitting `max_calls` calls per `period`.
	pub fn new(max_calls: u32, period: Duration) -> Result<Self, ConfigError> {
		if max_calls == 0 {
			return Err(ConfigError::NonPositiveQuota);
		}
		if period.is_zero() {
			return Err(ConfigError::NonPositivePeriod);
		}

		Ok(Self(Arc::new(WindowShared {
			max_calls: max_calls as usize,
			period,
			turn: AsyncMutex::new(()),
			state: Mutex::new(WindowState::default()),
			released: Notify::new(),
		})))
	}

	/// Creates a limiter admitting `max_calls` calls per second.
	pub fn per_second(max_calls: u32) -> Result<Self, ConfigError> {
		Self::new(max_calls, DEFAULT_PERIOD)
	}

	/// Creates a limiter from deserialized settings.
	pub fn from_config(config: &LimiterConfig) -> Result<Self, ConfigError> {
		Self::new(config.max_calls, config.period)
	}

	/// Calls admitted per period.
	pub fn max_calls(&self) -> usize {
		self.0.max_calls
	}

	/// Window length.
	pub fn period(&self) -> Duration {
		self.0.period
	}

	/// Finished calls still inside the trailing window.
	pub fn recorded_calls(&self) -> usize {
		let mut state = self.0.state.lock();

		state.trim(Instant::now(), self.0.period);
		state.calls.len()
	}

	/// Calls admitted but not yet released.
	pub fn in_flight(&self) -> usize {
		self.0.state.lock().in_flight
	}

	/// Time between the oldest and newest recorded call (zero with fewer than two).
	pub fn span(&self) -> Duration {
		self.0.state.lock().span()
	}

	/// Returns `true` when both handles point at the same window.
	pub fn shares_window_with(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Waits until one more call fits the window, then marks it as in flight.
	///
	/// Acquirers are served in request order. Cancelling the returned future records nothing.
	pub async fn acquire(&self) {
		let span = OpSpan::new(OpKind::RatelimitAcquire, "acquire");

		let requested_at = Instant::now();

		obs::record_outcome(OpKind::RatelimitAcquire, OpOutcome::Attempt);
		span.instrument(self.wait_for_slot()).await;
		obs::record_outcome(OpKind::RatelimitAcquire, OpOutcome::Success);
		obs::record_wait(OpKind::RatelimitAcquire, requested_at.elapsed());
	}

	/// Records the current instant for a call admitted by [`acquire`](Self::acquire) and drops
	/// calls that have left the window.
	pub fn release(&self) -> Result<(), ReleaseError> {
		let _entered = OpSpan::new(OpKind::RatelimitRelease, "release").entered();

		{
			let mut state = self.0.state.lock();

			if state.in_flight == 0 {
				obs::record_outcome(OpKind::RatelimitRelease, OpOutcome::Failure);

				return Err(ReleaseError::NotAcquired);
			}

			let now = Instant::now();

			state.in_flight -= 1;
			state.calls.push_back(now);
			state.trim(now, self.0.period);
		}

		self.0.released.notify_one();
		obs::record_outcome(OpKind::RatelimitRelease, OpOutcome::Success);

		Ok(())
	}

	/// Frees a slot admitted by [`acquire`](Self::acquire) without recording a call.
	///
	/// Does nothing when no call is in flight.
	pub fn abandon(&self) {
		{
			let mut state = self.0.state.lock();

			if state.in_flight == 0 {
				return;
			}

			state.in_flight -= 1;
		}

		self.0.released.notify_one();
		obs::trace_debug!(max_calls = self.0.max_calls, "Abandoned an acquired rate limiter slot.");
	}

	async fn wait_for_slot(&self) {
		let shared = &self.0;
		let _turn = shared.turn.lock().await;

		loop {
			let wake_at = {
				let mut state = shared.state.lock();

				state.trim(Instant::now(), shared.period);

				match state.next_opening(shared.max_calls, shared.period) {
					Opening::Now => {
						state.in_flight += 1;

						return;
					},
					opening => opening,
				}
			};

			match wake_at {
				Opening::At(deadline) => {
					obs::trace_debug!(
						delay_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
						max_calls = shared.max_calls,
						"Rate limiter is full; waiting for the oldest call to leave the window."
					);
					tokio::time::sleep_until(deadline).await;
				},
				Opening::AfterRelease => {
					obs::trace_debug!(
						max_calls = shared.max_calls,
						"Rate limiter is saturated by in-flight calls; waiting for a release."
					);
					shared.released.notified().await;
				},
				Opening::Now => {},
			}
		}
	}
}
impl Ratelimit for SlidingWindowLimiter {
	fn acquire(&self) -> AcquireFuture<'_> {
		Box::pin(SlidingWindowLimiter::acquire(self))
	}

	fn release(&self) -> Result<(), ReleaseError> {
		SlidingWindowLimiter::release(self)
	}

	fn abandon(&self) {
		SlidingWindowLimiter::abandon(self)
	}
}
impl Debug for SlidingWindowLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.0.state.lock();

		f.debug_struct("SlidingWindowLimiter")
			.field("max_calls", &self.0.max_calls)
			.field("period", &self.0.period)
			.field("recorded", &state.calls.len())
			.field("in_flight", &state.in_flight)
			.finish()
	}
}

struct WindowShared {
	max_calls: usize,
	period: Duration,
	// Held by one acquirer for its whole wait; tokio's mutex hands the lock out in FIFO order.
	turn: AsyncMutex<()>,
	state: Mutex<WindowState>,
	released: Notify,
}

#[derive(Debug, Default)]
struct WindowState {
	// Oldest first.
	calls: VecDeque<Instant>,
	in_flight: usize,
}
impl WindowState {
	fn trim(&mut self, now: Instant, period: Duration) {
		while let Some(oldest) = self.calls.front() {
			if now.saturating_duration_since(*oldest) < period {
				break;
			}

			self.calls.pop_front();
		}
	}

	fn span(&self) -> Duration {
		match (self.calls.front(), self.calls.back()) {
			(Some(oldest), Some(newest)) if self.calls.len() >= 2 =>
				newest.saturating_duration_since(*oldest),
			_ => Duration::ZERO,
		}
	}

	// Expects a freshly trimmed window.
	fn next_opening(&self, max_calls: usize, period: Duration) -> Opening {
		let occupied = self.calls.len() + self.in_flight;

		if occupied < max_calls {
			return Opening::Now;
		}

		// Recorded calls expire oldest first; the `excess`-th one frees the slot we need.
		let excess = occupied + 1 - max_calls;

		// A window too long for the clock to represent never expires a call on its own.
		match self.calls.get(excess - 1).and_then(|call| call.checked_add(period)) {
			Some(deadline) => Opening::At(deadline),
			None => Opening::AfterRelease,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Opening {
	Now,
	At(Instant),
	AfterRelease,
}

fn default_period() -> Duration {
	DEFAULT_PERIOD
}

fn de_period_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let secs = f64::deserialize(deserializer)?;

	Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

fn ser_period_secs<S>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_f64(period.as_secs_f64())
}
