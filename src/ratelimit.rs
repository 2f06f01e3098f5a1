//! Client-side pacing for calls against an API with published rate limits.
//!
//! A [`Ratelimit`] follows an explicit two-step protocol: [`Ratelimit::acquire`] waits until one
//! more call fits the quota, and [`Ratelimit::release`] records the finished call. Callers that
//! want the pair tied to a lexical scope use [`RatelimitScope`] or [`scoped`], which release on
//! every exit path, including early returns, panics, and dropped futures.

pub mod composite;
pub mod cooldown;
pub mod endpoint;
pub mod window;

pub use composite::*;
pub use cooldown::*;
pub use endpoint::*;
pub use window::*;

// self
use crate::{_prelude::*, obs};

/// Boxed future returned by [`Ratelimit::acquire`].
pub type AcquireFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Pacing contract shared by single limiters and composites.
pub trait Ratelimit
where
	Self: Send + Sync,
{
	/// Waits until admitting one more call keeps the limiter within its quota.
	///
	/// The future never fails; it only delays. Dropping it before completion must leave the
	/// limiter exactly as it was.
	fn acquire(&self) -> AcquireFuture<'_>;

	/// Records the call admitted by a previous [`acquire`](Ratelimit::acquire).
	fn release(&self) -> Result<(), ReleaseError>;

	/// Gives back a slot admitted by [`acquire`](Ratelimit::acquire) without recording a call.
	///
	/// Used when the protected call never happened. A no-op without an outstanding acquisition.
	fn abandon(&self);
}
impl<T> Ratelimit for Arc<T>
where
	T: ?Sized + Ratelimit,
{
	fn acquire(&self) -> AcquireFuture<'_> {
		(**self).acquire()
	}

	fn release(&self) -> Result<(), ReleaseError> {
		(**self).release()
	}

	fn abandon(&self) {
		(**self).abandon()
	}
}

/// Failure reported by [`Ratelimit::release`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ReleaseError {
	/// The limiter had no outstanding acquisition to release.
	#[error("Rate limiter was released without a matching acquire.")]
	NotAcquired,
	/// Some members of a nested composite failed to release.
	#[error(transparent)]
	Composite(#[from] CompositeReleaseError),
}

/// Aggregated member failures from [`CompositeLimiter::release`].
///
/// Every member has been given the chance to release by the time this error exists.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{} of {members} rate limiter(s) failed to release.", failures.len())]
pub struct CompositeReleaseError {
	/// Member count of the composite that produced the error.
	pub members: usize,
	/// Failing members, as `(position, error)` pairs in declared order.
	pub failures: Vec<(usize, ReleaseError)>,
}

/// Scoped acquisition of a [`Ratelimit`].
///
/// Prefer [`RatelimitScope::release`] to observe release failures; if the scope is dropped
/// without it, the release still happens and any failure is logged.
pub struct RatelimitScope<'a, L>
where
	L: ?Sized + Ratelimit,
{
	limiter: &'a L,
	armed: bool,
}
impl<'a, L> RatelimitScope<'a, L>
where
	L: ?Sized + Ratelimit,
{
	/// Acquires `limiter` and returns the guard that owns the matching release.
	pub async fn enter(limiter: &'a L) -> Self {
		limiter.acquire().await;

		Self { limiter, armed: true }
	}

	/// Releases the limiter, surfacing the failure instead of logging it.
	pub fn release(mut self) -> Result<(), ReleaseError> {
		self.armed = false;

		self.limiter.release()
	}
}
impl<L> Drop for RatelimitScope<'_, L>
where
	L: ?Sized + Ratelimit,
{
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		if let Err(e) = self.limiter.release() {
			obs::record_outcome(obs::OpKind::RatelimitRelease, obs::OpOutcome::Failure);
			obs::trace_warn!(error = %e, "Rate limiter scope failed to release on drop.");

			let _ = e;
		}
	}
}
impl<L> Debug for RatelimitScope<'_, L>
where
	L: ?Sized + Ratelimit,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RatelimitScope").field("armed", &self.armed).finish()
	}
}

/// Runs `action` while holding `limiter`, releasing it once the action finishes.
///
/// The release happens even when `action` panics or the returned future is dropped midway; in
/// those cases release failures are only logged.
pub async fn scoped<L, F>(limiter: &L, action: F) -> Result<F::Output>
where
	L: ?Sized + Ratelimit,
	F: Future,
{
	let scope = RatelimitScope::enter(limiter).await;
	let output = action.await;

	scope.release()?;

	Ok(output)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn scoped_releases_after_action() {
		let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(1))
			.expect("Limiter fixture should be valid.");
		let value = scoped(&limiter, async { 7 }).await.expect("Scoped action should release cleanly.");

		assert_eq!(value, 7);
		assert_eq!(limiter.in_flight(), 0);
		assert_eq!(limiter.recorded_calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_scope_still_records_the_call() {
		let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(1))
			.expect("Limiter fixture should be valid.");

		{
			let _scope = RatelimitScope::enter(&limiter).await;

			assert_eq!(limiter.in_flight(), 1);
		}

		assert_eq!(limiter.in_flight(), 0);
		assert_eq!(limiter.recorded_calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn scoped_surfaces_release_failures() {
		let failing = crate::_preludet::FailingRelease::default();
		let err = scoped(&failing, async {}).await.expect_err("Failing release should surface.");

		assert!(matches!(err, Error::Release(ReleaseError::NotAcquired)));
	}

	#[test]
	fn composite_error_counts_failures() {
		let err = CompositeReleaseError {
			members: 3,
			failures: vec![(1, ReleaseError::NotAcquired)],
		};

		assert_eq!(err.to_string(), "1 of 3 rate limiter(s) failed to release.");
	}
}
