//! Acquire several limiters as one unit.

// self
use crate::{
	_prelude::*,
	obs::{self, OpKind, OpOutcome},
	ratelimit::{AcquireFuture, CompositeReleaseError, Ratelimit, ReleaseError, SlidingWindowLimiter},
};

/// Ordered group of limiters that are acquired and released together.
///
/// Members are acquired one after another in declared order and released all at once. Members
/// are shared rather than owned, so a limiter may sit in several composites; to rule out lock
/// ordering inversions, every composite sharing members should list them in the same order.
#[derive(Clone)]
pub struct CompositeLimiter {
	members: Arc<[Arc<dyn Ratelimit>]>,
}
impl CompositeLimiter {
	/// Creates a composite over `members`, in the given order.
	pub fn new(members: impl IntoIterator<Item = Arc<dyn Ratelimit>>) -> Self {
		Self { members: members.into_iter().collect() }
	}

	/// Creates a composite over sliding-window limiters, sharing their windows.
	pub fn from_windows<'a>(members: impl IntoIterator<Item = &'a SlidingWindowLimiter>) -> Self {
		Self::new(members.into_iter().map(|m| Arc::new(m.clone()) as Arc<dyn Ratelimit>))
	}

	/// Number of members.
	pub fn len(&self) -> usize {
		self.members.len()
	}

	/// Returns `true` when the composite has no members.
	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	/// Acquires every member in declared order.
	///
	/// If the future is dropped midway, members that were already acquired are abandoned, so none
	/// of them keeps an in-flight slot or records a call.
	pub async fn acquire(&self) {
		let mut rollback = Rollback { members: &self.members, acquired: 0 };

		for member in self.members.iter() {
			member.acquire().await;

			rollback.acquired += 1;
		}

		rollback.acquired = 0;
	}

	/// Releases every member, even when some of them fail.
	///
	/// Failures are collected in member order and reported once all members have been released.
	pub fn release(&self) -> Result<(), CompositeReleaseError> {
		let failures = self
			.members
			.iter()
			.enumerate()
			.filter_map(|(i, member)| member.release().err().map(|e| (i, e)))
			.collect::<Vec<_>>();

		if failures.is_empty() {
			return Ok(());
		}

		obs::record_outcome(OpKind::RatelimitRelease, OpOutcome::Failure);
		obs::trace_warn!(
			failed = failures.len(),
			members = self.members.len(),
			"Composite rate limiter release had failing members."
		);

		Err(CompositeReleaseError { members: self.members.len(), failures })
	}

	/// Abandons every member without recording a call.
	pub fn abandon(&self) {
		for member in self.members.iter() {
			member.abandon();
		}
	}
}
impl Ratelimit for CompositeLimiter {
	fn acquire(&self) -> AcquireFuture<'_> {
		Box::pin(CompositeLimiter::acquire(self))
	}

	fn release(&self) -> Result<(), ReleaseError> {
		CompositeLimiter::release(self).map_err(ReleaseError::from)
	}

	fn abandon(&self) {
		CompositeLimiter::abandon(self)
	}
}
impl Debug for CompositeLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CompositeLimiter").field("members", &self.members.len()).finish()
	}
}

struct Rollback<'a> {
	members: &'a [Arc<dyn Ratelimit>],
	acquired: usize,
}
impl Drop for Rollback<'_> {
	fn drop(&mut self) {
		for member in &self.members[..self.acquired] {
			member.abandon();
		}

		if self.acquired > 0 {
			obs::trace_debug!(
				abandoned = self.acquired,
				"Rolled back a partially acquired composite rate limiter."
			);
		}
	}
}
