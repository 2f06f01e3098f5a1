//! Honors `Retry-After` blocks imposed by the remote service.
//!
//! Short hints are handed back to the caller as a delay to sleep through; hints above the
//! threshold put the client in a cooldown during which [`Cooldown::check`] fails fast.

// self
use crate::{_prelude::*, obs};

/// Hints longer than this trip the cooldown instead of being slept through.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

// Stand-in deadline for hints the clock cannot represent.
const FOREVER: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Client-wide block set when the service answers `429` with a long `Retry-After`.
#[derive(Debug)]
pub struct Cooldown {
	max_delay: Duration,
	until: Mutex<Option<Instant>>,
}
impl Cooldown {
	/// Creates a gate that trips on hints longer than `max_delay`.
	pub fn new(max_delay: Duration) -> Self {
		Self { max_delay, until: Mutex::new(None) }
	}

	/// Threshold above which hints trip the cooldown.
	pub fn max_delay(&self) -> Duration {
		self.max_delay
	}

	/// Fails with [`Error::Ratelimited`] while a block is active; clears expired blocks.
	pub fn check(&self) -> Result<()> {
		let mut until = self.until.lock();

		match *until {
			Some(deadline) => {
				let now = Instant::now();

				if now < deadline {
					return Err(Error::Ratelimited { retry_after: deadline - now });
				}

				*until = None;

				Ok(())
			},
			None => Ok(()),
		}
	}

	/// Reacts to a `Retry-After` hint.
	///
	/// Returns the delay to wait before retrying when it is within the threshold; otherwise
	/// starts a cooldown and fails with [`Error::Ratelimited`].
	pub fn observe(&self, retry_after: Duration) -> Result<Duration> {
		if retry_after <= self.max_delay {
			return Ok(retry_after);
		}

		let now = Instant::now();

		*self.until.lock() = Some(now.checked_add(retry_after).unwrap_or(now + FOREVER));

		obs::trace_warn!(
			retry_after_ms = retry_after.as_millis() as u64,
			"Remote service imposed a cooldown; requests fail fast until it expires."
		);

		Err(Error::Ratelimited { retry_after })
	}

	/// Lifts the block early.
	pub fn clear(&self) {
		*self.until.lock() = None;
	}
}
impl Default for Cooldown {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_DELAY)
	}
}

/// Parses a `Retry-After` header given in (fractional) seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
	value.trim().parse::<f64>().ok().and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn long_hints_block_until_expiry() {
		let cooldown = Cooldown::default();

		assert_eq!(cooldown.observe(Duration::from_secs(2)).ok(), Some(Duration::from_secs(2)));
		cooldown.check().expect("Short hints must not block.");

		let err = cooldown.observe(Duration::from_secs(3_600)).expect_err("Long hints must block.");

		assert!(matches!(err, Error::Ratelimited { retry_after } if retry_after == Duration::from_secs(3_600)));

		tokio::time::advance(Duration::from_secs(600)).await;

		match cooldown.check() {
			Err(Error::Ratelimited { retry_after }) =>
				assert_eq!(retry_after, Duration::from_secs(3_000)),
			other => panic!("Expected an active cooldown, got {other:?}."),
		}

		tokio::time::advance(Duration::from_secs(3_000)).await;
		cooldown.check().expect("Expired cooldown should clear itself.");
	}

	#[test]
	fn clear_lifts_the_block() {
		let cooldown = Cooldown::new(Duration::ZERO);

		assert!(cooldown.observe(Duration::from_secs(1)).is_err());
		assert!(cooldown.check().is_err());

		cooldown.clear();
		cooldown.check().expect("Cleared cooldown should not block.");
	}

	#[tokio::test(start_paused = true)]
	async fn unrepresentable_hints_block_without_overflowing() {
		let cooldown = Cooldown::default();
		let hint = parse_retry_after("1e19").expect("Huge hints still parse.");

		assert!(cooldown.observe(hint).is_err());

		tokio::time::advance(Duration::from_secs(3_600)).await;

		assert!(matches!(cooldown.check(), Err(Error::Ratelimited { .. })));
	}

	#[test]
	fn retry_after_accepts_fractional_seconds() {
		assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1_500)));
		assert_eq!(parse_retry_after("3600"), Some(Duration::from_secs(3_600)));
		assert_eq!(parse_retry_after("-1"), None);
		assert_eq!(parse_retry_after("soon"), None);
	}
}
