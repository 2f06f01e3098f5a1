//! Published Top.gg API limits, wired as ready-to-use limiters.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	ratelimit::{CompositeLimiter, LimiterConfig, Ratelimit, SlidingWindowLimiter},
};

/// Path prefix of the endpoints covered by the stricter bot quota.
pub const BOT_PATH_PREFIX: &str = "/bots";

/// Limiter set covering the API's global quota and its bot-endpoint quota.
#[derive(Clone, Debug)]
pub struct EndpointRatelimits {
	/// Applies to every request.
	pub global: SlidingWindowLimiter,
	/// Applies to requests under [`BOT_PATH_PREFIX`].
	pub bot: SlidingWindowLimiter,
	bots: CompositeLimiter,
}
impl EndpointRatelimits {
	/// Global quota: 99 calls per second.
	pub fn global_config() -> LimiterConfig {
		LimiterConfig::new(99)
	}

	/// Bot-endpoint quota: 59 calls per minute.
	pub fn bot_config() -> LimiterConfig {
		LimiterConfig::new(59).with_period(Duration::from_secs(60))
	}

	/// Builds the limiter set with the service's published quotas.
	pub fn new() -> Result<Self, ConfigError> {
		Self::with_configs(&Self::global_config(), &Self::bot_config())
	}

	/// Builds the limiter set with custom quotas.
	pub fn with_configs(global: &LimiterConfig, bot: &LimiterConfig) -> Result<Self, ConfigError> {
		let global = SlidingWindowLimiter::from_config(global)?;
		let bot = SlidingWindowLimiter::from_config(bot)?;
		// Global first, in every composite that shares it.
		let bots = CompositeLimiter::from_windows([&global, &bot]);

		Ok(Self { global, bot, bots })
	}

	/// Selects the limiter guarding a request to `path`.
	pub fn for_path(&self, path: &str) -> &dyn Ratelimit {
		if path.starts_with(BOT_PATH_PREFIX) { &self.bots } else { &self.global }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::ratelimit::scoped;

	#[tokio::test(start_paused = true)]
	async fn bot_paths_hit_both_quotas() {
		let limits = EndpointRatelimits::new().expect("Published quotas should be valid.");

		scoped(limits.for_path("/bots/264811613708746752/stats"), async {})
			.await
			.expect("Scoped call should release cleanly.");
		scoped(limits.for_path("/users/1/bots"), async {})
			.await
			.expect("Scoped call should release cleanly.");

		assert_eq!(limits.global.recorded_calls(), 2);
		assert_eq!(limits.bot.recorded_calls(), 1);
	}

	#[test]
	fn published_quotas() {
		let limits = EndpointRatelimits::new().expect("Published quotas should be valid.");

		assert_eq!((limits.global.max_calls(), limits.global.period()), (99, Duration::from_secs(1)));
		assert_eq!((limits.bot.max_calls(), limits.bot.period()), (59, Duration::from_secs(60)));
	}
}
