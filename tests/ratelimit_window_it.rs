// std
use std::{sync::Arc, time::Duration};
// crates.io
use parking_lot::Mutex;
use tokio::time::Instant;
// self
use topgg_core::ratelimit::{CompositeLimiter, EndpointRatelimits, SlidingWindowLimiter, scoped};

// Largest number of admissions that fall inside any half-open window `[t, t + period)`.
fn busiest_window(admissions: &[Instant], period: Duration) -> usize {
	admissions
		.iter()
		.map(|start| admissions.iter().filter(|t| **t >= *start && **t - *start < period).count())
		.max()
		.unwrap_or(0)
}

#[tokio::test(start_paused = true)]
async fn sequential_callers_never_exceed_quota() {
	let period = Duration::from_secs(2);
	let limiter = SlidingWindowLimiter::new(5, period).expect("Limiter fixture should be valid.");
	let start = Instant::now();
	let mut admissions = Vec::new();

	for _ in 0..23 {
		scoped(&limiter, async { admissions.push(Instant::now()) })
			.await
			.expect("Scoped call should release cleanly.");
	}

	assert_eq!(busiest_window(&admissions, period), 5);
	// 23 calls in bursts of five need four full windows of waiting.
	assert_eq!(Instant::now().duration_since(start), period * 4);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_with_slow_actions_never_exceed_quota() {
	let period = Duration::from_secs(1);
	let limiter = SlidingWindowLimiter::new(3, period).expect("Limiter fixture should be valid.");
	let admissions = Arc::new(Mutex::new(Vec::new()));
	let mut tasks = Vec::new();

	for i in 0..12_u64 {
		let limiter = limiter.clone();
		let admissions = admissions.clone();

		tasks.push(tokio::spawn(async move {
			scoped(&limiter, async {
				admissions.lock().push(Instant::now());
				tokio::time::sleep(Duration::from_millis(50 * (i % 4))).await;
			})
			.await
			.expect("Scoped call should release cleanly.");
		}));
	}
	for task in tasks {
		task.await.expect("Limiter task should not panic.");
	}

	let admissions = admissions.lock().clone();

	assert_eq!(admissions.len(), 12);
	assert!(busiest_window(&admissions, period) <= 3);
	assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn composite_obeys_every_member_quota() {
	let global = SlidingWindowLimiter::new(4, Duration::from_secs(1))
		.expect("Global limiter fixture should be valid.");
	let endpoint = SlidingWindowLimiter::new(2, Duration::from_secs(3))
		.expect("Endpoint limiter fixture should be valid.");
	let composite = CompositeLimiter::from_windows([&global, &endpoint]);
	let mut admissions = Vec::new();

	for _ in 0..6 {
		scoped(&composite, async { admissions.push(Instant::now()) })
			.await
			.expect("Composite scope should release cleanly.");
	}

	assert!(busiest_window(&admissions, Duration::from_secs(3)) <= 2);
	assert_eq!(global.in_flight() + endpoint.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn endpoint_presets_route_by_path() {
	let limits = EndpointRatelimits::new().expect("Published quotas should be valid.");

	for _ in 0..3 {
		scoped(limits.for_path("/bots/1/stats"), async {})
			.await
			.expect("Bot endpoint call should release cleanly.");
	}

	scoped(limits.for_path("/users/2"), async {}).await.expect("Global call should release cleanly.");

	assert_eq!(limits.global.recorded_calls(), 4);
	assert_eq!(limits.bot.recorded_calls(), 3);
}
