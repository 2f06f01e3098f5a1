//! Client-side building blocks for Top.gg integrations: sliding-window rate limiters that pace
//! outgoing API calls, and an authenticated receiver for vote webhooks.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod error;
pub mod obs;
pub mod ratelimit;
pub mod webhook;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		ratelimit::{Ratelimit, ReleaseError},
		webhook::{Vote, VoteHandler, Webhooks},
	};

	/// Shared counter used by tests to assert how often a handler ran.
	pub type CallCounter = Arc<std::sync::atomic::AtomicUsize>;

	/// Credential used by test receivers.
	pub const TEST_CREDENTIAL: &str = "test-credential";

	/// Builds a receiver whose default credential is [`TEST_CREDENTIAL`].
	pub fn test_webhooks() -> Webhooks {
		Webhooks::new(crate::webhook::WebhookConfig::default().with_default_credential(TEST_CREDENTIAL))
	}

	/// Returns a handler that bumps the returned counter once per delivered vote, after yielding
	/// to the runtime so the completion is genuinely deferred.
	pub fn counting_handler() -> (impl VoteHandler, CallCounter) {
		let counter = CallCounter::default();
		let handle = counter.clone();
		let handler = move |_vote: Vote| {
			let handle = handle.clone();

			async move {
				tokio::task::yield_now().await;
				handle.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			}
		};

		(handler, counter)
	}

	/// Limiter whose acquisitions always succeed and whose releases always fail; used to prove
	/// composite releases still reach every other member.
	#[derive(Debug, Default)]
	pub struct FailingRelease {
		/// Number of release attempts observed.
		pub attempts: std::sync::atomic::AtomicUsize,
	}
	impl Ratelimit for FailingRelease {
		fn acquire(&self) -> crate::ratelimit::AcquireFuture<'_> {
			Box::pin(async {})
		}

		fn release(&self) -> Result<(), ReleaseError> {
			self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

			Err(ReleaseError::NotAcquired)
		}

		fn abandon(&self) {}
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use tokio::{sync::Mutex as AsyncMutex, time::Instant};

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "axum")] pub use axum;
pub use url;
#[cfg(test)] use {color_eyre as _, reqwest as _};
