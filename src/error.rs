//! Crate-level error types shared by the rate limiters and the webhook receiver.

// self
use crate::{
	_prelude::*,
	ratelimit::{CompositeReleaseError, ReleaseError},
	webhook::PayloadError,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
///
/// Authentication failures on inbound webhooks are deliberately absent: the receiver answers
/// them with a `401` response and never surfaces them to callers or handlers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem detected at setup time.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Inbound webhook body could not be turned into a vote.
	#[error(transparent)]
	Payload(#[from] PayloadError),
	/// A single limiter refused to release.
	#[error(transparent)]
	Release(#[from] ReleaseError),
	/// One or more members of a composite limiter refused to release.
	#[error(transparent)]
	CompositeRelease(#[from] CompositeReleaseError),
	/// The remote service blocked the client; calls fail fast until the block expires.
	#[error("Blocked by the remote service for another {retry_after:?}.")]
	Ratelimited {
		/// Time left until requests may be sent again.
		retry_after: Duration,
	},
	/// Underlying IO failure raised by the webhook transport.
	#[error("I/O error occurred in the webhook transport.")]
	Io(#[from] std::io::Error),
}

/// Configuration and validation failures raised while wiring limiters and receivers.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// Webhook route is empty or not an absolute path.
	#[error("Webhook route `{route}` must be a non-empty path starting with `/`.")]
	InvalidRoute {
		/// Rejected route string.
		route: String,
	},
	/// Neither the route nor the receiver supplies a credential.
	#[error("No credential is configured for webhook route `{route}`.")]
	MissingCredential {
		/// Route being registered.
		route: String,
	},
	/// Neither `start` nor the receiver supplies a port.
	#[error("No port is configured for the webhook server.")]
	MissingPort,
	/// A limiter was configured to admit zero calls.
	#[error("Rate limiter quota must be positive.")]
	NonPositiveQuota,
	/// A limiter was configured with a zero-length or non-finite period.
	#[error("Rate limiter period must be a positive, finite duration.")]
	NonPositivePeriod,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn config_errors_render_route() {
		let err = Error::from(ConfigError::MissingCredential { route: "/votes".into() });

		assert_eq!(err.to_string(), "No credential is configured for webhook route `/votes`.");
	}
}
