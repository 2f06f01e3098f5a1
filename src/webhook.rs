//! Authenticated receiver for Top.gg vote webhooks.
//!
//! Handlers are registered per route with [`Webhooks::register`]. Each delivery is checked
//! against the route's credential, decoded into a [`Vote`], and handed to the handler; the
//! receiver answers only after the handler's future completes. [`Webhooks::dispatch`] is the
//! transport-agnostic entry point, and the `axum` feature adds a ready-made HTTP server on top of
//! it ([`Webhooks::start`], [`Webhooks::close`]).

pub mod vote;

#[cfg(feature = "axum")] mod server;

pub use vote::*;

// std
use std::net::{IpAddr, Ipv4Addr};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Request header that carries the route credential, compared verbatim.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Boxed future returned by [`VoteHandler::on_vote`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Callback invoked for every authenticated vote.
///
/// Any `Fn(Vote) -> impl Future<Output = ()>` closure is a handler; wrap plain closures with
/// [`sync_handler`].
pub trait VoteHandler
where
	Self: 'static + Send + Sync,
{
	/// Handles one vote; the delivery is acknowledged once the returned future completes.
	fn on_vote(&self, vote: Vote) -> HandlerFuture<'_>;
}
impl<F, Fut> VoteHandler for F
where
	F: 'static + Send + Sync + Fn(Vote) -> Fut,
	Fut: 'static + Send + Future<Output = ()>,
{
	fn on_vote(&self, vote: Vote) -> HandlerFuture<'_> {
		Box::pin(self(vote))
	}
}

/// Adapter that runs a synchronous closure as a [`VoteHandler`].
#[derive(Clone, Debug)]
pub struct SyncHandler<F>(F);
impl<F> VoteHandler for SyncHandler<F>
where
	F: 'static + Send + Sync + Fn(Vote),
{
	fn on_vote(&self, vote: Vote) -> HandlerFuture<'_> {
		(self.0)(vote);

		Box::pin(std::future::ready(()))
	}
}

/// Wraps a synchronous closure so it can be registered as a handler.
pub fn sync_handler<F>(f: F) -> SyncHandler<F>
where
	F: 'static + Send + Sync + Fn(Vote),
{
	SyncHandler(f)
}

/// Receiver-wide settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
	/// Credential used by routes registered without their own.
	#[serde(default)]
	pub default_credential: Option<String>,
	/// Port used when [`Webhooks::start`] is called without one.
	#[serde(default)]
	pub default_port: Option<u16>,
	/// Address the server binds to.
	#[serde(default = "default_bind_ip")]
	pub bind_ip: IpAddr,
}
impl WebhookConfig {
	/// Sets the fallback credential.
	pub fn with_default_credential(mut self, credential: impl Into<String>) -> Self {
		self.default_credential = Some(credential.into());

		self
	}

	/// Sets the fallback port.
	pub fn with_default_port(mut self, port: u16) -> Self {
		self.default_port = Some(port);

		self
	}

	/// Sets the bind address.
	pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
		self.bind_ip = ip;

		self
	}
}
impl Default for WebhookConfig {
	fn default() -> Self {
		Self { default_credential: None, default_port: None, bind_ip: default_bind_ip() }
	}
}

/// Fixed response produced for a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WebhookResponse {
	/// HTTP status code.
	pub status: u16,
	/// Plain-text body.
	pub body: &'static str,
}
impl WebhookResponse {
	/// The handler ran to completion.
	pub const fn ok() -> Self {
		Self { status: 200, body: "OK" }
	}

	/// The credential did not match.
	pub const fn unauthorized() -> Self {
		Self { status: 401, body: "Unauthorized" }
	}

	/// No handler is registered for the route.
	pub const fn not_found() -> Self {
		Self { status: 404, body: "Not Found" }
	}

	/// The route exists but only accepts `POST`.
	pub const fn method_not_allowed() -> Self {
		Self { status: 405, body: "Method Not Allowed" }
	}
}

/// Registers vote handlers and dispatches deliveries to them.
pub struct Webhooks {
	config: WebhookConfig,
	routes: RouteTable,
	#[cfg(feature = "axum")]
	server: server::ServerSlot,
}
impl Webhooks {
	/// Creates a receiver with no routes.
	pub fn new(config: WebhookConfig) -> Self {
		Self {
			config,
			routes: RouteTable::default(),
			#[cfg(feature = "axum")]
			server: Default::default(),
		}
	}

	/// Receiver-wide settings.
	pub fn config(&self) -> &WebhookConfig {
		&self.config
	}

	/// Binds `handler` to `route`, replacing any previous binding.
	///
	/// The route's credential is `credential` when given and non-empty, else the receiver's
	/// default credential. Routes can be added while the server is running.
	pub fn register(
		&self,
		route: impl Into<String>,
		handler: impl VoteHandler,
		credential: Option<&str>,
	) -> Result<()> {
		let route = route.into();

		if !route.starts_with('/') {
			return Err(ConfigError::InvalidRoute { route }.into());
		}

		let Some(credential) = credential
			.filter(|c| !c.is_empty())
			.or(self.config.default_credential.as_deref().filter(|c| !c.is_empty()))
			.map(str::to_owned)
		else {
			return Err(ConfigError::MissingCredential { route }.into());
		};

		obs::trace_info!(route = %route, "Registered vote webhook route.");

		self.routes.insert(route, Route { credential, handler: Arc::new(handler) });

		Ok(())
	}

	/// Registered routes, sorted.
	pub fn routes(&self) -> Vec<String> {
		self.routes.paths()
	}

	/// Authenticates and dispatches one delivery.
	///
	/// Returns `401` without decoding the body when `authorization` does not match the route's
	/// credential and `404` for unknown routes. Body decoding failures are returned as
	/// [`Error::Payload`] so the transport can surface them as server errors.
	pub async fn dispatch(
		&self,
		route: &str,
		authorization: Option<&str>,
		body: &[u8],
	) -> Result<WebhookResponse> {
		self.routes.dispatch(route, authorization, body).await
	}
}
impl Debug for Webhooks {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut debug = f.debug_struct("Webhooks");

		debug.field("routes", &self.routes.paths());
		#[cfg(feature = "axum")]
		debug.field("running", &self.running());

		debug.finish()
	}
}

#[derive(Clone)]
struct Route {
	credential: String,
	handler: Arc<dyn VoteHandler>,
}

// Shared with the HTTP transport so routes registered after `start` are served too.
#[derive(Clone, Default)]
struct RouteTable(Arc<RwLock<HashMap<String, Route>>>);
impl RouteTable {
	fn insert(&self, path: String, route: Route) {
		self.0.write().insert(path, route);
	}

	#[cfg(feature = "axum")]
	fn contains(&self, path: &str) -> bool {
		self.0.read().contains_key(path)
	}

	fn paths(&self) -> Vec<String> {
		let mut paths = self.0.read().keys().cloned().collect::<Vec<_>>();

		paths.sort();

		paths
	}

	async fn dispatch(
		&self,
		path: &str,
		authorization: Option<&str>,
		body: &[u8],
	) -> Result<WebhookResponse> {
		const KIND: OpKind = OpKind::WebhookDispatch;

		let span = OpSpan::new(KIND, "dispatch");

		obs::record_outcome(KIND, OpOutcome::Attempt);

		span.instrument(async move {
			let route = self.0.read().get(path).cloned();
			let Some(route) = route else {
				obs::record_outcome(KIND, OpOutcome::Rejected);

				return Ok(WebhookResponse::not_found());
			};

			if authorization != Some(route.credential.as_str()) {
				obs::record_outcome(KIND, OpOutcome::Rejected);
				obs::trace_warn!(route = path, "Rejected vote delivery with a mismatched credential.");

				return Ok(WebhookResponse::unauthorized());
			}

			let vote = Vote::from_slice(body).inspect_err(|_| {
				obs::record_outcome(KIND, OpOutcome::Failure);
			})?;

			obs::trace_debug!(route = path, vote = %vote, "Dispatching vote.");
			route.handler.on_vote(vote).await;
			obs::record_outcome(KIND, OpOutcome::Success);

			Ok(WebhookResponse::ok())
		})
		.await
	}
}

fn default_bind_ip() -> IpAddr {
	IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::_preludet::{TEST_CREDENTIAL, counting_handler, test_webhooks};

	const BODY: &[u8] = br#"{"bot":"123","user":"456","type":"test"}"#;

	#[test]
	fn register_resolves_credentials() {
		let webhooks = Webhooks::new(WebhookConfig::default());
		let err = webhooks
			.register("/votes", sync_handler(|_| {}), None)
			.expect_err("Registering without any credential must fail.");

		assert!(matches!(err, Error::Config(ConfigError::MissingCredential { .. })));
		assert!(matches!(
			webhooks.register("/votes", sync_handler(|_| {}), Some("")),
			Err(Error::Config(ConfigError::MissingCredential { .. }))
		));
		assert!(matches!(
			webhooks.register("votes", sync_handler(|_| {}), Some("secret")),
			Err(Error::Config(ConfigError::InvalidRoute { .. }))
		));

		webhooks
			.register("/votes", sync_handler(|_| {}), Some("secret"))
			.expect("Per-route credential should be accepted.");

		assert_eq!(webhooks.routes(), vec!["/votes".to_string()]);
	}

	#[test]
	fn config_deserializes_with_defaults() {
		let config: WebhookConfig = serde_json::from_str(r#"{"default_port":5000}"#)
			.expect("Webhook config should deserialize.");

		assert_eq!(config, WebhookConfig::default().with_default_port(5000));
		assert_eq!(config.bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
	}

	#[tokio::test]
	async fn wrong_credential_is_rejected_before_dispatch() {
		let webhooks = test_webhooks();
		let (handler, calls) = counting_handler();

		webhooks.register("/votes", handler, None).expect("Route should register.");

		for auth in [None, Some("wrong"), Some("test-credential ")] {
			let response = webhooks
				.dispatch("/votes", auth, b"not even json")
				.await
				.expect("Rejected deliveries should still produce a response.");

			assert_eq!(response, WebhookResponse::unauthorized());
		}

		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn valid_delivery_runs_deferred_handler_once() {
		let webhooks = test_webhooks();
		let (handler, calls) = counting_handler();

		webhooks.register("/votes", handler, None).expect("Route should register.");

		let response = webhooks
			.dispatch("/votes", Some(TEST_CREDENTIAL), BODY)
			.await
			.expect("Valid delivery should dispatch.");

		assert_eq!(response, WebhookResponse::ok());
		assert_eq!(response.body, "OK");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn malformed_body_propagates() {
		let webhooks = test_webhooks();
		let (handler, calls) = counting_handler();

		webhooks.register("/votes", handler, None).expect("Route should register.");

		let err = webhooks
			.dispatch("/votes", Some(TEST_CREDENTIAL), br#"{"user":"1","type":"test"}"#)
			.await
			.expect_err("Payload without a receiver must fail.");

		assert!(matches!(err, Error::Payload(PayloadError::MissingReceiver)));
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn last_registration_wins() {
		let webhooks = test_webhooks();
		let first = Arc::new(AtomicUsize::new(0));
		let second = Arc::new(AtomicUsize::new(0));
		let first_handle = first.clone();
		let second_handle = second.clone();

		webhooks
			.register(
				"/votes",
				sync_handler(move |_| {
					first_handle.fetch_add(1, Ordering::SeqCst);
				}),
				None,
			)
			.expect("Route should register.");
		webhooks
			.register(
				"/votes",
				sync_handler(move |_| {
					second_handle.fetch_add(1, Ordering::SeqCst);
				}),
				Some("override"),
			)
			.expect("Route should re-register.");

		assert_eq!(
			webhooks.dispatch("/votes", Some(TEST_CREDENTIAL), BODY).await.ok(),
			Some(WebhookResponse::unauthorized())
		);
		assert_eq!(
			webhooks.dispatch("/votes", Some("override"), BODY).await.ok(),
			Some(WebhookResponse::ok())
		);
		assert_eq!((first.load(Ordering::SeqCst), second.load(Ordering::SeqCst)), (0, 1));
	}

	#[tokio::test]
	async fn unknown_route_is_not_found() {
		let webhooks = test_webhooks();

		assert_eq!(
			webhooks.dispatch("/missing", Some(TEST_CREDENTIAL), BODY).await.ok(),
			Some(WebhookResponse::not_found())
		);
	}
}
