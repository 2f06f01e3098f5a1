//! axum-backed HTTP transport for [`Webhooks`].

// std
use std::net::SocketAddr;
// crates.io
use axum::{
	Router,
	body::Bytes,
	extract::State,
	http::{HeaderMap, Method, StatusCode, Uri},
	response::{IntoResponse, Response},
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	webhook::{AUTHORIZATION_HEADER, RouteTable, WebhookResponse, Webhooks},
};

pub(super) struct ServerSlot {
	// Serializes start/close.
	lifecycle: AsyncMutex<Option<RunningServer>>,
	bound: Mutex<Option<SocketAddr>>,
	// Reachable without the lifecycle lock, so a dropped `serve_with` can always stop the server.
	// Dropping the sender also triggers the graceful shutdown.
	stop: watch::Sender<bool>,
}
impl ServerSlot {
	fn signal_stop(&self) {
		self.stop.send_replace(true);
	}
}
impl Default for ServerSlot {
	fn default() -> Self {
		Self { lifecycle: Default::default(), bound: Default::default(), stop: watch::Sender::new(false) }
	}
}

struct RunningServer {
	task: JoinHandle<std::io::Result<()>>,
}

impl Webhooks {
	/// Router that serves every registered route via `POST`.
	///
	/// Useful for mounting the receiver inside an existing axum application instead of calling
	/// [`start`](Self::start).
	pub fn router(&self) -> Router {
		Router::new().fallback(handle).with_state(self.routes.clone())
	}

	/// Whether the server is currently serving.
	pub fn running(&self) -> bool {
		self.server.bound.lock().is_some()
	}

	/// Address the running server is bound to.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		*self.server.bound.lock()
	}

	/// Binds the configured address and starts serving; a no-op when already running.
	///
	/// `port` overrides [`WebhookConfig::default_port`](crate::webhook::WebhookConfig); port `0`
	/// picks an ephemeral port, see [`local_addr`](Self::local_addr).
	pub async fn start(&self, port: Option<u16>) -> Result<()> {
		const KIND: OpKind = OpKind::WebhookLifecycle;

		let mut slot = self.server.lifecycle.lock().await;

		if slot.is_some() {
			return Ok(());
		}

		let port = port.or(self.config.default_port).ok_or(ConfigError::MissingPort)?;
		let span = OpSpan::new(KIND, "start");

		obs::record_outcome(KIND, OpOutcome::Attempt);

		let listener = span
			.instrument(TcpListener::bind(SocketAddr::new(self.config.bind_ip, port)))
			.await
			.inspect_err(|_| obs::record_outcome(KIND, OpOutcome::Failure))?;
		let local_addr = listener.local_addr()?;
		self.server.stop.send_replace(false);

		let mut stop = self.server.stop.subscribe();
		let serve = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
			let _ = stop.wait_for(|stop| *stop).await;
		});
		let task = tokio::spawn(async move { serve.await });

		*slot = Some(RunningServer { task });
		*self.server.bound.lock() = Some(local_addr);

		obs::record_outcome(KIND, OpOutcome::Success);
		obs::trace_info!(addr = %local_addr, "Vote webhook server started.");

		Ok(())
	}

	/// Stops serving and waits for open connections to finish; a no-op when not running.
	pub async fn close(&self) -> Result<()> {
		let mut slot = self.server.lifecycle.lock().await;
		let Some(running) = slot.take() else {
			return Ok(());
		};
		self.server.signal_stop();

		let outcome = running.task.await;

		// The task is gone either way, so the server no longer counts as running.
		*self.server.bound.lock() = None;

		obs::trace_info!("Vote webhook server stopped.");

		match outcome {
			Ok(served) => served.map_err(Error::from),
			Err(join) => Err(std::io::Error::other(join).into()),
		}
	}

	/// Runs `action` with the server started, closing it afterwards.
	///
	/// The server is closed on every exit path: after `action` completes (whatever it returns),
	/// and also when this future is dropped or `action` panics, in which case shutdown is signaled
	/// without waiting for open connections.
	pub async fn serve_with<F>(&self, port: Option<u16>, action: F) -> Result<F::Output>
	where
		F: Future,
	{
		self.start(port).await?;

		let guard = StopOnDrop { webhooks: self, armed: true };
		let output = action.await;

		guard.disarm();
		self.close().await?;

		Ok(output)
	}
}

struct StopOnDrop<'a> {
	webhooks: &'a Webhooks,
	armed: bool,
}
impl StopOnDrop<'_> {
	fn disarm(mut self) {
		self.armed = false;
	}
}
impl Drop for StopOnDrop<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let slot = &self.webhooks.server;

		slot.signal_stop();

		// Only contended while another task is starting or closing the server. The signal above
		// already stops it; the holder of the lock finishes the bookkeeping.
		let Ok(mut lifecycle) = slot.lifecycle.try_lock() else {
			obs::trace_warn!("Server lifecycle is busy; left shutdown bookkeeping to its holder.");

			return;
		};

		if lifecycle.take().is_some() {
			*slot.bound.lock() = None;
		}
	}
}

impl IntoResponse for WebhookResponse {
	fn into_response(self) -> Response {
		let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		(status, self.body).into_response()
	}
}

async fn handle(
	State(routes): State<RouteTable>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let path = uri.path();

	if method != Method::POST {
		let response = if routes.contains(path) {
			WebhookResponse::method_not_allowed()
		} else {
			WebhookResponse::not_found()
		};

		return response.into_response();
	}

	let authorization = headers.get(AUTHORIZATION_HEADER).and_then(|value| value.to_str().ok());

	match routes.dispatch(path, authorization, &body).await {
		Ok(response) => response.into_response(),
		Err(e) => {
			obs::trace_warn!(route = path, error = %e, "Vote delivery failed.");

			let _ = e;

			(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
		},
	}
}
