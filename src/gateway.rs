//! Request gateway: bearer attachment and the refresh-on-401 retry loop.
//!
//! Every outbound call flows through [`Gateway::send`]. Non-exempt requests pick up the stored
//! access token; a 401 on a non-exempt request triggers exactly one single-flight refresh and
//! one replay. A second 401 on the same logical request, or any refresh failure, terminates
//! the session and surfaces [`Error::Unauthorized`].

pub mod ledger;
pub mod refresh;

pub use ledger::{RequestIdentity, RetryLedger};
pub use refresh::{PendingRefresh, RefreshCoordinator, RefreshFailure, RefreshMetrics, RefreshState};

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::GatewayConfig,
	http::{AUTHORIZATION, ApiRequest, ApiResponse, ApiTransport},
	obs::{self, EventLevel, FlowKind},
	session::{SessionEvent, SessionEvents},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Reason attached to terminations caused by a repeated 401.
pub const RETRY_EXHAUSTED: &str = "retry budget exhausted";

/// Gateway specialized for the built-in reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestGateway = Gateway<ReqwestTransport>;

/// Decorates an [`ApiTransport`] with bearer attachment and refresh-on-401.
pub struct Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	store: Arc<dyn CredentialStore>,
	config: GatewayConfig,
	coordinator: RefreshCoordinator,
	ledger: RetryLedger,
	events: Arc<SessionEvents>,
}
impl<T> Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	/// Assembles a gateway over `transport`, persisting credentials in `store`.
	pub fn new(
		config: GatewayConfig,
		store: Arc<dyn CredentialStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			coordinator: RefreshCoordinator::new(config.refresh_timeout),
			config,
			ledger: RetryLedger::default(),
			events: Default::default(),
		}
	}

	/// Validated configuration.
	pub fn config(&self) -> &GatewayConfig {
		&self.config
	}

	/// Credential store shared with the session layer.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Session event hub; forced terminations are published here.
	pub fn events(&self) -> &Arc<SessionEvents> {
		&self.events
	}

	/// Counters describing refresh activity.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Whether a refresh call is currently in flight.
	pub fn refresh_state(&self) -> RefreshState {
		self.coordinator.state()
	}

	/// Number of requests currently holding a retry marker.
	pub fn pending_retries(&self) -> usize {
		self.ledger.len()
	}

	/// Dispatches `request`, attaching credentials and recovering from a single 401.
	///
	/// Transport failures are returned as [`Error::Network`] and leave the session intact.
	/// Non-401 responses, including other error statuses, resolve `Ok` for the caller to
	/// inspect.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		obs::observe(FlowKind::Request, "send", self.dispatch(request)).await
	}

	/// Clears stored credentials and publishes [`SessionEvent::Terminated`].
	pub fn terminate(&self, reason: &str) {
		let _guard = obs::FlowSpan::new(FlowKind::Logout, "terminate").entered();

		if let Err(e) = self.store.clear() {
			obs::flow_event(EventLevel::Warn, FlowKind::Logout, "clear_failed", &e.to_string());
		}

		obs::flow_event(EventLevel::Warn, FlowKind::Logout, "terminated", reason);
		self.events.emit(SessionEvent::Terminated { reason: reason.to_owned() });
	}

	async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let marker = RetryMarker { ledger: &self.ledger, identity: self.ledger.issue(&request) };
		let bypass = self.config.is_exempt(&request.path) || self.config.is_refresh(&request.path);
		let mut used = if bypass || request.has_authorization() {
			None
		} else {
			self.store.access_token()?
		};

		if let Some(token) = &used {
			attach(&mut request, token);
		}

		loop {
			let response = self.transport.send(request.clone()).await?;

			if bypass || !response.is_unauthorized() {
				return Ok(response);
			}
			if !self.ledger.mark(&marker.identity) {
				obs::flow_event(
					EventLevel::Warn,
					FlowKind::Request,
					"retry_exhausted",
					&marker.identity.to_string(),
				);
				self.terminate(RETRY_EXHAUSTED);

				return Err(Error::unauthorized(RETRY_EXHAUSTED));
			}

			match self
				.coordinator
				.resolve(&*self.transport, &*self.store, &self.config, used.as_ref())
				.await
			{
				Ok(token) => {
					attach(&mut request, &token);

					used = Some(token);
				},
				Err(failure) => {
					let reason = failure.to_string();

					self.terminate(&reason);

					return Err(Error::unauthorized(reason));
				},
			}
		}
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("config", &self.config)
			.field("coordinator", &self.coordinator)
			.field("ledger", &self.ledger)
			.field("events", &self.events)
			.finish()
	}
}

// Clears the retry marker however the request chain ends, cancellation included.
struct RetryMarker<'a> {
	ledger: &'a RetryLedger,
	identity: RequestIdentity,
}
impl Drop for RetryMarker<'_> {
	fn drop(&mut self) {
		self.ledger.clear(&self.identity);
	}
}

fn attach(request: &mut ApiRequest, token: &TokenSecret) {
	request.headers.insert(AUTHORIZATION.into(), token.bearer());
}
