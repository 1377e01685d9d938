//! Single-flight refresh coordination.
//!
//! The coordinator is a two-state machine (`Idle`, `Refreshing`). The first caller that
//! needs a new access token publishes a [`PendingRefresh`] handle synchronously, before the
//! refresh call yields, so every caller arriving afterward observes `Refreshing` and awaits
//! the same handle instead of issuing a second call. The leader persists the new token,
//! returns the coordinator to `Idle`, and then resolves the handle for all waiters. A leader
//! that is dropped mid-flight resolves the handle as [`RefreshFailure::Abandoned`].

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::GatewayConfig,
	http::{ApiRequest, ApiTransport},
	identity::{RefreshRequest, RefreshResponse},
	obs::{self, EventLevel, FlowKind},
	store::CredentialStore,
};

type RefreshOutcome = Result<TokenSecret, RefreshFailure>;

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshState {
	/// No refresh is in flight.
	Idle,
	/// A refresh call is in flight; new callers attach to it.
	Refreshing,
}

/// Reasons a refresh attempt failed. Every variant ends the session.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// No refresh token is stored.
	#[error("No refresh token is available")]
	MissingRefreshToken,
	/// The identity provider rejected the refresh token.
	#[error("Refresh endpoint rejected the refresh token with status {status}")]
	Rejected {
		/// HTTP status returned by the refresh endpoint.
		status: u16,
	},
	/// The refresh call did not finish within the configured timeout.
	#[error("Refresh call timed out")]
	TimedOut,
	/// The transport failed while calling the refresh endpoint.
	#[error("Refresh call failed: {message}")]
	Network {
		/// Transport error summary.
		message: String,
	},
	/// The refresh endpoint answered with an unexpected body.
	#[error("Refresh response is malformed: {message}")]
	Malformed {
		/// Parsing failure summary.
		message: String,
	},
	/// The new token could not be persisted.
	#[error("Refreshed token could not be stored: {message}")]
	Storage {
		/// Storage failure summary.
		message: String,
	},
	/// The leading caller was dropped before the refresh resolved.
	#[error("Refresh was abandoned before completion")]
	Abandoned,
}

/// Shared handle to an in-flight refresh; at most one is alive at any instant.
#[derive(Clone)]
pub struct PendingRefresh(Arc<AsyncMutex<Option<RefreshOutcome>>>);
impl PendingRefresh {
	/// Waits for the leader to resolve the handle.
	pub async fn wait(&self) -> RefreshOutcome {
		self.0.lock().await.clone().unwrap_or(Err(RefreshFailure::Abandoned))
	}

	fn is(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}
impl Debug for PendingRefresh {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PendingRefresh(..)")
	}
}

/// Serializes concurrent refresh attempts behind one [`PendingRefresh`].
#[derive(Debug)]
pub struct RefreshCoordinator {
	pending: Mutex<Option<PendingRefresh>>,
	timeout: std::time::Duration,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	const FALLBACK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

	/// Creates an idle coordinator bounded by `timeout` per refresh call.
	pub fn new(timeout: Duration) -> Self {
		Self {
			pending: Mutex::new(None),
			timeout: std::time::Duration::try_from(timeout).unwrap_or(Self::FALLBACK_TIMEOUT),
			metrics: Default::default(),
		}
	}

	/// Current state of the machine.
	pub fn state(&self) -> RefreshState {
		if self.pending.lock().is_some() { RefreshState::Refreshing } else { RefreshState::Idle }
	}

	/// Shared refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Resolves a fresh access token for a caller whose request was rejected with `stale`.
	///
	/// When the stored token already differs from `stale`, another caller refreshed in the
	/// meantime and the stored token is returned without a new refresh call. Otherwise the
	/// caller either leads a new refresh or waits on the one in flight.
	pub async fn resolve<T>(
		&self,
		transport: &T,
		store: &dyn CredentialStore,
		config: &GatewayConfig,
		stale: Option<&TokenSecret>,
	) -> RefreshOutcome
	where
		T: ?Sized + ApiTransport,
	{
		if let Some(stale) = stale {
			match store.access_token() {
				Ok(Some(current)) if &current != stale && self.state() == RefreshState::Idle => {
					self.metrics.record_reused();

					return Ok(current);
				},
				Ok(_) => {},
				Err(e) => return Err(RefreshFailure::Storage { message: e.to_string() }),
			}
		}

		match self.join_or_start() {
			Role::Waiter(pending) => {
				obs::flow_event(EventLevel::Debug, FlowKind::Refresh, "joined", "");

				pending.wait().await
			},
			Role::Leader(leader) => {
				let outcome = obs::FlowSpan::new(FlowKind::Refresh, "refresh")
					.instrument(self.run(transport, store, config))
					.await;

				leader.finish(outcome)
			},
		}
	}

	fn join_or_start(&self) -> Role<'_> {
		let mut pending = self.pending.lock();

		if let Some(existing) = pending.as_ref() {
			self.metrics.record_joined();

			return Role::Waiter(existing.clone());
		}

		let handle = PendingRefresh(Arc::new(AsyncMutex::new(None)));
		let Some(slot) = handle.0.try_lock_arc() else {
			return Role::Waiter(handle);
		};

		*pending = Some(handle.clone());

		Role::Leader(Leader { coordinator: self, handle, slot: Some(slot) })
	}

	fn release(&self, handle: &PendingRefresh) {
		let mut pending = self.pending.lock();

		if pending.as_ref().is_some_and(|current| current.is(handle)) {
			*pending = None;
		}
	}

	async fn run<T>(
		&self,
		transport: &T,
		store: &dyn CredentialStore,
		config: &GatewayConfig,
	) -> RefreshOutcome
	where
		T: ?Sized + ApiTransport,
	{
		self.metrics.record_attempt();
		obs::record_flow_outcome(FlowKind::Refresh, obs::FlowOutcome::Attempt);

		let outcome = tokio::time::timeout(self.timeout, call_refresh(transport, store, config))
			.await
			.unwrap_or(Err(RefreshFailure::TimedOut));

		obs::record_flow_result(FlowKind::Refresh, &outcome);

		match &outcome {
			Ok(_) => self.metrics.record_success(),
			Err(failure) => {
				self.metrics.record_failure();
				obs::flow_event(
					EventLevel::Warn,
					FlowKind::Refresh,
					"failed",
					&failure.to_string(),
				);
			},
		}

		outcome
	}
}

enum Role<'a> {
	Leader(Leader<'a>),
	Waiter(PendingRefresh),
}

struct Leader<'a> {
	coordinator: &'a RefreshCoordinator,
	handle: PendingRefresh,
	slot: Option<MutexGuardArc<Option<RefreshOutcome>>>,
}
impl Leader<'_> {
	fn finish(mut self, outcome: RefreshOutcome) -> RefreshOutcome {
		self.coordinator.release(&self.handle);

		if let Some(mut slot) = self.slot.take() {
			*slot = Some(outcome.clone());
		}

		outcome
	}
}
impl Drop for Leader<'_> {
	fn drop(&mut self) {
		self.coordinator.release(&self.handle);
	}
}

async fn call_refresh<T>(
	transport: &T,
	store: &dyn CredentialStore,
	config: &GatewayConfig,
) -> RefreshOutcome
where
	T: ?Sized + ApiTransport,
{
	let refresh_token = store
		.refresh_token()
		.map_err(|e| RefreshFailure::Storage { message: e.to_string() })?
		.ok_or(RefreshFailure::MissingRefreshToken)?;
	let request = ApiRequest::post(config.endpoints.refresh.as_str())
		.with_json(&RefreshRequest { refresh_token: refresh_token.expose() })
		.map_err(|e| RefreshFailure::Malformed { message: e.to_string() })?;
	let response = transport
		.send(request)
		.await
		.map_err(|e| RefreshFailure::Network { message: e.to_string() })?;

	if !response.is_success() {
		return Err(RefreshFailure::Rejected { status: response.status });
	}

	let refreshed: RefreshResponse =
		response.json().map_err(|e| RefreshFailure::Malformed { message: e.to_string() })?;

	store
		.rotate(&refreshed.access_token, refreshed.refresh_token.as_ref())
		.map_err(|e| RefreshFailure::Storage { message: e.to_string() })?;

	Ok(refreshed.access_token)
}
