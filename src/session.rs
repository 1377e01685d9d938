//! Session store: the cached identity, its status, and the login/logout/refresh-identity
//! operations.
//!
//! Every state-changing operation runs under a generation counter. Starting a login or
//! restore, logging out, forced termination, and every published result bump it; a fetch that
//! resolves after the generation moved on is discarded with [`Error::Superseded`] instead of
//! overwriting fresher state. An identity re-fetch also yields to a login still in flight.

pub mod cache;
pub mod events;

pub use cache::*;
pub use events::*;

// std
use std::sync::Weak;
// self
use crate::{
	_prelude::*,
	access::{self, GuardRule},
	auth::AuthUser,
	gateway::Gateway,
	http::ApiTransport,
	identity::{IdentityClient, LoginRequest, RegisterRequest},
	obs::{self, EventLevel, FlowKind},
};

/// Authentication status of the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
	/// No identity is established.
	#[default]
	Unauthenticated,
	/// A login or restore is in flight.
	Loading,
	/// An identity has been fetched and published.
	Authenticated,
}

/// Snapshot of the session published by [`SessionStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
	/// Current identity; `None` unless authenticated (or loading after a previous login).
	pub user: Option<Arc<AuthUser>>,
	/// Current status.
	pub status: SessionStatus,
	/// When this snapshot was published.
	pub since: OffsetDateTime,
}
impl Session {
	fn unauthenticated() -> Self {
		Self {
			user: None,
			status: SessionStatus::Unauthenticated,
			since: OffsetDateTime::now_utc(),
		}
	}

	fn authenticated(user: Arc<AuthUser>) -> Self {
		Self {
			user: Some(user),
			status: SessionStatus::Authenticated,
			since: OffsetDateTime::now_utc(),
		}
	}

	/// Returns `true` when the status is [`SessionStatus::Authenticated`].
	pub fn is_authenticated(&self) -> bool {
		self.status == SessionStatus::Authenticated
	}
}
impl Default for Session {
	fn default() -> Self {
		Self::unauthenticated()
	}
}

/// Caches the authenticated identity and drives the session lifecycle through the gateway.
pub struct SessionStore<T>
where
	T: ?Sized + ApiTransport,
{
	gateway: Arc<Gateway<T>>,
	identity: IdentityClient<T>,
	shared: Arc<Shared>,
	subscription: SubscriptionId,
}
impl<T> SessionStore<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an unauthenticated store bound to `gateway`.
	///
	/// The store listens for [`SessionEvent::Terminated`] on the gateway's event hub and
	/// drops the session when the gateway forces a logout.
	pub fn new(gateway: Arc<Gateway<T>>) -> Self {
		let shared = Arc::new(Shared::default());
		let weak = Arc::downgrade(&shared);
		let subscription = gateway.events().subscribe(move |event| {
			if matches!(event, SessionEvent::Terminated { .. }) {
				terminated(&weak);
			}
		});

		Self { identity: IdentityClient::new(gateway.clone()), gateway, shared, subscription }
	}

	/// Gateway the store dispatches through.
	pub fn gateway(&self) -> &Arc<Gateway<T>> {
		&self.gateway
	}

	/// Event hub shared with the gateway.
	pub fn events(&self) -> &Arc<SessionEvents> {
		self.gateway.events()
	}

	/// Keyed identity cache.
	pub fn cache(&self) -> &IdentityCache {
		&self.shared.cache
	}

	/// Current session snapshot.
	pub fn session(&self) -> Session {
		self.shared.state.read().session.clone()
	}

	/// Current status.
	pub fn status(&self) -> SessionStatus {
		self.shared.state.read().session.status
	}

	/// Current identity, if authenticated.
	pub fn current_user(&self) -> Option<Arc<AuthUser>> {
		self.shared.state.read().session.user.clone()
	}

	/// Evaluates `rule` against the current identity.
	pub fn can_access(&self, rule: &GuardRule) -> bool {
		access::can_access_shared(self.current_user().as_ref(), rule)
	}

	/// Resolves the landing path for the current identity.
	pub fn fallback<'a, I>(&self, rules: I, default_path: &str) -> String
	where
		I: IntoIterator<Item = &'a GuardRule>,
	{
		let user = self.current_user();

		access::resolve_fallback(user.as_deref(), rules, default_path)
	}

	/// Exchanges credentials, persists the tokens, fetches the identity, and publishes an
	/// authenticated session.
	///
	/// Any login or identity fetch already in flight is superseded. When the identity call
	/// yields no user the login fails with [`Error::IdentityFetch`]; on every failure after
	/// the exchange the freshly persisted credentials are removed again.
	pub async fn login(&self, request: &LoginRequest) -> Result<Arc<AuthUser>> {
		obs::observe(FlowKind::Login, "login", self.run_login(request)).await
	}

	/// Clears persisted tokens and publishes an unauthenticated session. Idempotent.
	pub fn logout(&self) -> Result<()> {
		let _guard = obs::FlowSpan::new(FlowKind::Logout, "logout").entered();

		self.gateway.store().clear()?;
		self.shared.reset();
		self.gateway.events().emit(SessionEvent::LoggedOut);

		Ok(())
	}

	/// Re-fetches the identity without touching tokens.
	///
	/// A `None` result publishes an unauthenticated session.
	pub async fn refresh_identity(&self) -> Result<Option<Arc<AuthUser>>> {
		obs::observe(FlowKind::Identity, "refresh_identity", self.run_refresh_identity()).await
	}

	/// Rebuilds the session from persisted credentials, typically after a process restart.
	///
	/// Resolves `Ok(None)` without any network call when no credentials are stored.
	pub async fn restore(&self) -> Result<Option<Arc<AuthUser>>> {
		obs::observe(FlowKind::Identity, "restore", self.run_restore()).await
	}

	/// Registers an account and invalidates the cached identity. No session is established.
	pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
		obs::observe(FlowKind::Register, "register", async {
			self.identity.register(request).await?;
			self.shared.cache.invalidate(CURRENT_USER);

			Ok(())
		})
		.await
	}

	async fn run_login(&self, request: &LoginRequest) -> Result<Arc<AuthUser>> {
		let (generation, previous) = self.shared.begin_loading();
		let credentials = match self.identity.login(request).await {
			Ok(credentials) => credentials,
			Err(e) => {
				self.shared.restore_if_current(generation, previous);

				return Err(e);
			},
		};

		if !self.shared.is_current(generation) {
			return Err(self.superseded(FlowKind::Login));
		}
		if let Err(e) = self.gateway.store().persist(&credentials) {
			self.shared.restore_if_current(generation, previous);

			return Err(e.into());
		}

		let user = match self.identity.me().await {
			Ok(Some(user)) => Arc::new(user),
			Ok(None) => {
				self.roll_back(generation);

				return Err(Error::IdentityFetch);
			},
			Err(e) => {
				self.roll_back(generation);

				return Err(e);
			},
		};

		if !self.shared.publish(generation, Session::authenticated(user.clone())) {
			return Err(self.superseded(FlowKind::Login));
		}

		self.gateway.events().emit(SessionEvent::LoggedIn { user: user.clone() });

		Ok(user)
	}

	async fn run_refresh_identity(&self) -> Result<Option<Arc<AuthUser>>> {
		let generation = self.shared.generation();
		let user = self.identity.me().await?.map(Arc::new);
		let session = match &user {
			Some(user) => Session::authenticated(user.clone()),
			None => Session::unauthenticated(),
		};

		if !self.shared.publish_refreshed(generation, session) {
			return Err(self.superseded(FlowKind::Identity));
		}

		self.gateway.events().emit(SessionEvent::IdentityRefreshed { user: user.clone() });

		Ok(user)
	}

	async fn run_restore(&self) -> Result<Option<Arc<AuthUser>>> {
		if self.gateway.store().credentials()?.is_none() {
			return Ok(None);
		}

		let (generation, _) = self.shared.begin_loading();
		let user = match self.identity.me().await {
			Ok(user) => user.map(Arc::new),
			Err(e) => {
				self.shared.restore_if_current(generation, Session::unauthenticated());

				return Err(e);
			},
		};
		let session = match &user {
			Some(user) => Session::authenticated(user.clone()),
			None => Session::unauthenticated(),
		};

		if !self.shared.publish(generation, session) {
			return Err(self.superseded(FlowKind::Identity));
		}
		if let Some(user) = &user {
			self.gateway.events().emit(SessionEvent::LoggedIn { user: user.clone() });
		}

		Ok(user)
	}

	// Failed login after the exchange: drop the new tokens unless a newer operation owns them.
	fn roll_back(&self, generation: u64) {
		if !self.shared.is_current(generation) {
			return;
		}
		if let Err(e) = self.gateway.store().clear() {
			obs::flow_event(EventLevel::Warn, FlowKind::Login, "rollback_failed", &e.to_string());
		}

		self.shared.restore_if_current(generation, Session::unauthenticated());
	}

	fn superseded(&self, kind: FlowKind) -> Error {
		obs::flow_event(EventLevel::Debug, kind, "superseded", "");

		Error::Superseded
	}
}
impl<T> Drop for SessionStore<T>
where
	T: ?Sized + ApiTransport,
{
	fn drop(&mut self) {
		self.gateway.events().unsubscribe(self.subscription);
	}
}
impl<T> Debug for SessionStore<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionStore")
			.field("session", &self.session())
			.field("generation", &self.shared.generation())
			.finish()
	}
}

#[derive(Debug, Default)]
struct Shared {
	state: RwLock<State>,
	cache: IdentityCache,
}
impl Shared {
	fn generation(&self) -> u64 {
		self.state.read().generation
	}

	fn is_current(&self, generation: u64) -> bool {
		self.generation() == generation
	}

	// Starts a new generation in `Loading`, returning it with the session it replaced.
	fn begin_loading(&self) -> (u64, Session) {
		let mut state = self.state.write();
		let previous = state.session.clone();

		state.generation += 1;
		state.session = Session {
			user: previous.user.clone(),
			status: SessionStatus::Loading,
			since: OffsetDateTime::now_utc(),
		};

		(state.generation, previous)
	}

	fn restore_if_current(&self, generation: u64, session: Session) {
		let mut state = self.state.write();

		if state.generation == generation {
			state.generation += 1;
			state.session = session;
		}
	}

	// Publishes the result of the operation that owns `generation`.
	fn publish(&self, generation: u64, session: Session) -> bool {
		self.commit(generation, session, true)
	}

	// Publishes a re-fetched identity; a login or restore in flight takes precedence.
	fn publish_refreshed(&self, generation: u64, session: Session) -> bool {
		self.commit(generation, session, false)
	}

	// Every accepted write advances the generation so older in-flight fetches are discarded.
	fn commit(&self, generation: u64, session: Session, over_loading: bool) -> bool {
		let user = session.user.clone();

		{
			let mut state = self.state.write();

			if state.generation != generation {
				return false;
			}
			if !over_loading && state.session.status == SessionStatus::Loading {
				return false;
			}

			state.generation += 1;
			state.session = session;
		}

		self.cache.set(CURRENT_USER, user);

		true
	}

	fn reset(&self) {
		{
			let mut state = self.state.write();

			state.generation += 1;
			state.session = Session::unauthenticated();
		}

		self.cache.invalidate(CURRENT_USER);
	}
}

#[derive(Debug, Default)]
struct State {
	session: Session,
	generation: u64,
}

fn terminated(shared: &Weak<Shared>) {
	if let Some(shared) = shared.upgrade() {
		shared.reset();
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		config::GatewayConfig,
		error::TransportError,
		http::{ApiRequest, ApiResponse, TransportFuture},
		store::{CredentialStore, MemoryStore},
	};

	// Login always succeeds; `/auth/me` answers with `me_body` after `me_delay_ms`.
	struct IdentityApi {
		me_body: Mutex<&'static str>,
		me_delay_ms: u64,
		me_calls: AtomicUsize,
	}
	impl ApiTransport for IdentityApi {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				match request.path.as_str() {
					"/auth/login" => Ok::<_, TransportError>(
						ApiResponse::new(200)
							.with_body(r#"{"accessToken":"access-1","refreshToken":"refresh-1"}"#),
					),
					"/auth/register" => Ok(ApiResponse::new(409)
						.with_body(r#"{"message":"Email already registered"}"#)),
					_ => {
						let body = *self.me_body.lock();

						self.me_calls.fetch_add(1, Ordering::SeqCst);
						tokio::time::sleep(std::time::Duration::from_millis(self.me_delay_ms))
							.await;

						Ok(ApiResponse::new(200).with_body(body))
					},
				}
			})
		}
	}

	const ADA: &str = r#"{"id":7,"email":"ada@example.com","role":"Admin","roles":[],
		"permissions":["articles.write"]}"#;

	fn session_store(me_body: &'static str, me_delay_ms: u64) -> SessionStore<IdentityApi> {
		let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::default());
		let config = GatewayConfig::builder(
			Url::parse("https://api.example.com").expect("Base URL fixture should parse."),
		)
		.build()
		.expect("Config fixture should build.");
		let api = IdentityApi {
			me_body: Mutex::new(me_body),
			me_delay_ms,
			me_calls: AtomicUsize::new(0),
		};

		SessionStore::new(Arc::new(Gateway::new(config, store, api)))
	}

	async fn log_in(sessions: &SessionStore<IdentityApi>) -> Arc<AuthUser> {
		sessions
			.login(&LoginRequest::new("ada@example.com", "pw"))
			.await
			.expect("Login should succeed.")
	}

	fn has_access_token(sessions: &SessionStore<IdentityApi>) -> bool {
		sessions.gateway().store().access_token().expect("Lookup should succeed.").is_some()
	}

	#[tokio::test]
	async fn login_publishes_authenticated_session() {
		let sessions = session_store(ADA, 0);
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();

		sessions.events().subscribe(move |event| sink.lock().push(event.clone()));

		let user = sessions
			.login(&LoginRequest::new("ada@example.com", "pw"))
			.await
			.expect("Login should succeed.");

		assert_eq!(user.id, "7");
		assert_eq!(sessions.status(), SessionStatus::Authenticated);
		assert_eq!(sessions.cache().current_user(), Some(user.clone()));
		assert!(sessions.can_access(&GuardRule::new("/admin").with_roles(["admin"])));
		assert_eq!(*seen.lock(), vec![SessionEvent::LoggedIn { user }]);
	}

	#[tokio::test]
	async fn login_without_identity_fails_and_rolls_back() {
		let sessions = session_store("null", 0);
		let err = sessions
			.login(&LoginRequest::new("ada@example.com", "pw"))
			.await
			.expect_err("Login without identity must fail.");

		assert!(matches!(err, Error::IdentityFetch));
		assert_eq!(sessions.status(), SessionStatus::Unauthenticated);
		assert_eq!(sessions.gateway().store().credentials().expect("Lookup should succeed."), None);
	}

	#[tokio::test]
	async fn newer_login_supersedes_older_fetch() {
		let sessions = session_store(ADA, 40);
		let request = LoginRequest::new("ada@example.com", "pw");
		let newer = async {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;

			sessions.login(&request).await
		};
		let (older, newer) = tokio::join!(sessions.login(&request), newer);

		assert!(matches!(older, Err(Error::Superseded)));
		assert!(newer.is_ok());
		assert_eq!(sessions.status(), SessionStatus::Authenticated);
		assert!(has_access_token(&sessions));
	}

	#[tokio::test]
	async fn logout_during_restore_discards_result() {
		let sessions = session_store(ADA, 30);

		sessions
			.gateway()
			.store()
			.persist(&crate::auth::Credentials::new("access-1", None))
			.expect("Seeding credentials should succeed.");

		let logout = async {
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;

			sessions.logout()
		};
		let (restored, logout) = tokio::join!(sessions.restore(), logout);

		logout.expect("Logout should succeed.");

		assert!(matches!(restored, Err(Error::Superseded)));
		assert_eq!(sessions.status(), SessionStatus::Unauthenticated);
		assert_eq!(sessions.current_user(), None);
	}

	#[tokio::test]
	async fn logout_is_idempotent() {
		let sessions = session_store(ADA, 0);

		log_in(&sessions).await;
		sessions.logout().expect("First logout should succeed.");
		sessions.logout().expect("Second logout should succeed.");

		assert_eq!(sessions.session().user, None);
		assert_eq!(sessions.cache().get(CURRENT_USER), None);
		assert_eq!(sessions.gateway().store().credentials().expect("Lookup should succeed."), None);
	}

	#[tokio::test]
	async fn refresh_identity_replaces_snapshot_and_keeps_tokens() {
		let sessions = session_store(ADA, 0);

		log_in(&sessions).await;
		*sessions.gateway().transport().me_body.lock() =
			r#"{"id":"7","email":"ada@example.com","role":"viewer"}"#;

		let user = sessions
			.refresh_identity()
			.await
			.expect("Refresh should succeed.")
			.expect("Identity should still exist.");

		assert_eq!(user.role, "viewer");
		assert!(!sessions.can_access(&GuardRule::new("/admin").with_roles(["admin"])));
		let admin = GuardRule::new("/admin").with_roles(["admin"]);

		assert_eq!(sessions.fallback([&admin], "/home"), "/home");
		assert!(has_access_token(&sessions));
	}

	#[tokio::test]
	async fn register_surfaces_message_and_invalidates_cache() {
		let sessions = session_store(ADA, 0);

		sessions.cache().set(CURRENT_USER, None);

		let err = sessions
			.register(&RegisterRequest::new("ada@example.com", "pw"))
			.await
			.expect_err("Conflicting registration must fail.");

		assert_eq!(err.to_string(), "Email already registered");
		assert_eq!(
			sessions.cache().get(CURRENT_USER),
			Some(None),
			"Failed registration keeps the cache."
		);
		assert_eq!(sessions.status(), SessionStatus::Unauthenticated);
	}

	#[tokio::test]
	async fn gateway_termination_resets_session() {
		let sessions = session_store(ADA, 0);

		log_in(&sessions).await;
		sessions.gateway().terminate("refresh failed");

		assert_eq!(sessions.status(), SessionStatus::Unauthenticated);
		assert_eq!(sessions.cache().current_user(), None);
		assert_eq!(sessions.gateway().store().credentials().expect("Lookup should succeed."), None);
	}

	// Login hands out `access-2` after `login_delay_ms`; `/auth/me` answers slowly with the
	// previous user for `access-1` and immediately with `fresh_body` for anything else.
	struct RotatingIdentityApi {
		login_delay_ms: u64,
		fresh_body: &'static str,
	}
	impl ApiTransport for RotatingIdentityApi {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				if request.path == "/auth/login" {
					tokio::time::sleep(std::time::Duration::from_millis(self.login_delay_ms))
						.await;

					return Ok::<_, TransportError>(
						ApiResponse::new(200).with_body(r#"{"accessToken":"access-2"}"#),
					);
				}
				if request.header(crate::http::AUTHORIZATION) == Some("Bearer access-1") {
					tokio::time::sleep(std::time::Duration::from_millis(40)).await;

					return Ok(ApiResponse::new(200)
						.with_body(r#"{"id":"old","email":"old@example.com","role":"admin"}"#));
				}

				Ok(ApiResponse::new(200).with_body(self.fresh_body))
			})
		}
	}

	const NEW_USER: &str = r#"{"id":"new","email":"new@example.com","role":"viewer"}"#;

	fn rotating_store(
		login_delay_ms: u64,
		fresh_body: &'static str,
	) -> SessionStore<RotatingIdentityApi> {
		let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::default());

		store
			.persist(&crate::auth::Credentials::new("access-1", None))
			.expect("Seeding credentials should succeed.");

		let config = GatewayConfig::builder(
			Url::parse("https://api.example.com").expect("Base URL fixture should parse."),
		)
		.build()
		.expect("Config fixture should build.");

		SessionStore::new(Arc::new(Gateway::new(
			config,
			store,
			RotatingIdentityApi { login_delay_ms, fresh_body },
		)))
	}

	async fn refresh_during_login(
		sessions: &SessionStore<RotatingIdentityApi>,
	) -> (Result<Option<Arc<AuthUser>>>, Result<Arc<AuthUser>>) {
		let request = LoginRequest::new("new@example.com", "pw");
		let refresh = async {
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;

			sessions.refresh_identity().await
		};

		tokio::join!(refresh, sessions.login(&request))
	}

	#[tokio::test]
	async fn stale_identity_refresh_cannot_overwrite_newer_login() {
		let sessions = rotating_store(20, NEW_USER);
		let (refreshed, logged_in) = refresh_during_login(&sessions).await;

		assert_eq!(logged_in.expect("Login should succeed.").id, "new");
		assert!(matches!(refreshed, Err(Error::Superseded)));
		assert_eq!(sessions.current_user().map(|user| user.id.clone()).as_deref(), Some("new"));
		assert_eq!(
			sessions.cache().current_user().map(|user| user.id.clone()).as_deref(),
			Some("new")
		);
		assert_eq!(sessions.status(), SessionStatus::Authenticated);
	}

	#[tokio::test]
	async fn identity_refresh_yields_to_login_still_loading() {
		let sessions = rotating_store(80, NEW_USER);
		let (refreshed, logged_in) = refresh_during_login(&sessions).await;

		assert!(matches!(refreshed, Err(Error::Superseded)));
		assert_eq!(logged_in.expect("Login should succeed.").id, "new");
		assert_eq!(sessions.current_user().map(|user| user.id.clone()).as_deref(), Some("new"));
	}

	#[tokio::test]
	async fn stale_identity_refresh_cannot_revive_failed_login() {
		let sessions = rotating_store(20, "null");
		let (refreshed, logged_in) = refresh_during_login(&sessions).await;

		assert!(matches!(logged_in, Err(Error::IdentityFetch)));
		assert!(matches!(refreshed, Err(Error::Superseded)));
		assert_eq!(sessions.status(), SessionStatus::Unauthenticated);
		assert_eq!(sessions.current_user(), None);
		assert!(!has_access_token_in(&sessions));
	}

	fn has_access_token_in(sessions: &SessionStore<RotatingIdentityApi>) -> bool {
		sessions.gateway().store().access_token().expect("Lookup should succeed.").is_some()
	}

	#[test]
	fn dropping_store_unsubscribes() {
		let sessions = session_store(ADA, 0);
		let gateway = sessions.gateway().clone();

		assert_eq!(gateway.events().listener_count(), 1);

		drop(sessions);

		assert_eq!(gateway.events().listener_count(), 0);
	}
}
