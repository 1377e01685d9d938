//! Identity-provider client: credential exchange, registration, and the "who am I" call.
//!
//! Every call is dispatched through the [`Gateway`], so the login and register endpoints pick up
//! the auth-exempt treatment while the identity endpoint gets bearer attachment and the
//! refresh-on-401 path like any other protected call.

// self
use crate::{
	_prelude::*,
	auth::{AuthUser, Credentials, TokenSecret},
	gateway::Gateway,
	http::{ApiRequest, ApiResponse, ApiTransport},
	obs::{self, EventLevel, FlowKind},
};

/// Message surfaced when the identity provider gives no usable reason for a failure.
pub const GENERIC_FAILURE: &str = "Unable to reach the identity provider.";

/// Email/password pair exchanged for credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
	/// Account email.
	pub email: String,
	/// Account password; redacted in debug output.
	pub password: TokenSecret,
}
impl LoginRequest {
	/// Creates a login request.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: TokenSecret::new(password) }
	}
}

/// Registration payload; provider-specific fields ride in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisterRequest {
	/// Account email.
	pub email: String,
	/// Account password; redacted in debug output.
	pub password: TokenSecret,
	/// Optional display name.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Additional provider-specific fields.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl RegisterRequest {
	/// Creates a registration request without optional fields.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			password: TokenSecret::new(password),
			name: None,
			extra: BTreeMap::new(),
		}
	}

	/// Sets the display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Adds a provider-specific field.
	pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.extra.insert(key.into(), value);

		self
	}
}

/// Body sent to the refresh endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
	/// Refresh token being exchanged.
	pub refresh_token: &'a str,
}

/// Body returned by the refresh endpoint. Rotation of the refresh token is optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
	/// New bearer token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when the provider issues one.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
}

/// Thin client over the identity endpoints.
pub struct IdentityClient<T>
where
	T: ?Sized + ApiTransport,
{
	gateway: Arc<Gateway<T>>,
}
impl<T> IdentityClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client dispatching through `gateway`.
	pub fn new(gateway: Arc<Gateway<T>>) -> Self {
		Self { gateway }
	}

	/// Exchanges credentials for a token pair without persisting anything.
	///
	/// An unreachable provider surfaces as [`GENERIC_FAILURE`] rather than a transport error.
	pub async fn login(&self, request: &LoginRequest) -> Result<Credentials> {
		let endpoint = &self.gateway.config().endpoints.login;
		let response = self
			.gateway
			.send(ApiRequest::post(endpoint.as_str()).with_json(request)?)
			.await
			.map_err(|e| generic_on_network(FlowKind::Login, e))?;

		ensure_accepted(&response)?;

		response.json()
	}

	/// Registers an account. No session is established. Transport failures map like
	/// [`login`](Self::login).
	pub async fn register(&self, request: &RegisterRequest) -> Result<()> {
		let endpoint = &self.gateway.config().endpoints.register;
		let response = self
			.gateway
			.send(ApiRequest::post(endpoint.as_str()).with_json(request)?)
			.await
			.map_err(|e| generic_on_network(FlowKind::Register, e))?;

		ensure_accepted(&response)
	}

	/// Fetches the identity bound to the stored access token.
	///
	/// Resolves `Ok(None)` when the provider answers with an empty or `null` body.
	pub async fn me(&self) -> Result<Option<AuthUser>> {
		let endpoint = &self.gateway.config().endpoints.me;
		let response = self.gateway.send(ApiRequest::get(endpoint.as_str())).await?;

		ensure_accepted(&response)?;

		AuthUser::from_json(&response.body)
	}
}
impl<T> Clone for IdentityClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self { gateway: self.gateway.clone() }
	}
}
impl<T> Debug for IdentityClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityClient")
			.field("endpoints", &self.gateway.config().endpoints)
			.finish()
	}
}

// Credential forms show one connection message; the transport detail goes to the log.
fn generic_on_network(kind: FlowKind, err: Error) -> Error {
	match err {
		Error::Network(e) => {
			obs::flow_event(EventLevel::Warn, kind, "unreachable", &e.to_string());

			Error::validation(GENERIC_FAILURE)
		},
		other => other,
	}
}

fn ensure_accepted(response: &ApiResponse) -> Result<()> {
	if response.is_success() {
		Ok(())
	} else {
		Err(Error::validation(response.error_message().unwrap_or_else(|| GENERIC_FAILURE.into())))
	}
}
