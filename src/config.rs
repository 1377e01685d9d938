//! Gateway configuration: base URL, identity endpoints, the auth-exempt path set, and the
//! refresh timeout.

// self
use crate::{_prelude::*, error::ConfigError};

/// Identity-provider endpoint paths, relative to [`GatewayConfig::base_url`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
	/// Exchanges credentials for `{ accessToken, refreshToken }`.
	pub login: String,
	/// Registers a new account without establishing a session.
	pub register: String,
	/// Exchanges a refresh token for a new access token.
	pub refresh: String,
	/// Returns the authenticated identity ("who am I").
	pub me: String,
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			login: "/auth/login".into(),
			register: "/auth/register".into(),
			refresh: "/auth/refresh".into(),
			me: "/auth/me".into(),
		}
	}
}

/// Immutable configuration consumed by the gateway and the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Origin all relative request paths are joined onto.
	pub base_url: Url,
	/// Identity-provider endpoints.
	#[serde(default)]
	pub endpoints: Endpoints,
	/// Normalized paths that never carry credentials and never enter the refresh path.
	#[serde(default)]
	pub auth_exempt: BTreeSet<String>,
	/// Upper bound on a single refresh call; elapsing counts as a refresh failure.
	#[serde(default = "default_refresh_timeout", with = "duration_secs")]
	pub refresh_timeout: Duration,
}
impl GatewayConfig {
	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> GatewayConfigBuilder {
		GatewayConfigBuilder::new(base_url)
	}

	/// Parses and validates a JSON configuration document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(de)
			.map_err(|source| ConfigError::Document { source })?;

		config.finish()
	}

	/// Returns `true` when `path` is auth-exempt (compared after normalization).
	pub fn is_exempt(&self, path: &str) -> bool {
		self.auth_exempt.contains(&normalize_path(path))
	}

	/// Returns `true` when `path` targets the refresh endpoint.
	pub fn is_refresh(&self, path: &str) -> bool {
		normalize_path(path) == normalize_path(&self.endpoints.refresh)
	}

	fn finish(mut self) -> Result<Self, ConfigError> {
		self.validate()?;

		let identity = [&self.endpoints.login, &self.endpoints.register, &self.endpoints.refresh];

		self.auth_exempt = self
			.auth_exempt
			.iter()
			.chain(identity)
			.map(|path| normalize_path(path))
			.collect();

		Ok(self)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}

		validate_endpoint("login", &self.endpoints.login)?;
		validate_endpoint("register", &self.endpoints.register)?;
		validate_endpoint("refresh", &self.endpoints.refresh)?;
		validate_endpoint("me", &self.endpoints.me)?;

		for path in &self.auth_exempt {
			validate_endpoint("auth-exempt", path)?;
		}

		if !self.refresh_timeout.is_positive() {
			return Err(ConfigError::NonPositiveTimeout);
		}

		Ok(())
	}
}

/// Builder for [`GatewayConfig`] values.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
	base_url: Url,
	endpoints: Endpoints,
	auth_exempt: BTreeSet<String>,
	refresh_timeout: Duration,
}
impl GatewayConfigBuilder {
	/// Creates a builder with default endpoints and timeout.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: Endpoints::default(),
			auth_exempt: BTreeSet::new(),
			refresh_timeout: default_refresh_timeout(),
		}
	}

	/// Overrides the identity endpoints.
	pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Adds a path to the auth-exempt set.
	///
	/// The login, register, and refresh endpoints are always exempt.
	pub fn exempt(mut self, path: impl Into<String>) -> Self {
		self.auth_exempt.insert(path.into());

		self
	}

	/// Overrides the refresh timeout (defaults to 10 seconds).
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<GatewayConfig, ConfigError> {
		GatewayConfig {
			base_url: self.base_url,
			endpoints: self.endpoints,
			auth_exempt: self.auth_exempt,
			refresh_timeout: self.refresh_timeout,
		}
		.finish()
	}
}

/// Normalizes a request path for exemption checks and retry bookkeeping.
///
/// Query and fragment suffixes are dropped, repeated slashes collapse, a leading slash is
/// enforced, and a trailing slash is removed everywhere except the root. Matching stays
/// case-sensitive.
pub fn normalize_path(path: &str) -> String {
	let bare = path.split(['?', '#']).next().unwrap_or_default();
	let segments = bare.split('/').filter(|segment| !segment.is_empty()).collect::<Vec<_>>();

	format!("/{}", segments.join("/"))
}

fn validate_endpoint(name: &'static str, path: &str) -> Result<(), ConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(ConfigError::RelativeEndpoint { endpoint: name, path: path.to_owned() })
	}
}

fn default_refresh_timeout() -> Duration {
	Duration::seconds(10)
}

mod duration_secs {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_f64(value.as_seconds_f64())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = f64::deserialize(deserializer)?;

		Duration::checked_seconds_f64(secs)
			.ok_or_else(|| serde::de::Error::custom("refresh timeout is out of range"))
	}
}
