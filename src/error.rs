//! Gateway-level error types shared across the request pipeline, session layer, and stores.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS); propagated unchanged to the caller.
	#[error(transparent)]
	Network(#[from] TransportError),

	/// Retry budget exhausted or the refresh attempt failed; the session has been terminated.
	#[error("Request is unauthorized: {reason}.")]
	Unauthorized {
		/// Gateway-supplied reason string.
		reason: String,
	},
	/// Identity provider rejected the call, or returned a payload of the wrong shape.
	#[error("{message}")]
	Validation {
		/// Provider-supplied message, surfaced verbatim when available.
		message: String,
	},
	/// The identity endpoint returned no user after a successful credential exchange.
	#[error("Identity provider returned no user for the new session.")]
	IdentityFetch,
	/// A newer login or a logout started while this operation was in flight.
	#[error("Operation was superseded by a newer session change.")]
	Superseded,
}
impl Error {
	/// Builds an [`Error::Unauthorized`] from any displayable reason.
	pub fn unauthorized(reason: impl Into<String>) -> Self {
		Self::Unauthorized { reason: reason.into() }
	}

	/// Builds an [`Error::Validation`] from any displayable message.
	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation { message: message.into() }
	}

	/// Returns `true` for [`Error::Unauthorized`].
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized { .. })
	}
}

/// Configuration and validation failures raised while assembling the pipeline.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL uses a scheme other than http or https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Endpoint path does not start with `/`.
	#[error("The {endpoint} endpoint must be an absolute path: {path}.")]
	RelativeEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path that failed validation.
		path: String,
	},
	/// Refresh timeout is zero or negative.
	#[error("The refresh timeout must be positive.")]
	NonPositiveTimeout,
	/// Configuration document (gateway config or guard rules) could not be parsed.
	#[error("Configuration document is malformed.")]
	Document {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {path}.")]
	Network {
		/// Path of the failed request.
		path: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error for the given request path.
	pub fn network(
		path: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { path: path.into(), source: Box::new(src) }
	}
}
