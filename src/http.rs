//! Transport primitives decorated by the request gateway.
//!
//! The module exposes [`ApiTransport`] alongside the transport-neutral [`ApiRequest`] and
//! [`ApiResponse`] values so downstream crates can plug in custom HTTP stacks (or scripted
//! fakes in tests) without the gateway depending on any particular client. The gateway only
//! ever decorates a transport; it never opens sockets itself.

// std
use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Lower-cased `Authorization` header name.
pub const AUTHORIZATION: &str = "authorization";
/// Lower-cased `Content-Type` header name.
pub const CONTENT_TYPE: &str = "content-type";

/// Boxed future returned by [`ApiTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports the gateway dispatches through.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared by the
/// gateway, the refresh coordinator, and every in-flight request chain. The returned future
/// must be `Send` so callers can spawn request chains onto multi-threaded executors.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request` and resolves with the raw response, whatever its status.
	fn send(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// HTTP verbs understood by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical upper-case verb.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outbound request relative to the transport's base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP verb.
	pub method: Method,
	/// Path relative to the base URL (may carry a `?query` suffix).
	pub path: String,
	/// Additional query pairs appended in order.
	pub query: Vec<(String, String)>,
	/// Headers keyed by lower-cased name.
	pub headers: BTreeMap<String, String>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request with no headers, query, or body.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: BTreeMap::new(),
			body: None,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Appends a query pair.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets (or replaces) a header; names are case-insensitive.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets a raw body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `payload` as the JSON body and sets the content type.
	pub fn with_json<T>(self, payload: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(payload).map_err(ConfigError::Body)?;

		Ok(self.with_header(CONTENT_TYPE, "application/json").with_body(body))
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns `true` when an `Authorization` header is already present.
	pub fn has_authorization(&self) -> bool {
		self.headers.contains_key(AUTHORIZATION)
	}
}

/// Raw response handed back by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Headers keyed by lower-cased name.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Status code that triggers the refresh path.
	pub const UNAUTHORIZED: u16 = 401;

	/// Creates an empty response with the provided status.
	pub fn new(status: u16) -> Self {
		Self { status, headers: BTreeMap::new(), body: Vec::new() }
	}

	/// Sets the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == Self::UNAUTHORIZED
	}

	/// Decodes the body as JSON, naming the failing field path on mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let de = &mut serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(de).map_err(|e| {
			let path = e.path().to_string();

			Error::validation(format!("Response body is malformed at `{path}`: {}", e.inner()))
		})
	}

	/// Extracts a `message` (or `error`) string from a JSON error body, if present.
	pub fn error_message(&self) -> Option<String> {
		let value: serde_json::Value = serde_json::from_slice(&self.body).ok()?;

		["message", "error"]
			.iter()
			.find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
			.map(str::to_owned)
	}
}

/// Thin wrapper around [`ReqwestClient`] that resolves request paths against a base URL.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base_url: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a default reqwest client.
	pub fn new(base_url: Url) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().build()?;

		Ok(Self::with_client(client, base_url))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient, base_url: Url) -> Self {
		Self { client, base_url }
	}

	/// Base URL every request path is joined onto.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Resolves a request into an absolute URL, keeping any base path prefix.
	pub fn resolve(&self, request: &ApiRequest) -> Url {
		let (path, inline_query) = match request.path.split_once('?') {
			Some((path, query)) => (path, Some(query)),
			None => (request.path.as_str(), None),
		};
		let mut url = self.base_url.clone();
		let prefix = url.path().trim_end_matches('/').to_owned();

		url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
		url.set_query(inline_query);

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(request.query.iter());
		}

		url
	}

	async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		let url = self.resolve(&request);
		let method = match request.method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.client.request(method, url);

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}

		let response =
			builder.send().await.map_err(|e| TransportError::network(&request.path, e))?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response
			.bytes()
			.await
			.map_err(|e| TransportError::network(&request.path, e))?
			.to_vec();

		Ok(ApiResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(self.execute(request))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn headers_are_case_insensitive() {
		let request = ApiRequest::get("/api/articles").with_header("Authorization", "Bearer x");

		assert!(request.has_authorization());
		assert_eq!(request.header("AUTHORIZATION"), Some("Bearer x"));
	}

	#[test]
	fn error_message_prefers_message_field() {
		let response = ApiResponse::new(400).with_body(r#"{"message":"Invalid password"}"#);

		assert_eq!(response.error_message().as_deref(), Some("Invalid password"));
		assert_eq!(ApiResponse::new(502).with_body("<html>").error_message(), None);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn resolve_keeps_base_prefix_and_query() {
		let base = Url::parse("https://api.example.com/v1/").expect("Base URL should parse.");
		let transport = ReqwestTransport::with_client(ReqwestClient::new(), base);
		let url = transport
			.resolve(&ApiRequest::get("/articles?page=2").with_query("category", "rust lang"));

		assert_eq!(url.as_str(), "https://api.example.com/v1/articles?page=2&category=rust+lang");
	}
}
