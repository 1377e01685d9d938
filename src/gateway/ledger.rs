//! Retry bookkeeping keyed by logical request identity.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	config::normalize_path,
	http::{ApiRequest, Method},
};

/// Stable identity of one logical request chain.
///
/// Two requests that share a URL but differ in query or body hash to different fingerprints,
/// and every call to [`Gateway::send`](crate::gateway::Gateway::send) receives its own
/// `ticket`, so concurrent identical calls never share a retry marker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
	/// HTTP verb.
	pub method: Method,
	/// Normalized request path.
	pub path: String,
	/// Base64 (no padding) SHA-256 digest of the query and body.
	pub fingerprint: String,
	/// Per-call sequence number issued by the ledger.
	pub ticket: u64,
}
impl RequestIdentity {
	/// Derives the identity of `request` for the given ticket.
	pub fn new(request: &ApiRequest, ticket: u64) -> Self {
		Self {
			method: request.method,
			path: normalize_path(&request.path),
			fingerprint: fingerprint(request),
			ticket,
		}
	}

	/// Returns `true` when both identities describe the same call, ignoring tickets.
	pub fn same_call(&self, other: &Self) -> bool {
		self.method == other.method
			&& self.path == other.path
			&& self.fingerprint == other.fingerprint
	}
}
impl Display for RequestIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}#{}", self.method, self.path, self.ticket)
	}
}

/// Set of in-flight request identities that already consumed their single retry.
#[derive(Debug, Default)]
pub struct RetryLedger {
	entries: Mutex<HashSet<RequestIdentity>>,
	tickets: AtomicU64,
}
impl RetryLedger {
	/// Issues a fresh identity for a new logical request.
	pub fn issue(&self, request: &ApiRequest) -> RequestIdentity {
		RequestIdentity::new(request, self.tickets.fetch_add(1, Ordering::Relaxed))
	}

	/// Marks `identity` as retried; returns `false` when it was already marked.
	pub fn mark(&self, identity: &RequestIdentity) -> bool {
		self.entries.lock().insert(identity.clone())
	}

	/// Returns `true` when `identity` has consumed its retry.
	pub fn is_marked(&self, identity: &RequestIdentity) -> bool {
		self.entries.lock().contains(identity)
	}

	/// Drops the marker once the request resolved (success or terminal failure).
	pub fn clear(&self, identity: &RequestIdentity) {
		self.entries.lock().remove(identity);
	}

	/// Number of requests currently holding a retry marker.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when no request holds a retry marker.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}
}

fn fingerprint(request: &ApiRequest) -> String {
	let mut hasher = Sha256::new();

	if let Some((_, inline)) = request.path.split_once('?') {
		hasher.update(inline.as_bytes());
	}

	for (key, value) in &request.query {
		hasher.update(b"&");
		hasher.update(key.as_bytes());
		hasher.update(b"=");
		hasher.update(value.as_bytes());
	}

	hasher.update([0]);

	if let Some(body) = &request.body {
		hasher.update(body);
	}

	STANDARD_NO_PAD.encode(hasher.finalize())
}
