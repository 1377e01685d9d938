//! Access/refresh token pair persisted by the credential store.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Current bearer credentials for the authenticated client.
///
/// Created on login, replaced on refresh, cleared on logout. Only the credential store
/// helpers mutate the persisted copy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
	/// Short-lived bearer token attached to outbound requests.
	pub access_token: TokenSecret,
	/// Longer-lived token exchanged for a new access token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
}
impl Credentials {
	/// Builds a credential pair from raw token strings.
	pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: refresh_token.map(TokenSecret::new),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn login_payload_uses_camel_case() {
		let creds: Credentials =
			serde_json::from_str(r#"{"accessToken":"a-1","refreshToken":"r-1"}"#)
				.expect("Login payload should deserialize.");

		assert_eq!(creds.access_token.expose(), "a-1");
		assert_eq!(creds.refresh_token.as_ref().map(TokenSecret::expose), Some("r-1"));
		assert!(!format!("{creds:?}").contains("a-1"), "Debug output must redact secrets.");
	}
}
