//! Immutable identity snapshot returned by the identity endpoint.

// self
use crate::_prelude::*;

/// Authenticated identity as reported by the identity provider.
///
/// Instances are replaced wholesale on each fetch and never patched in place. Payloads are
/// validated at the boundary through [`AuthUser::from_json`], so every value held by the
/// session layer has a non-empty `id` and `email`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
	/// Provider-assigned user identifier.
	pub id: String,
	/// Email address used to sign in.
	pub email: String,
	/// Primary role label.
	pub role: String,
	/// Additional role labels.
	pub roles: BTreeSet<String>,
	/// Fine-grained permission strings (case-sensitive).
	pub permissions: BTreeSet<String>,
}
impl AuthUser {
	/// Creates a user with a primary role and no extra roles or permissions.
	pub fn new(id: impl Into<String>, email: impl Into<String>, role: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			email: email.into(),
			role: role.into(),
			roles: BTreeSet::new(),
			permissions: BTreeSet::new(),
		}
	}

	/// Replaces the additional role set.
	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles = roles.into_iter().map(Into::into).collect();

		self
	}

	/// Replaces the permission set.
	pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.permissions = permissions.into_iter().map(Into::into).collect();

		self
	}

	/// Parses an identity endpoint body.
	///
	/// A JSON `null` (or an empty body) means the provider knows no user for the presented
	/// credentials and yields `Ok(None)`. Any other shape mismatch becomes
	/// [`Error::Validation`] naming the offending field path.
	pub fn from_json(body: &[u8]) -> Result<Option<Self>> {
		if body.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let de = &mut serde_json::Deserializer::from_slice(body);
		let payload =
			serde_path_to_error::deserialize::<_, Option<AuthUserPayload>>(de).map_err(|e| {
				let path = e.path().to_string();

				Error::validation(format!(
					"Identity payload is malformed at `{path}`: {}",
					e.inner()
				))
			})?;

		payload
			.map(Self::from_payload)
			.transpose()
			.map_err(|e| Error::validation(format!("Identity payload is invalid: {e}")))
	}

	/// Effective role set: the primary role plus `roles`, lower-cased.
	pub fn effective_roles(&self) -> BTreeSet<String> {
		std::iter::once(&self.role)
			.chain(self.roles.iter())
			.filter(|role| !role.is_empty())
			.map(|role| role.to_lowercase())
			.collect()
	}

	/// Case-insensitive role membership check.
	pub fn has_role(&self, role: &str) -> bool {
		self.effective_roles().contains(&role.to_lowercase())
	}

	/// Exact, case-sensitive permission membership check.
	pub fn has_permission(&self, permission: &str) -> bool {
		self.permissions.contains(permission)
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUserPayload {
	id: UserIdRepr,
	email: String,
	#[serde(default)]
	role: String,
	#[serde(default)]
	roles: Vec<String>,
	#[serde(default)]
	permissions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserIdRepr {
	Text(String),
	Number(u64),
}

/// Error returned when an identity payload violates the fixed shape.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthUserError {
	/// The identifier was empty.
	#[error("User id cannot be empty.")]
	EmptyId,
	/// The email was empty.
	#[error("User email cannot be empty.")]
	EmptyEmail,
}

impl AuthUser {
	fn from_payload(payload: AuthUserPayload) -> Result<Self, AuthUserError> {
		let id = match payload.id {
			UserIdRepr::Text(id) => id,
			UserIdRepr::Number(id) => id.to_string(),
		};

		if id.trim().is_empty() {
			return Err(AuthUserError::EmptyId);
		}
		if payload.email.trim().is_empty() {
			return Err(AuthUserError::EmptyEmail);
		}

		Ok(Self {
			id,
			email: payload.email,
			role: payload.role,
			roles: payload.roles.into_iter().collect(),
			permissions: payload.permissions.into_iter().collect(),
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn payload_parses_with_defaults() {
		let user = AuthUser::from_json(br#"{"id":7,"email":"ed@example.com","role":"Editor"}"#)
			.expect("Identity payload should parse.")
			.expect("Identity payload should carry a user.");

		assert_eq!(user.id, "7");
		assert!(user.roles.is_empty());
		assert!(user.permissions.is_empty());
		assert!(user.has_role("editor"));
		assert!(user.has_role("EDITOR"));
	}

	#[test]
	fn null_and_empty_bodies_mean_no_user() {
		assert_eq!(AuthUser::from_json(b"null").expect("Null body should parse."), None);
		assert_eq!(AuthUser::from_json(b"  ").expect("Blank body should parse."), None);
	}

	#[test]
	fn malformed_payload_reports_field_path() {
		let err = AuthUser::from_json(br#"{"id":"u-1","email":"a@b.c","permissions":[1]}"#)
			.expect_err("Numeric permission must be rejected.");

		assert!(matches!(err, Error::Validation { .. }));
		assert!(err.to_string().contains("permissions"), "Unexpected message: {err}");

		let err = AuthUser::from_json(br#"{"id":"","email":"a@b.c"}"#)
			.expect_err("Empty id must be rejected.");

		assert!(matches!(err, Error::Validation { .. }));
	}

	#[test]
	fn effective_roles_merge_primary_and_extra() {
		let user = AuthUser::new("u-1", "a@b.c", "Admin").with_roles(["Editor", "admin"]);

		assert_eq!(
			user.effective_roles().into_iter().collect::<Vec<_>>(),
			vec!["admin".to_string(), "editor".to_string()]
		);
	}

	#[test]
	fn permissions_are_case_sensitive() {
		let user = AuthUser::new("u-1", "a@b.c", "viewer").with_permissions(["articles:write"]);

		assert!(user.has_permission("articles:write"));
		assert!(!user.has_permission("Articles:Write"));
	}
}
