//! Static guard-rule configuration.

// std
use std::slice::Iter;
// self
use crate::{_prelude::*, error::ConfigError};

/// How a rule's permission list is matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionMode {
	/// Every listed permission is required.
	#[default]
	All,
	/// At least one listed permission is required.
	Any,
}

/// A guarded section: its landing path plus optional role and permission constraints.
///
/// An empty role or permission set is treated as "no constraint", the same as an absent one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardRule {
	/// Path the rule guards and the fallback resolver lands on.
	pub path: String,
	/// Role allow-list; the user needs any one of them.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub roles: Option<BTreeSet<String>>,
	/// Required permissions, matched per [`PermissionMode`].
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub permissions: Option<BTreeSet<String>>,
	/// Permission matching mode; defaults to [`PermissionMode::All`].
	#[serde(default)]
	pub permissions_mode: PermissionMode,
}
impl GuardRule {
	/// Creates an unconstrained rule; any authenticated user passes it.
	pub fn new(path: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			roles: None,
			permissions: None,
			permissions_mode: PermissionMode::All,
		}
	}

	/// Sets the role allow-list.
	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles = Some(roles.into_iter().map(Into::into).collect());

		self
	}

	/// Sets the required permissions.
	pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.permissions = Some(permissions.into_iter().map(Into::into).collect());

		self
	}

	/// Overrides the permission matching mode.
	pub fn with_mode(mut self, mode: PermissionMode) -> Self {
		self.permissions_mode = mode;

		self
	}

	/// Role constraint, if any. Empty sets read as `None`.
	pub fn role_constraint(&self) -> Option<&BTreeSet<String>> {
		self.roles.as_ref().filter(|roles| !roles.is_empty())
	}

	/// Permission constraint, if any. Empty sets read as `None`.
	pub fn permission_constraint(&self) -> Option<&BTreeSet<String>> {
		self.permissions.as_ref().filter(|permissions| !permissions.is_empty())
	}

	/// Returns `true` when the rule constrains neither roles nor permissions.
	pub fn is_open(&self) -> bool {
		self.role_constraint().is_none() && self.permission_constraint().is_none()
	}
}

/// Priority-ordered guard rules; earlier entries win during fallback resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuardRules(Vec<GuardRule>);
impl GuardRules {
	/// Wraps rules in priority order.
	pub fn new(rules: Vec<GuardRule>) -> Self {
		Self(rules)
	}

	/// Parses a JSON array of rules, preserving order.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Document { source })
	}

	/// Looks up the rule guarding `path` (exact match).
	pub fn find(&self, path: &str) -> Option<&GuardRule> {
		self.0.iter().find(|rule| rule.path == path)
	}

	/// Iterates rules in priority order.
	pub fn iter(&self) -> Iter<'_, GuardRule> {
		self.0.iter()
	}

	/// Rules as a slice.
	pub fn as_slice(&self) -> &[GuardRule] {
		&self.0
	}

	/// Number of rules.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no rules are configured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<Vec<GuardRule>> for GuardRules {
	fn from(rules: Vec<GuardRule>) -> Self {
		Self(rules)
	}
}
impl<'a> IntoIterator for &'a GuardRules {
	type IntoIter = Iter<'a, GuardRule>;
	type Item = &'a GuardRule;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}
