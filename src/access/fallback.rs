//! Fallback route resolution.

// self
use crate::{
	access::{GuardRule, can_access},
	auth::AuthUser,
};

/// Returns the path of the first rule `user` can access, or `default_path` when none match.
pub fn resolve_fallback<'a, I>(user: Option<&AuthUser>, rules: I, default_path: &str) -> String
where
	I: IntoIterator<Item = &'a GuardRule>,
{
	rules
		.into_iter()
		.find(|rule| can_access(user, rule))
		.map_or_else(|| default_path.to_owned(), |rule| rule.path.clone())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::access::GuardRules;

	fn rules() -> GuardRules {
		GuardRules::new(vec![
			GuardRule::new("/admin").with_roles(["admin"]),
			GuardRule::new("/editor").with_roles(["editor"]),
		])
	}

	#[test]
	fn first_accessible_rule_wins() {
		let admin = AuthUser::new("1", "a@x.io", "admin").with_roles(["editor"]);
		let editor = AuthUser::new("2", "e@x.io", "editor");
		let viewer = AuthUser::new("3", "v@x.io", "viewer");

		assert_eq!(resolve_fallback(Some(&admin), &rules(), "/default"), "/admin");
		assert_eq!(resolve_fallback(Some(&editor), &rules(), "/default"), "/editor");
		assert_eq!(resolve_fallback(Some(&viewer), &rules(), "/default"), "/default");
		assert_eq!(resolve_fallback(None, &rules(), "/login"), "/login");
	}

	#[test]
	fn empty_rule_list_yields_default() {
		let user = AuthUser::new("1", "a@x.io", "admin");

		assert_eq!(resolve_fallback(Some(&user), &GuardRules::default(), "/home"), "/home");
	}
}
