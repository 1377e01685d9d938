//! Access evaluator.

// self
use crate::{
	_prelude::*,
	access::{GuardRule, PermissionMode},
	auth::AuthUser,
};

/// Decides whether `user` satisfies `rule`.
///
/// - No user: denied.
/// - Unconstrained rule: allowed.
/// - Roles: the user needs any listed role; both sides compare lower-cased.
/// - Permissions: exact, case-sensitive matching per [`PermissionMode`].
/// - When both constraints exist, both must pass.
pub fn can_access(user: Option<&AuthUser>, rule: &GuardRule) -> bool {
	let Some(user) = user else {
		return false;
	};

	roles_pass(user, rule) && permissions_pass(user, rule)
}

fn roles_pass(user: &AuthUser, rule: &GuardRule) -> bool {
	let Some(required) = rule.role_constraint() else {
		return true;
	};
	let held = user.effective_roles();

	required.iter().any(|role| held.contains(&role.to_lowercase()))
}

fn permissions_pass(user: &AuthUser, rule: &GuardRule) -> bool {
	let Some(required) = rule.permission_constraint() else {
		return true;
	};

	match rule.permissions_mode {
		PermissionMode::All => required.iter().all(|p| user.has_permission(p)),
		PermissionMode::Any => required.iter().any(|p| user.has_permission(p)),
	}
}

/// Convenience wrapper over [`can_access`] for shared user snapshots.
pub fn can_access_shared(user: Option<&Arc<AuthUser>>, rule: &GuardRule) -> bool {
	can_access(user.map(Arc::as_ref), rule)
}
