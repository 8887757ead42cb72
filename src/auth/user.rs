//! Authenticated user snapshot stored in the session.

// self
use crate::{
	_prelude::*,
	auth::{RolePolicy, RoleSet, SubjectId},
};

/// Snapshot of the signed-in user, built from verified identity-token claims.
///
/// Roles are already filtered through the session allow-list, so the set never carries realm
/// roles unrelated to the portal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
	/// External identity id (`sub`).
	pub id: SubjectId,
	/// Email address claim.
	pub email: String,
	/// Whether the identity provider verified the email address.
	pub email_verified: bool,
	/// Display name claim.
	pub name: String,
	/// Preferred username claim.
	pub preferred_username: String,
	/// Allow-listed roles held at login time.
	pub roles: RoleSet,
}
impl AuthenticatedUser {
	/// Returns true if the user holds `role`.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.contains(role)
	}

	/// Returns true if the user holds at least one of `roles`.
	pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a str>) -> bool {
		roles.into_iter().any(|role| self.has_role(role))
	}

	/// Returns true if the user may call the admin API.
	pub fn is_admin(&self, policy: &RolePolicy) -> bool {
		self.has_role(policy.admin_role())
	}

	/// Returns true if the user holds the active-member role.
	pub fn is_active_member(&self, policy: &RolePolicy) -> bool {
		self.has_role(policy.active_member_role())
	}

	/// Returns true if the user holds the debt role.
	pub fn is_in_debt(&self, policy: &RolePolicy) -> bool {
		self.has_role(policy.debt_role())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn user(roles: &[&str]) -> AuthenticatedUser {
		AuthenticatedUser {
			id: SubjectId::new("f2b7e0f4-0d0e-4c4c-8d1f-3f4a5b6c7d8e")
				.expect("Subject fixture should be valid."),
			email: "member@example.com".into(),
			email_verified: true,
			name: "Member Example".into(),
			preferred_username: "member".into(),
			roles: RoleSet::new(roles.iter().copied()).expect("Role fixture should be valid."),
		}
	}

	#[test]
	fn role_helpers_follow_policy() {
		let policy = RolePolicy::default();
		let admin = user(&["memberportal_admin", "active_member"]);
		let debtor = user(&["in_debt"]);

		assert!(admin.is_admin(&policy));
		assert!(admin.is_active_member(&policy));
		assert!(!admin.is_in_debt(&policy));
		assert!(debtor.is_in_debt(&policy));
		assert!(!debtor.is_admin(&policy));
		assert!(debtor.has_any_role(["active_member", "in_debt"]));
		assert!(!debtor.has_any_role(["active_member"]));
	}

	#[test]
	fn serializes_roles_as_sorted_array() {
		let payload = serde_json::to_value(user(&["in_debt", "active_member"]))
			.expect("User should serialize.");

		assert_eq!(payload["roles"], serde_json::json!(["active_member", "in_debt"]));
		assert_eq!(payload["id"], "f2b7e0f4-0d0e-4c4c-8d1f-3f4a5b6c7d8e");
	}
}
