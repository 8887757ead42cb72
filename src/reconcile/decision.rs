//! Balance/role decision table.

/// Mutation required to bring a member's debt role in line with their balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoleAction {
	/// The member owes money and lacks the role.
	Assign,
	/// The member is settled and still holds the role.
	Remove,
	/// Role and balance already agree.
	Keep,
}

/// Negative balances require the debt role; zero and positive balances forbid it.
pub fn decide(balance: i64, holds_role: bool) -> RoleAction {
	match (balance < 0, holds_role) {
		(true, false) => RoleAction::Assign,
		(false, true) => RoleAction::Remove,
		_ => RoleAction::Keep,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn decision_table_covers_every_combination() {
		assert_eq!(decide(-500, false), RoleAction::Assign);
		assert_eq!(decide(-1, true), RoleAction::Keep);
		assert_eq!(decide(0, true), RoleAction::Remove);
		assert_eq!(decide(250, true), RoleAction::Remove);
		assert_eq!(decide(0, false), RoleAction::Keep);
		assert_eq!(decide(i64::MAX, false), RoleAction::Keep);
	}
}
