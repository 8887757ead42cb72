//! Realm role names, normalized role sets, and the deployment role policy.

// std
use std::{cmp::Ordering, slice::Iter};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::{_prelude::*, error::ConfigError};

/// Role unlocking the admin API.
pub const ADMIN_ROLE: &str = "memberportal_admin";
/// Role held by members with an active membership.
pub const ACTIVE_MEMBER_ROLE: &str = "active_member";
/// Role held by members with a negative balance.
pub const IN_DEBT_ROLE: &str = "in_debt";

/// Errors emitted when validating role names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum RoleValidationError {
	/// Empty role names are not allowed.
	#[error("Role names cannot be empty.")]
	Empty,
	/// Role names cannot contain whitespace characters.
	#[error("Role name contains whitespace: {role}.")]
	ContainsWhitespace {
		/// The offending role name.
		role: String,
	},
}

/// Normalized set of realm role names.
///
/// Roles are deduplicated and sorted so equality and iteration order are stable, which keeps
/// session payloads and log lines deterministic.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RoleSet(Arc<[String]>);
impl RoleSet {
	/// Creates a normalized role set from any iterator.
	pub fn new<I, S>(roles: I) -> Result<Self, RoleValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		normalize(roles).map(Self)
	}

	/// Number of distinct roles.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no roles are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains `role`.
	pub fn contains(&self, role: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(role)).is_ok()
	}

	/// Iterator over role names in sorted order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Keeps only the candidates present in this set.
	///
	/// Candidates are untrusted claim values: anything outside the set is dropped, including
	/// malformed names.
	pub fn retain_allowed<'a, I>(&self, candidates: I) -> RoleSet
	where
		I: IntoIterator<Item = &'a str>,
	{
		let kept = candidates
			.into_iter()
			.filter(|candidate| self.contains(candidate))
			.map(str::to_owned)
			.collect::<BTreeSet<_>>();

		Self(Arc::from(kept.into_iter().collect::<Vec<_>>()))
	}

	/// Comma-separated rendering used in operator-facing messages.
	pub fn joined(&self, separator: &str) -> String {
		self.0.join(separator)
	}
}
impl PartialOrd for RoleSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for RoleSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.cmp(&other.0)
	}
}
impl Debug for RoleSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("RoleSet").field(&self.0).finish()
	}
}
impl Display for RoleSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.joined(", "))
	}
}
impl FromStr for RoleSet {
	type Err = RoleValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s.split(',').map(str::trim).filter(|role| !role.is_empty()))
	}
}

/// Iterator over role names.
pub struct RoleIter<'a> {
	inner: Iter<'a, String>,
}
impl<'a> Iterator for RoleIter<'a> {
	type Item = &'a str;

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(String::as_str)
	}
}
impl<'a> IntoIterator for &'a RoleSet {
	type IntoIter = RoleIter<'a>;
	type Item = &'a str;

	fn into_iter(self) -> Self::IntoIter {
		RoleIter { inner: self.0.iter() }
	}
}
impl Serialize for RoleSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.0.len()))?;

		for role in self.0.iter() {
			seq.serialize_element(role)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for RoleSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		RoleSet::new(values).map_err(DeError::custom)
	}
}

/// Deployment-supplied role names and allow-lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolePolicy {
	session_roles: RoleSet,
	managed_roles: RoleSet,
	admin_role: String,
	debt_role: String,
	active_member_role: String,
}
impl RolePolicy {
	/// Builds a policy, rejecting a managed set that would let the admin API grant admin rights.
	pub fn new(
		session_roles: RoleSet,
		managed_roles: RoleSet,
		admin_role: impl Into<String>,
		debt_role: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let admin_role = validate_name(admin_role.into())?;
		let debt_role = validate_name(debt_role.into())?;

		if managed_roles.contains(&admin_role) {
			return Err(ConfigError::AdminRoleManaged { role: admin_role });
		}

		Ok(Self {
			session_roles,
			managed_roles,
			admin_role,
			debt_role,
			active_member_role: ACTIVE_MEMBER_ROLE.into(),
		})
	}

	/// Overrides the active-member role name.
	pub fn with_active_member_role(mut self, role: impl Into<String>) -> Result<Self, ConfigError> {
		self.active_member_role = validate_name(role.into())?;

		Ok(self)
	}

	/// Roles copied from identity-token claims into the session.
	pub fn session_roles(&self) -> &RoleSet {
		&self.session_roles
	}

	/// Roles the admin API may assign or remove.
	pub fn managed_roles(&self) -> &RoleSet {
		&self.managed_roles
	}

	/// Role that unlocks the admin API.
	pub fn admin_role(&self) -> &str {
		&self.admin_role
	}

	/// Role maintained by debt reconciliation.
	pub fn debt_role(&self) -> &str {
		&self.debt_role
	}

	/// Role marking an active membership.
	pub fn active_member_role(&self) -> &str {
		&self.active_member_role
	}
}
impl Default for RolePolicy {
	fn default() -> Self {
		Self {
			session_roles: RoleSet(Arc::from(
				[ACTIVE_MEMBER_ROLE, IN_DEBT_ROLE, ADMIN_ROLE].map(String::from).to_vec(),
			)),
			managed_roles: RoleSet(Arc::from(
				[ACTIVE_MEMBER_ROLE, IN_DEBT_ROLE].map(String::from).to_vec(),
			)),
			admin_role: ADMIN_ROLE.into(),
			debt_role: IN_DEBT_ROLE.into(),
			active_member_role: ACTIVE_MEMBER_ROLE.into(),
		}
	}
}

fn validate_name(role: String) -> Result<String, RoleValidationError> {
	if role.is_empty() {
		return Err(RoleValidationError::Empty);
	}
	if role.chars().any(char::is_whitespace) {
		return Err(RoleValidationError::ContainsWhitespace { role });
	}

	Ok(role)
}

fn normalize<I, S>(roles: I) -> Result<Arc<[String]>, RoleValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for role in roles {
		set.insert(validate_name(role.into())?);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}
