//! Local member directory consulted by the reconciliation job.
//!
//! The portal's persistence layer owns members and balances. The job only needs two reads: every
//! member with their linked identity, and one member's signed balance.

// std
use std::path::{Path, PathBuf};
// self
use crate::{_prelude::*, auth::SubjectId};

/// Boxed future returned by [`MemberDirectory`] implementations.
pub type DirectoryFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + 'a + Send>>;

/// Read-only view of the portal's members.
pub trait MemberDirectory
where
	Self: Send + Sync,
{
	/// Every member known to the portal, linked or not.
	fn list_members(&self) -> DirectoryFuture<'_, Vec<Member>>;

	/// Signed balance in whole currency units. Negative means the member owes money.
	fn balance<'a>(&'a self, member: &'a Member) -> DirectoryFuture<'a, i64>;
}

/// Directory failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DirectoryError {
	/// The backing storage failed.
	#[error("Member directory backend error: {}.", .message.trim_end_matches('.'))]
	Backend {
		/// Backend message.
		message: String,
	},
	/// Stored data could not be decoded.
	#[error("Member directory data is malformed: {}.", .message.trim_end_matches('.'))]
	Serialization {
		/// Decoder message.
		message: String,
	},
	/// The balance for one member could not be computed.
	#[error("Balance for member {member} is unavailable: {}.", .message.trim_end_matches('.'))]
	Balance {
		/// Local member id.
		member: i64,
		/// Backend message.
		message: String,
	},
}

/// Link between a portal member and the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MemberLink {
	/// The member never signed in.
	Unlinked,
	/// Linked identity-provider subject.
	Linked {
		/// Subject id.
		subject: SubjectId,
	},
	/// The stored subject id is not a valid identifier.
	Invalid {
		/// Value as stored.
		raw: String,
		/// Validation failure.
		reason: String,
	},
}

/// Portal member as seen by reconciliation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
	/// Local member id.
	pub id: i64,
	/// Contact email, used in log lines.
	pub email: String,
	/// Identity-provider link.
	pub link: MemberLink,
}
impl Member {
	/// Builds a member; a blank `subject` means no linked identity.
	///
	/// A malformed subject is kept as [`MemberLink::Invalid`] so one bad row only fails that
	/// member.
	pub fn new(id: i64, email: impl Into<String>, subject: Option<&str>) -> Self {
		let link = match subject.map(str::trim).filter(|subject| !subject.is_empty()) {
			None => MemberLink::Unlinked,
			Some(raw) => match SubjectId::new(raw) {
				Ok(subject) => MemberLink::Linked { subject },
				Err(e) => MemberLink::Invalid { raw: raw.to_owned(), reason: e.to_string() },
			},
		};

		Self { id, email: email.into(), link }
	}

	/// Linked subject, if valid.
	pub fn subject(&self) -> Option<&SubjectId> {
		match &self.link {
			MemberLink::Linked { subject } => Some(subject),
			_ => None,
		}
	}
}

#[derive(Debug, Default)]
struct MemoryState {
	members: Vec<Member>,
	balances: HashMap<i64, i64>,
	failing_balances: BTreeSet<i64>,
	listing_failure: Option<String>,
}

/// In-memory directory with scriptable failures.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
	inner: Arc<Mutex<MemoryState>>,
}
impl MemoryDirectory {
	/// Adds or replaces a member together with their balance.
	pub fn insert(&self, member: Member, balance: i64) {
		let mut state = self.inner.lock();

		state.members.retain(|existing| existing.id != member.id);
		state.balances.insert(member.id, balance);
		state.members.push(member);
	}

	/// Overwrites one member's balance.
	pub fn set_balance(&self, member: i64, balance: i64) {
		self.inner.lock().balances.insert(member, balance);
	}

	/// Makes balance lookups for `member` fail until cleared.
	pub fn fail_balance(&self, member: i64, failing: bool) {
		let mut state = self.inner.lock();

		if failing {
			state.failing_balances.insert(member);
		} else {
			state.failing_balances.remove(&member);
		}
	}

	/// Makes [`MemberDirectory::list_members`] fail with `message`.
	pub fn fail_listing(&self, message: Option<&str>) {
		self.inner.lock().listing_failure = message.map(str::to_owned);
	}
}
impl MemberDirectory for MemoryDirectory {
	fn list_members(&self) -> DirectoryFuture<'_, Vec<Member>> {
		Box::pin(async move {
			let state = self.inner.lock();

			if let Some(message) = &state.listing_failure {
				return Err(DirectoryError::Backend { message: message.clone() });
			}

			Ok(state.members.clone())
		})
	}

	fn balance<'a>(&'a self, member: &'a Member) -> DirectoryFuture<'a, i64> {
		Box::pin(async move {
			let state = self.inner.lock();

			if state.failing_balances.contains(&member.id) {
				return Err(DirectoryError::Balance {
					member: member.id,
					message: "lookup failed".into(),
				});
			}

			Ok(state.balances.get(&member.id).copied().unwrap_or_default())
		})
	}
}

#[derive(Debug, Deserialize)]
struct MemberRecord {
	id: i64,
	email: String,
	#[serde(default)]
	keycloak_id: Option<String>,
	#[serde(default)]
	balance: i64,
}

/// Directory loaded from a JSON snapshot exported by the portal database.
///
/// The file holds an array of `{"id", "email", "keycloak_id", "balance"}` objects. A missing or
/// empty `keycloak_id` marks an unlinked member.
#[derive(Clone, Debug)]
pub struct FileDirectory {
	path: PathBuf,
	members: Arc<[Member]>,
	balances: Arc<HashMap<i64, i64>>,
}
impl FileDirectory {
	/// Reads and validates the snapshot.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
		let path = path.into();
		let bytes = tokio::fs::read(&path).await.map_err(|e| DirectoryError::Backend {
			message: format!("failed to read {}: {e}", path.display()),
		})?;
		let records = Self::parse(&path, &bytes)?;
		let mut members = Vec::with_capacity(records.len());
		let mut balances = HashMap::with_capacity(records.len());

		for record in records {
			balances.insert(record.id, record.balance);
			members.push(Member::new(record.id, record.email, record.keycloak_id.as_deref()));
		}

		for member in &members {
			if let MemberLink::Invalid { raw, reason } = &member.link {
				tracing::warn!(
					member = member.id,
					raw = %raw,
					reason = %reason,
					"malformed subject id in snapshot"
				);
			}
		}

		tracing::debug!(path = %path.display(), members = members.len(), "member snapshot loaded");

		Ok(Self { path, members: members.into(), balances: Arc::new(balances) })
	}

	/// Snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn parse(path: &Path, bytes: &[u8]) -> Result<Vec<MemberRecord>, DirectoryError> {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(Vec::new());
		}

		serde_json::from_slice(bytes).map_err(|e| DirectoryError::Serialization {
			message: format!("failed to parse {}: {e}", path.display()),
		})
	}
}
impl MemberDirectory for FileDirectory {
	fn list_members(&self) -> DirectoryFuture<'_, Vec<Member>> {
		Box::pin(async move { Ok(self.members.to_vec()) })
	}

	fn balance<'a>(&'a self, member: &'a Member) -> DirectoryFuture<'a, i64> {
		Box::pin(async move {
			self.balances.get(&member.id).copied().ok_or_else(|| DirectoryError::Balance {
				member: member.id,
				message: "member is not in the snapshot".into(),
			})
		})
	}
}
