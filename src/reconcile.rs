//! Debt-role reconciliation.
//!
//! One pass walks every local member, compares the sign of their balance with the debt role held
//! at the identity provider, and fixes mismatches. Per-member failures are logged and counted; the
//! pass always continues. The pass keeps no state, so rerunning it is the recovery path.

pub mod decision;
pub mod directory;

pub use decision::*;
pub use directory::*;

// self
use crate::{
	_prelude::*,
	admin::RoleAdminClient,
	flows::ServiceCredentialTokenSource,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, FlowKind},
};

/// Result of one member's evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberStatus {
	/// The debt role was granted.
	Assigned {
		/// Balance that triggered the change.
		balance: i64,
	},
	/// The debt role was revoked.
	Removed {
		/// Balance that triggered the change.
		balance: i64,
	},
	/// Role and balance already agreed.
	Unchanged {
		/// Current balance.
		balance: i64,
	},
	/// The member has no linked identity.
	Skipped,
	/// The stored subject id is malformed.
	InvalidSubject {
		/// Validation failure.
		reason: String,
	},
	/// The balance lookup failed.
	BalanceFailed {
		/// Failure text.
		reason: String,
	},
	/// The role lookup failed.
	RoleLookupFailed {
		/// Failure text.
		reason: String,
	},
	/// Granting the role failed.
	AssignFailed {
		/// Failure text.
		reason: String,
	},
	/// Revoking the role failed.
	RemoveFailed {
		/// Failure text.
		reason: String,
	},
}

/// One member's line in the job log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberOutcome {
	/// Member email.
	pub email: String,
	/// Role under reconciliation.
	pub role: String,
	/// What happened.
	pub status: MemberStatus,
}
impl MemberOutcome {
	/// True for every failure variant.
	pub fn is_error(&self) -> bool {
		matches!(
			self.status,
			MemberStatus::InvalidSubject { .. }
				| MemberStatus::BalanceFailed { .. }
				| MemberStatus::RoleLookupFailed { .. }
				| MemberStatus::AssignFailed { .. }
				| MemberStatus::RemoveFailed { .. }
		)
	}

	/// True when a role mapping was changed.
	pub fn is_update(&self) -> bool {
		matches!(self.status, MemberStatus::Assigned { .. } | MemberStatus::Removed { .. })
	}

	fn log(&self) {
		match self.status {
			MemberStatus::Assigned { .. } | MemberStatus::Removed { .. } => tracing::info!("{self}"),
			MemberStatus::Unchanged { .. } | MemberStatus::Skipped => tracing::debug!("{self}"),
			MemberStatus::InvalidSubject { .. }
			| MemberStatus::BalanceFailed { .. }
			| MemberStatus::RoleLookupFailed { .. } => tracing::warn!("{self}"),
			MemberStatus::AssignFailed { .. } | MemberStatus::RemoveFailed { .. } =>
				tracing::error!("{self}"),
		}
	}
}
impl Display for MemberOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let Self { email, role, status } = self;

		match status {
			MemberStatus::Assigned { balance } =>
				write!(f, "✓ Assigned {role} to {email} (balance: {balance})"),
			MemberStatus::Removed { balance } =>
				write!(f, "✓ Removed {role} from {email} (balance: {balance})"),
			MemberStatus::Unchanged { balance } =>
				write!(f, "· {email} unchanged (balance: {balance})"),
			MemberStatus::Skipped => write!(f, "· Skipped {email}: no linked identity"),
			MemberStatus::InvalidSubject { reason } =>
				write!(f, "⚠ Invalid identity link for user {email}: {reason}"),
			MemberStatus::BalanceFailed { reason } =>
				write!(f, "⚠ Error getting balance for user {email}: {reason}"),
			MemberStatus::RoleLookupFailed { reason } =>
				write!(f, "⚠ Error checking roles for user {email}: {reason}"),
			MemberStatus::AssignFailed { reason } =>
				write!(f, "✗ Failed to assign {role} to {email}: {reason}"),
			MemberStatus::RemoveFailed { reason } =>
				write!(f, "✗ Failed to remove {role} from {email}: {reason}"),
		}
	}
}

/// Counters reported at the end of a pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
	/// Members listed by the directory.
	pub total: usize,
	/// Members without a linked identity.
	pub skipped: usize,
	/// Role mappings changed.
	pub updated: usize,
	/// Per-member failures.
	pub errors: usize,
}
impl ReconciliationSummary {
	/// A pass succeeds only when no member failed.
	pub fn succeeded(&self) -> bool {
		self.errors == 0
	}

	/// Final status line.
	pub fn status_line(&self) -> &'static str {
		if self.succeeded() { "✓ Job completed successfully" } else { "Job completed with errors" }
	}
}
impl Display for ReconciliationSummary {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		writeln!(f, "Summary:")?;
		writeln!(f, "  Total users: {}", self.total)?;
		writeln!(f, "  Updated: {}", self.updated)?;
		writeln!(f, "  Skipped: {}", self.skipped)?;
		write!(f, "  Errors: {}", self.errors)
	}
}

/// Everything one pass produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
	/// Counters.
	pub summary: ReconciliationSummary,
	/// Per-member outcomes in directory order.
	pub outcomes: Vec<MemberOutcome>,
}
impl ReconciliationReport {
	fn push(&mut self, outcome: MemberOutcome) {
		outcome.log();

		match outcome.status {
			MemberStatus::Skipped => self.summary.skipped += 1,
			_ if outcome.is_error() => self.summary.errors += 1,
			_ if outcome.is_update() => self.summary.updated += 1,
			_ => (),
		}

		self.outcomes.push(outcome);
	}
}

/// Reconciliation job specialized for the crate's reqwest transport.
pub type ReqwestReconciliationJob =
	DebtReconciliationJob<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Sequential balance/role reconciliation.
pub struct DebtReconciliationJob<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	directory: Arc<dyn MemberDirectory>,
	tokens: Arc<ServiceCredentialTokenSource<C, M>>,
	http: ReqwestClient,
	admin_base: Url,
	debt_role: String,
}
impl<C, M> DebtReconciliationJob<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// `admin_base` is the realm's admin root; `http` carries the admin-call timeouts.
	pub fn new(
		directory: Arc<dyn MemberDirectory>,
		tokens: Arc<ServiceCredentialTokenSource<C, M>>,
		http: ReqwestClient,
		admin_base: Url,
		debt_role: impl Into<String>,
	) -> Self {
		Self { directory, tokens, http, admin_base, debt_role: debt_role.into() }
	}

	/// Role maintained by this job.
	pub fn debt_role(&self) -> &str {
		&self.debt_role
	}

	/// Runs one pass.
	///
	/// Only failures that prevent the pass from starting are returned as errors: the directory
	/// listing and the first service token. Everything after that lands in the report.
	pub async fn run(&self) -> Result<ReconciliationReport> {
		obs::observe(FlowKind::Reconciliation, "run", async {
			self.tokens.token().await?;

			let members = self.directory.list_members().await?;
			let mut report = ReconciliationReport::default();

			report.summary.total = members.len();

			tracing::info!("Processing {} users...", members.len());

			for member in &members {
				let status = self.reconcile_member(member).await;

				report.push(MemberOutcome {
					email: member.email.clone(),
					role: self.debt_role.clone(),
					status,
				});
			}

			for line in report.summary.to_string().lines() {
				tracing::info!("{line}");
			}

			Ok(report)
		})
		.await
	}

	async fn reconcile_member(&self, member: &Member) -> MemberStatus {
		let subject = match &member.link {
			MemberLink::Linked { subject } => subject,
			MemberLink::Unlinked => return MemberStatus::Skipped,
			MemberLink::Invalid { reason, .. } =>
				return MemberStatus::InvalidSubject { reason: reason.clone() },
		};
		let balance = match self.directory.balance(member).await {
			Ok(balance) => balance,
			Err(e) => return MemberStatus::BalanceFailed { reason: e.to_string() },
		};
		// The cached token is reused until it nears expiry, so long passes survive rotation.
		let admin = match self.tokens.token().await {
			Ok(bearer) => RoleAdminClient::new(self.http.clone(), self.admin_base.clone(), bearer),
			Err(e) => return MemberStatus::RoleLookupFailed { reason: e.to_string() },
		};
		let holds = match admin.user_has_role(subject, &self.debt_role).await {
			Ok(holds) => holds,
			Err(e) => return MemberStatus::RoleLookupFailed { reason: e.to_string() },
		};

		match decide(balance, holds) {
			RoleAction::Assign => match admin.assign_role(subject, &self.debt_role).await {
				Ok(()) => MemberStatus::Assigned { balance },
				Err(e) => MemberStatus::AssignFailed { reason: e.to_string() },
			},
			RoleAction::Remove => match admin.remove_role(subject, &self.debt_role).await {
				Ok(()) => MemberStatus::Removed { balance },
				Err(e) => MemberStatus::RemoveFailed { reason: e.to_string() },
			},
			RoleAction::Keep => MemberStatus::Unchanged { balance },
		}
	}
}
impl<C, M> Debug for DebtReconciliationJob<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DebtReconciliationJob")
			.field("admin_base", &self.admin_base.as_str())
			.field("debt_role", &self.debt_role)
			.finish()
	}
}
