//! Best-effort audit trail for login events.

// self
use crate::{_prelude::*, auth::AuthenticatedUser};

/// Boxed future returned by [`AuditSink`] implementations.
pub type AuditFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AuditError>> + 'a + Send>>;

/// Destination for audit entries. Callers never fail an operation because an entry was lost.
pub trait AuditSink
where
	Self: Send + Sync,
{
	/// Records one entry.
	fn record<'a>(&'a self, entry: &'a AuditEntry) -> AuditFuture<'a>;
}

/// Failure reported by an [`AuditSink`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Audit entry could not be recorded: {}.", .message.trim_end_matches('.'))]
pub struct AuditError {
	/// Backend message.
	pub message: String,
}

/// Severity carried by an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
	/// Routine event.
	Info,
	/// Unusual but handled event.
	Warn,
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
	/// Subsystem that produced the entry.
	pub subsystem: String,
	/// Severity.
	pub level: AuditLevel,
	/// Human-readable message.
	pub message: String,
	/// Structured metadata.
	pub metadata: serde_json::Value,
	/// Event time.
	#[serde(with = "time::serde::rfc3339")]
	pub at: OffsetDateTime,
}
impl AuditEntry {
	/// Entry written after a successful interactive login.
	pub fn login(user: &AuthenticatedUser) -> Self {
		Self {
			subsystem: "auth".into(),
			level: AuditLevel::Info,
			message: format!("User login: {}", user.email),
			metadata: serde_json::json!({
				"keycloak_id": user.id.to_string(),
				"email": user.email,
			}),
			at: OffsetDateTime::now_utc(),
		}
	}
}

/// Emits entries as `tracing` events under the `audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;
impl AuditSink for TracingAuditSink {
	fn record<'a>(&'a self, entry: &'a AuditEntry) -> AuditFuture<'a> {
		Box::pin(async move {
			match entry.level {
				AuditLevel::Info => tracing::info!(
					target: "audit",
					subsystem = %entry.subsystem,
					metadata = %entry.metadata,
					"{}",
					entry.message
				),
				AuditLevel::Warn => tracing::warn!(
					target: "audit",
					subsystem = %entry.subsystem,
					metadata = %entry.metadata,
					"{}",
					entry.message
				),
			}

			Ok(())
		})
	}
}

/// Collects entries in memory; can be switched to fail every write.
#[derive(Clone, Debug, Default)]
pub struct MemoryAuditSink {
	entries: Arc<Mutex<Vec<AuditEntry>>>,
	failing: Arc<Mutex<bool>>,
}
impl MemoryAuditSink {
	/// Recorded entries in insertion order.
	pub fn entries(&self) -> Vec<AuditEntry> {
		self.entries.lock().clone()
	}

	/// Makes subsequent writes fail.
	pub fn fail_writes(&self, failing: bool) {
		*self.failing.lock() = failing;
	}
}
impl AuditSink for MemoryAuditSink {
	fn record<'a>(&'a self, entry: &'a AuditEntry) -> AuditFuture<'a> {
		Box::pin(async move {
			if *self.failing.lock() {
				return Err(AuditError { message: "sink unavailable".into() });
			}

			self.entries.lock().push(entry.clone());

			Ok(())
		})
	}
}
