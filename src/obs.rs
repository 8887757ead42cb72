//! Observability helpers for identity flows.
//!
//! - Every flow runs inside a `memberportal_identity.flow` span carrying the `flow` and `stage`
//!   fields.
//! - Enable `metrics` to increment the `memberportal_identity_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//! - Binaries call [`install_subscriber`] once at startup.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Flow kinds observed by the identity core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Building the authorization redirect.
	Login,
	/// Handling the authorization callback.
	Callback,
	/// Fetching or refreshing the service credential.
	ServiceCredential,
	/// Calling the realm admin API.
	AdminApi,
	/// One reconciliation pass.
	Reconciliation,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Login => "login",
			FlowKind::Callback => "callback",
			FlowKind::ServiceCredential => "service_credential",
			FlowKind::AdminApi => "admin_api",
			FlowKind::Reconciliation => "reconciliation",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records attempt plus success/failure outcomes.
pub async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
