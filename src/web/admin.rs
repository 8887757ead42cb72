//! Admin role endpoints.
//!
//! Responses use the `{"success", "message" | "error" | "roles"}` envelope. Only roles in the
//! policy's managed set can be changed, whatever the caller's own privileges.

// crates.io
use axum::{
	Json,
	extract::{Query, State, rejection::JsonRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
};
// self
use crate::{
	_prelude::*,
	admin::{Role, RoleAdminClient},
	auth::SubjectId,
	web::{AppState, SharedState},
};

/// Body of the assign/remove endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RoleChangeRequest {
	/// Identity-provider subject id.
	#[serde(default)]
	pub user_id: String,
	/// Realm role name.
	#[serde(default)]
	pub role_name: String,
}

/// Query of the role listing endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserRolesQuery {
	/// Identity-provider subject id.
	#[serde(default)]
	pub user_id: String,
}

/// JSON envelope returned by every admin endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminEnvelope {
	/// Whether the operation succeeded.
	pub success: bool,
	/// Success message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// Failure message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Roles returned by the listing endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub roles: Option<Vec<Role>>,
}
impl AdminEnvelope {
	fn message(message: impl Into<String>) -> Json<Self> {
		Json(Self { success: true, message: Some(message.into()), ..Default::default() })
	}
}

/// Failure rendered as an envelope with `success: false`.
#[derive(Debug)]
pub struct AdminFailure {
	status: StatusCode,
	error: String,
}
impl AdminFailure {
	fn bad_request(error: impl Into<String>) -> Self {
		Self { status: StatusCode::BAD_REQUEST, error: error.into() }
	}

	fn internal(error: impl Into<String>) -> Self {
		Self { status: StatusCode::INTERNAL_SERVER_ERROR, error: error.into() }
	}
}
impl IntoResponse for AdminFailure {
	fn into_response(self) -> Response {
		if self.status.is_server_error() {
			tracing::error!(status = self.status.as_u16(), error = %self.error, "admin request failed");
		}

		let envelope = AdminEnvelope { success: false, error: Some(self.error), ..Default::default() };

		(self.status, Json(envelope)).into_response()
	}
}

/// `POST /api/admin/roles/assign`. A role the user already holds is reported as success.
pub async fn assign_role(
	State(state): State<SharedState>,
	payload: Result<Json<RoleChangeRequest>, JsonRejection>,
) -> Result<Json<AdminEnvelope>, AdminFailure> {
	let (subject, role) = validate(&state, payload)?;
	let admin = admin_client(&state).await?;
	let failed = |e: Error| AdminFailure::internal(format!("Failed to assign role: {e}"));

	if admin.user_has_role(&subject, &role).await.map_err(failed)? {
		return Ok(AdminEnvelope::message(format!("User {subject} already has role {role}")));
	}

	admin.assign_role(&subject, &role).await.map_err(failed)?;

	tracing::info!(subject = %subject, role = %role, "role assigned through admin API");

	Ok(AdminEnvelope::message(format!("Role {role} assigned to user {subject}")))
}

/// `POST /api/admin/roles/remove`.
pub async fn remove_role(
	State(state): State<SharedState>,
	payload: Result<Json<RoleChangeRequest>, JsonRejection>,
) -> Result<Json<AdminEnvelope>, AdminFailure> {
	let (subject, role) = validate(&state, payload)?;
	let admin = admin_client(&state).await?;

	admin
		.remove_role(&subject, &role)
		.await
		.map_err(|e| AdminFailure::internal(format!("Failed to remove role: {e}")))?;

	tracing::info!(subject = %subject, role = %role, "role removed through admin API");

	Ok(AdminEnvelope::message(format!("Role {role} removed from user {subject}")))
}

/// `GET /api/admin/users/roles?user_id=`.
pub async fn user_roles(
	State(state): State<SharedState>,
	Query(query): Query<UserRolesQuery>,
) -> Result<Json<AdminEnvelope>, AdminFailure> {
	let user_id = query.user_id.trim();

	if user_id.is_empty() {
		return Err(AdminFailure::bad_request("user_id query parameter is required"));
	}

	let subject = SubjectId::new(user_id)
		.map_err(|e| AdminFailure::bad_request(format!("Invalid user_id: {e}")))?;
	let roles = admin_client(&state)
		.await?
		.get_user_roles(&subject)
		.await
		.map_err(|e| AdminFailure::internal(format!("Failed to get user roles: {e}")))?;

	Ok(Json(AdminEnvelope { success: true, roles: Some(roles), ..Default::default() }))
}

fn validate(
	state: &AppState,
	payload: Result<Json<RoleChangeRequest>, JsonRejection>,
) -> Result<(SubjectId, String), AdminFailure> {
	let Json(request) = payload.map_err(|rejection| {
		tracing::debug!(error = %rejection, "rejected admin request body");

		AdminFailure::bad_request("Invalid request body")
	})?;
	let user_id = request.user_id.trim();
	let role_name = request.role_name.trim();

	if user_id.is_empty() || role_name.is_empty() {
		return Err(AdminFailure::bad_request("user_id and role_name are required"));
	}

	let managed = state.policy().managed_roles();

	if !managed.contains(role_name) {
		return Err(AdminFailure::bad_request(format!(
			"Invalid role: {role_name}. Allowed roles: {}",
			managed.joined(", ")
		)));
	}

	let subject = SubjectId::new(user_id)
		.map_err(|e| AdminFailure::bad_request(format!("Invalid user_id: {e}")))?;

	Ok((subject, role_name.to_owned()))
}

async fn admin_client(state: &AppState) -> Result<RoleAdminClient, AdminFailure> {
	let services = state
		.admin
		.as_ref()
		.ok_or_else(|| AdminFailure::internal("Service account not configured"))?;

	services
		.client()
		.await
		.map_err(|e| AdminFailure::internal(format!("Failed to get service account token: {e}")))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelope_omits_absent_fields() {
		let Json(success) = AdminEnvelope::message("done");
		let wire = serde_json::to_value(&success).expect("Envelope should serialize.");

		assert_eq!(wire, serde_json::json!({ "success": true, "message": "done" }));

		let failure = AdminEnvelope { success: false, error: Some("nope".into()), ..Default::default() };

		assert_eq!(
			serde_json::to_value(&failure).expect("Envelope should serialize."),
			serde_json::json!({ "success": false, "error": "nope" })
		);
	}
}
