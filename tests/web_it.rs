mod common;

// std
use std::sync::Arc;
// crates.io
use axum::{
	Router,
	body::{Body, to_bytes},
	http::{Method, Request, StatusCode, header},
	response::Response,
};
use httpmock::prelude::POST;
use serde_json::{Value, json};
use tower::ServiceExt;
// self
use common::*;
use memberportal_identity::{
	audit::MemoryAuditSink,
	auth::{ADMIN_ROLE, AuthenticatedUser, RoleSet, SubjectId, TokenSecret},
	flows::ReqwestInteractiveFlow,
	idp::IdpGateway,
	reqwest::Client,
	session::{CookieSessionStore, SESSION_COOKIE_NAME, Session, SessionCookie, SessionStore},
	url::Url,
	web::{self, AdminServices, AppState},
};

struct Harness {
	router: Router,
	sessions: Arc<CookieSessionStore>,
	audit: MemoryAuditSink,
}
impl Harness {
	fn new(flow: impl FnOnce(&MemoryAuditSink) -> ReqwestInteractiveFlow, admin: Option<AdminServices>) -> Self {
		let audit = MemoryAuditSink::default();
		let sessions = Arc::new(CookieSessionStore::new(&TokenSecret::new("web-test-secret")));
		let mut state =
			AppState::new(Arc::new(flow(&audit)), sessions.clone(), SessionCookie::new(false));

		if let Some(admin) = admin {
			state = state.with_admin(admin);
		}

		Self { router: web::router(state), sessions, audit }
	}

	async fn ready(idp: &MockIdp, with_admin: bool) -> Self {
		let gateway = idp.gateway().await;

		assert!(!gateway.is_degraded(), "Mock discovery should succeed.");

		let admin = with_admin.then(|| {
			AdminServices::new(Arc::new(idp.token_source()), Client::new(), idp.admin_base())
		});

		Self::new(|audit| interactive_flow(&gateway, audit), admin)
	}

	async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
		self.send(Method::GET, uri, cookie, Body::empty()).await
	}

	async fn post_json(&self, uri: &str, cookie: Option<&str>, body: &Value) -> Response {
		self.send(Method::POST, uri, cookie, Body::from(body.to_string())).await
	}

	async fn send(&self, method: Method, uri: &str, cookie: Option<&str>, body: Body) -> Response {
		let mut request = Request::builder()
			.method(method)
			.uri(uri)
			.header(header::CONTENT_TYPE, "application/json");

		if let Some(cookie) = cookie {
			request = request.header(header::COOKIE, cookie);
		}

		self.router
			.clone()
			.oneshot(request.body(body).expect("Request should build."))
			.await
			.expect("Router should answer.")
	}

	/// Cookie header for a session that already carries a signed-in user.
	async fn signed_in(&self, roles: &[&str]) -> String {
		let mut session = Session::new();

		session.set_user(AuthenticatedUser {
			id: SubjectId::new("kc-caller").expect("Subject fixture should be valid."),
			email: "caller@example.com".into(),
			email_verified: true,
			name: "Caller".into(),
			preferred_username: "caller".into(),
			roles: RoleSet::new(roles.iter().copied()).expect("Role fixture should be valid."),
		});

		let value = self.sessions.save(&mut session).await.expect("Session should save.");

		format!("{SESSION_COOKIE_NAME}={value}")
	}
}

fn set_cookie(response: &Response) -> Option<String> {
	response
		.headers()
		.get(header::SET_COOKIE)
		.and_then(|value| value.to_str().ok())
		.map(str::to_owned)
}

fn cookie_pair(response: &Response) -> String {
	let raw = set_cookie(response).expect("Response should set the session cookie.");

	raw.split(';').next().expect("Cookie should have a name=value pair.").to_owned()
}

fn location(response: &Response) -> String {
	response
		.headers()
		.get(header::LOCATION)
		.and_then(|value| value.to_str().ok())
		.expect("Redirect should carry a location.")
		.to_owned()
}

async fn text(response: Response) -> String {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("Body should read.");

	String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8.")
}

async fn json_body(response: Response) -> Value {
	serde_json::from_str(&text(response).await).expect("Body should be JSON.")
}

#[tokio::test]
async fn login_redirects_to_provider_and_sets_cookie() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let harness = Harness::ready(&idp, false).await;
	let response = harness.get("/auth/login", None).await;

	assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

	let target = Url::parse(&location(&response)).expect("Location should be absolute.");
	let cookie = set_cookie(&response).expect("Login should set the session cookie.");

	assert!(target.path().ends_with("/protocol/openid-connect/auth"));
	assert!(!state_from(&target).is_empty());
	assert!(cookie.starts_with(SESSION_COOKIE_NAME));
	assert!(cookie.contains("HttpOnly"));
	assert!(cookie.contains("SameSite=Lax"));
	assert!(!cookie.contains("Secure"));
}

#[tokio::test]
async fn degraded_login_is_service_unavailable() {
	let harness =
		Harness::new(|audit| interactive_flow(&IdpGateway::degraded("connection refused"), audit), None);
	let response = harness.get("/auth/login", None).await;

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert!(text(response).await.starts_with("Unavailable:"));
}

#[tokio::test]
async fn callback_signs_in_and_rejects_replay() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let harness = Harness::ready(&idp, false).await;
	let login = harness.get("/auth/login", None).await;
	let login_cookie = cookie_pair(&login);
	let state = state_from(&Url::parse(&location(&login)).expect("Location should parse."));
	let claims = id_token_claims(&idp.issuer(), "kc-web", "web@example.com", &["active_member"]);
	let _token = idp.mock_token(200, code_exchange_body(Some(&sign_id_token(&claims)))).await;
	let callback_uri = format!("/auth/callback?code=web-code&state={state}");
	let callback = harness.get(&callback_uri, Some(&login_cookie)).await;

	assert_eq!(callback.status(), StatusCode::TEMPORARY_REDIRECT);
	assert_eq!(location(&callback), "/dashboard");

	let session_cookie = cookie_pair(&callback);
	let me = harness.get("/api/me", Some(&session_cookie)).await;

	assert_eq!(me.status(), StatusCode::OK);

	let me = json_body(me).await;

	assert_eq!(me["email"], "web@example.com");
	assert_eq!(me["roles"], json!(["active_member"]));
	assert_eq!(harness.audit.entries().len(), 1);

	let replay = harness.get(&callback_uri, Some(&login_cookie)).await;

	assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
	assert!(set_cookie(&replay).is_none());
	assert!(text(replay).await.starts_with("InvalidState:"));
}

#[tokio::test]
async fn tampered_token_fails_without_cookie_or_audit() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let harness = Harness::ready(&idp, false).await;
	let login = harness.get("/auth/login", None).await;
	let login_cookie = cookie_pair(&login);
	let state = state_from(&Url::parse(&location(&login)).expect("Location should parse."));
	let claims = id_token_claims(&idp.issuer(), "kc-evil", "evil@example.com", &[ADMIN_ROLE]);
	let forged = tamper_signature(&sign_id_token(&claims));
	let _token = idp.mock_token(200, code_exchange_body(Some(&forged))).await;
	let response = harness
		.get(&format!("/auth/callback?code=web-code&state={state}"), Some(&login_cookie))
		.await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert!(set_cookie(&response).is_none());
	assert!(text(response).await.starts_with("VerificationFailed:"));
	assert!(harness.audit.entries().is_empty());
}

#[tokio::test]
async fn anonymous_me_redirects_to_login() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let response = harness.get("/api/me", None).await;

	assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
	assert_eq!(location(&response), "/auth/login");
}

#[tokio::test]
async fn logout_expires_cookie_and_revokes_session() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let cookie = harness.signed_in(&["active_member"]).await;

	assert_eq!(harness.get("/api/me", Some(&cookie)).await.status(), StatusCode::OK);

	let logout = harness.get("/auth/logout", Some(&cookie)).await;

	assert_eq!(logout.status(), StatusCode::TEMPORARY_REDIRECT);
	assert_eq!(location(&logout), "/");
	assert!(set_cookie(&logout).expect("Logout should expire the cookie.").contains("Max-Age=0"));

	let replay = harness.get("/api/me", Some(&cookie)).await;

	assert_eq!(replay.status(), StatusCode::TEMPORARY_REDIRECT);
	assert_eq!(location(&replay), "/auth/login");
}

#[tokio::test]
async fn admin_endpoints_require_admin_role() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let body = json!({ "user_id": "kc-target", "role_name": "in_debt" });
	let anonymous = harness.post_json("/api/admin/roles/assign", None, &body).await;

	assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(text(anonymous).await, "Unauthorized");

	let member = harness.signed_in(&["active_member"]).await;
	let forbidden = harness.post_json("/api/admin/roles/assign", Some(&member), &body).await;

	assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
	assert_eq!(text(forbidden).await, "Forbidden - admin access required");
}

#[tokio::test]
async fn admin_role_cannot_be_granted_through_the_api() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let admin = harness.signed_in(&[ADMIN_ROLE]).await;
	let response = harness
		.post_json(
			"/api/admin/roles/assign",
			Some(&admin),
			&json!({ "user_id": "kc-target", "role_name": ADMIN_ROLE }),
		)
		.await;

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(
		json_body(response).await,
		json!({
			"success": false,
			"error": "Invalid role: memberportal_admin. Allowed roles: active_member, in_debt"
		})
	);
}

#[tokio::test]
async fn malformed_admin_requests_are_bad_requests() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let admin = harness.signed_in(&[ADMIN_ROLE]).await;
	let garbage = harness
		.send(Method::POST, "/api/admin/roles/remove", Some(&admin), Body::from("{not json"))
		.await;

	assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(garbage).await["error"], "Invalid request body");

	let blank = harness
		.post_json("/api/admin/roles/remove", Some(&admin), &json!({ "user_id": "kc-target" }))
		.await;

	assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(blank).await["error"], "user_id and role_name are required");

	let listing = harness.get("/api/admin/users/roles", Some(&admin)).await;

	assert_eq!(listing.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json_body(listing).await["error"], "user_id query parameter is required");
}

#[tokio::test]
async fn admin_without_service_account_reports_configuration() {
	let harness = Harness::new(|audit| interactive_flow(&IdpGateway::degraded("down"), audit), None);
	let admin = harness.signed_in(&[ADMIN_ROLE]).await;
	let response = harness
		.post_json(
			"/api/admin/roles/assign",
			Some(&admin),
			&json!({ "user_id": "kc-target", "role_name": "in_debt" }),
		)
		.await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(
		json_body(response).await,
		json!({ "success": false, "error": "Service account not configured" })
	);
}

#[tokio::test]
async fn assign_checks_membership_before_mutating() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _role = idp.mock_role("in_debt").await;
	let _target_roles = idp.mock_user_roles("kc-target", &[]).await;
	let assign = idp.mock_role_mapping(POST, "kc-target", 204).await;
	let _held_roles = idp.mock_user_roles("kc-held", &["in_debt"]).await;
	let held_assign = idp.mock_role_mapping(POST, "kc-held", 204).await;
	let harness = Harness::ready(&idp, true).await;
	let admin = harness.signed_in(&[ADMIN_ROLE]).await;
	let assigned = harness
		.post_json(
			"/api/admin/roles/assign",
			Some(&admin),
			&json!({ "user_id": "kc-target", "role_name": "in_debt" }),
		)
		.await;

	assert_eq!(assigned.status(), StatusCode::OK);
	assert_eq!(
		json_body(assigned).await,
		json!({ "success": true, "message": "Role in_debt assigned to user kc-target" })
	);

	let held = harness
		.post_json(
			"/api/admin/roles/assign",
			Some(&admin),
			&json!({ "user_id": "kc-held", "role_name": "in_debt" }),
		)
		.await;

	assert_eq!(held.status(), StatusCode::OK);
	assert_eq!(json_body(held).await["message"], "User kc-held already has role in_debt");

	assign.assert_calls_async(1).await;
	held_assign.assert_calls_async(0).await;
}

#[tokio::test]
async fn user_roles_are_listed_in_envelope() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _roles = idp.mock_user_roles("kc-listed", &["active_member", "in_debt"]).await;
	let harness = Harness::ready(&idp, true).await;
	let admin = harness.signed_in(&[ADMIN_ROLE]).await;
	let response = harness.get("/api/admin/users/roles?user_id=kc-listed", Some(&admin)).await;

	assert_eq!(response.status(), StatusCode::OK);

	let body = json_body(response).await;

	assert_eq!(body["success"], true);
	assert_eq!(body["roles"][1]["name"], "in_debt");
}

#[tokio::test]
async fn anonymous_traffic_leaves_no_revocations() {
	let idp = MockIdp::start().await;
	let _oidc = idp.mock_oidc().await;
	let harness = Harness::ready(&idp, false).await;

	for _ in 0..50 {
		let callback = harness.get("/auth/callback?state=x&code=y", None).await;

		assert_eq!(callback.status(), StatusCode::BAD_REQUEST);
		assert_eq!(
			harness.get("/auth/logout", None).await.status(),
			StatusCode::TEMPORARY_REDIRECT
		);
	}

	assert_eq!(harness.sessions.revoked_len(), 0);

	let cookie = harness.signed_in(&["active_member"]).await;

	harness.get("/auth/logout", Some(&cookie)).await;

	assert_eq!(harness.sessions.revoked_len(), 1);
}
