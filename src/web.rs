//! HTTP surface of the identity core.
//!
//! Every handler receives the session store through [`AppState`]; nothing is read from globals.
//! Authentication failures render as plain text pages carrying the error category, admin failures
//! as the JSON envelope defined in [`admin`].

pub mod admin;
pub mod auth;

// std
use std::io;
// crates.io
use axum::{
	Router,
	extract::{Request, State},
	http::StatusCode,
	middleware::{self, Next},
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
use axum_extra::extract::CookieJar;
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	admin::RoleAdminClient,
	auth::{AuthenticatedUser, RolePolicy},
	flows::{ReqwestInteractiveFlow, ReqwestTokenSource},
	session::{Session, SessionCookie, SessionStore},
};

/// Shared handler state.
pub type SharedState = Arc<AppState>;

/// Service-credential wiring for the admin endpoints.
#[derive(Clone)]
pub struct AdminServices {
	tokens: Arc<ReqwestTokenSource>,
	http: ReqwestClient,
	admin_base: Url,
}
impl AdminServices {
	/// `http` should carry the identity-provider timeouts.
	pub fn new(tokens: Arc<ReqwestTokenSource>, http: ReqwestClient, admin_base: Url) -> Self {
		Self { tokens, http, admin_base }
	}

	/// Admin client bound to a current service token.
	pub async fn client(&self) -> Result<RoleAdminClient> {
		let bearer = self.tokens.token().await?;

		Ok(RoleAdminClient::new(self.http.clone(), self.admin_base.clone(), bearer))
	}
}
impl Debug for AdminServices {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AdminServices")
			.field("tokens", &self.tokens)
			.field("admin_base", &self.admin_base.as_str())
			.finish()
	}
}

/// Everything the handlers need.
pub struct AppState {
	/// Interactive login flow.
	pub flow: Arc<ReqwestInteractiveFlow>,
	/// Session capability.
	pub sessions: Arc<dyn SessionStore>,
	/// Session cookie attributes.
	pub cookie: SessionCookie,
	/// Admin wiring; `None` when the service credential is not configured.
	pub admin: Option<AdminServices>,
	/// Redirect target after a successful login.
	pub landing_path: String,
}
impl AppState {
	/// State without admin features, landing on `/dashboard`.
	pub fn new(
		flow: Arc<ReqwestInteractiveFlow>,
		sessions: Arc<dyn SessionStore>,
		cookie: SessionCookie,
	) -> Self {
		Self { flow, sessions, cookie, admin: None, landing_path: "/dashboard".into() }
	}

	/// Enables the admin endpoints.
	pub fn with_admin(mut self, admin: AdminServices) -> Self {
		self.admin = Some(admin);

		self
	}

	/// Overrides the post-login redirect.
	pub fn with_landing_path(mut self, path: impl Into<String>) -> Self {
		self.landing_path = path.into();

		self
	}

	/// Role policy shared with the flow.
	pub fn policy(&self) -> &RolePolicy {
		self.flow.policy()
	}

	async fn load_session(&self, jar: &CookieJar) -> Result<Session> {
		let value = jar.get(self.cookie.name()).map(|cookie| cookie.value().to_owned());

		Ok(self.sessions.load(value.as_deref()).await?)
	}

	async fn current_user(&self, jar: &CookieJar) -> Result<Option<AuthenticatedUser>> {
		let session = self.load_session(jar).await?;

		Ok(self.flow.current_user(&session).cloned())
	}
}
impl Debug for AppState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppState")
			.field("flow", &self.flow)
			.field("cookie", &self.cookie)
			.field("admin", &self.admin)
			.field("landing_path", &self.landing_path)
			.finish()
	}
}

/// Signed-in user attached to the request by the guard middleware.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthenticatedUser);

/// Plain-text error page: `"<category>: <message>"`.
#[derive(Debug)]
pub struct ErrorPage(pub Error);
impl ErrorPage {
	/// Status code for the wrapped error.
	pub fn status(&self) -> StatusCode {
		match self.0 {
			Error::Unavailable { .. } | Error::Discovery(_) => StatusCode::SERVICE_UNAVAILABLE,
			Error::InvalidState => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}
impl<E> From<E> for ErrorPage
where
	E: Into<Error>,
{
	fn from(e: E) -> Self {
		Self(e.into())
	}
}
impl IntoResponse for ErrorPage {
	fn into_response(self) -> Response {
		let status = self.status();

		tracing::warn!(
			status = status.as_u16(),
			category = self.0.category(),
			error = %self.0,
			"request failed"
		);

		(status, format!("{}: {}", self.0.category(), self.0)).into_response()
	}
}

/// Builds the router for every endpoint.
pub fn router(state: AppState) -> Router {
	let state = Arc::new(state);
	let protected = Router::new()
		.route("/api/me", get(auth::me))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_authenticated));
	let admin = Router::new()
		.route("/api/admin/roles/assign", post(admin::assign_role))
		.route("/api/admin/roles/remove", post(admin::remove_role))
		.route("/api/admin/users/roles", get(admin::user_roles))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

	Router::new()
		.route("/auth/login", get(auth::login))
		.route("/auth/callback", get(auth::callback))
		.route("/auth/logout", get(auth::logout))
		.merge(protected)
		.merge(admin)
		.with_state(state)
}

/// Redirects anonymous requests to the login page.
pub async fn require_authenticated(
	State(state): State<SharedState>,
	jar: CookieJar,
	mut request: Request,
	next: Next,
) -> Result<Response, ErrorPage> {
	let Some(user) = state.current_user(&jar).await? else {
		return Ok(Redirect::temporary("/auth/login").into_response());
	};

	request.extensions_mut().insert(CurrentUser(user));

	Ok(next.run(request).await)
}

/// Rejects anonymous requests with 401 and non-administrators with 403.
pub async fn require_admin(
	State(state): State<SharedState>,
	jar: CookieJar,
	mut request: Request,
	next: Next,
) -> Result<Response, ErrorPage> {
	let Some(user) = state.current_user(&jar).await? else {
		return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
	};

	if !user.is_admin(state.policy()) {
		tracing::warn!(subject = %user.id, "non-admin request to the admin API");

		return Ok((StatusCode::FORBIDDEN, "Forbidden - admin access required").into_response());
	}

	request.extensions_mut().insert(CurrentUser(user));

	Ok(next.run(request).await)
}

/// Serves `router` until Ctrl-C.
pub async fn serve(listener: TcpListener, router: Router) -> io::Result<()> {
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(%addr, "listening");
	}

	axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to listen for the shutdown signal");

		std::future::pending::<()>().await;
	}

	tracing::info!("shutdown signal received");
}
