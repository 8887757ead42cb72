//! Login, callback, logout, and `/api/me`.

// crates.io
use axum::{
	Extension, Json,
	extract::{Query, State},
	response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
// self
use crate::{
	_prelude::*,
	auth::AuthenticatedUser,
	flows::CallbackParams,
	web::{CurrentUser, ErrorPage, SharedState},
};

/// `GET /auth/login`: 307 to the provider, or 503 in Degraded Mode.
pub async fn login(
	State(state): State<SharedState>,
	jar: CookieJar,
) -> Result<Response, ErrorPage> {
	let mut session = state.load_session(&jar).await?;
	let url = state.flow.start_login(&mut session)?;
	let value = state.sessions.save(&mut session).await?;

	Ok((jar.add(state.cookie.build(value)), Redirect::temporary(url.as_str())).into_response())
}

/// `GET /auth/callback`: 307 to the landing page with a fresh cookie.
///
/// A failed callback discards the session and sets no cookie, so the consumed state cannot be
/// replayed.
pub async fn callback(
	State(state): State<SharedState>,
	jar: CookieJar,
	Query(params): Query<CallbackParams>,
) -> Result<Response, ErrorPage> {
	let mut session = state.load_session(&jar).await?;

	match state.flow.handle_callback(&mut session, &params).await {
		Ok(_) => {
			let value = state.sessions.save(&mut session).await?;

			Ok((jar.add(state.cookie.build(value)), Redirect::temporary(&state.landing_path))
				.into_response())
		},
		Err(e) => {
			if let Err(discard) = state.sessions.discard(&mut session).await {
				tracing::warn!(error = %discard, "failed to discard session after callback failure");
			}

			Err(e.into())
		},
	}
}

/// `GET /auth/logout`: clears the session, expires the cookie, 307 to `/`.
pub async fn logout(
	State(state): State<SharedState>,
	jar: CookieJar,
) -> Result<Response, ErrorPage> {
	let mut session = state.load_session(&jar).await?;

	state.flow.logout(&mut session);
	state.sessions.discard(&mut session).await?;

	Ok((jar.add(state.cookie.removal()), Redirect::temporary("/")).into_response())
}

/// `GET /api/me`: the signed-in user.
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<AuthenticatedUser> {
	Json(user)
}
