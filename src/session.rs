//! Session capability for the interactive flow.
//!
//! A [`Session`] holds at most one [`AuthenticatedUser`] and, between login redirect and callback,
//! one CSRF state token. Stores hand sessions to handlers explicitly; nothing here is global.

pub mod cookie;
pub mod memory;

pub use cookie::{CookieSessionStore, SessionCookie};
pub use memory::MemorySessionStore;

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
// self
use crate::{_prelude::*, auth::AuthenticatedUser};

/// Cookie carrying the session.
pub const SESSION_COOKIE_NAME: &str = "memberportal-session";
/// Sessions older than this load as empty.
pub const SESSION_MAX_AGE: Duration = Duration::days(7);

/// Boxed future returned by [`SessionStore`] implementations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + 'a + Send>>;

/// Storage contract for interactive sessions.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Resolves the cookie value into a session.
	///
	/// Missing, tampered, expired, and revoked cookies all yield a fresh empty session.
	fn load<'a>(&'a self, cookie: Option<&'a str>) -> SessionFuture<'a, Session>;

	/// Persists the session and returns the cookie value to send back.
	///
	/// Identifiers retired by rotation are revoked here.
	fn save<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, String>;

	/// Revokes the session and every identifier it retired. No cookie is issued afterwards.
	fn discard<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, ()>;
}

/// Failures raised by session stores.
#[derive(Debug, ThisError)]
pub enum SessionError {
	/// The session could not be serialized.
	#[error("Session could not be encoded.")]
	Encode(#[from] serde_json::Error),
	/// The session could not be sealed.
	#[error("Session could not be encrypted.")]
	Encrypt,
}

/// Per-browser session state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
	id: String,
	#[serde(with = "time::serde::timestamp")]
	issued_at: OffsetDateTime,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	user: Option<AuthenticatedUser>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	oauth_state: Option<String>,
	#[serde(skip)]
	retired: Vec<String>,
	#[serde(skip)]
	issued: bool,
}
impl Session {
	/// Creates an empty session with a fresh identifier.
	pub fn new() -> Self {
		Self {
			id: random_token(16),
			issued_at: OffsetDateTime::now_utc(),
			user: None,
			oauth_state: None,
			retired: Vec::new(),
			issued: false,
		}
	}

	/// Current identifier.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Instant the current identifier was issued.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Signed-in user, if any.
	pub fn user(&self) -> Option<&AuthenticatedUser> {
		self.user.as_ref()
	}

	/// Replaces the signed-in user.
	pub fn set_user(&mut self, user: AuthenticatedUser) {
		self.user = Some(user);
	}

	/// Stores the CSRF state for the pending login.
	pub fn set_oauth_state(&mut self, state: impl Into<String>) {
		self.oauth_state = Some(state.into());
	}

	/// Removes and returns the pending CSRF state.
	///
	/// The identifier rotates so a cookie captured before the callback cannot bring the state
	/// back.
	pub fn take_oauth_state(&mut self) -> Option<String> {
		let state = self.oauth_state.take();

		self.rotate();

		state
	}

	/// Drops all values and rotates the identifier.
	pub fn clear(&mut self) {
		self.user = None;
		self.oauth_state = None;

		self.rotate();
	}

	/// Issues a new identifier, retiring the current one.
	///
	/// Only identifiers that already reached a client are retired; a fresh id that never left the
	/// process has nothing to revoke.
	pub fn rotate(&mut self) {
		let previous = std::mem::replace(&mut self.id, random_token(16));

		if std::mem::take(&mut self.issued) {
			self.retired.push(previous);
		}

		self.issued_at = OffsetDateTime::now_utc();
	}

	/// Returns true if the current identifier was loaded from, or saved into, a cookie.
	pub fn is_issued(&self) -> bool {
		self.issued
	}

	/// Identifiers retired since the session was loaded.
	pub fn retired(&self) -> &[String] {
		&self.retired
	}

	/// Returns true once [`SESSION_MAX_AGE`] has elapsed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant - self.issued_at >= SESSION_MAX_AGE
	}

	/// Returns true if the session carries neither a user nor a pending state.
	pub fn is_empty(&self) -> bool {
		self.user.is_none() && self.oauth_state.is_none()
	}

	pub(crate) fn mark_issued(&mut self) {
		self.issued = true;
	}

	pub(crate) fn take_retired(&mut self) -> Vec<String> {
		std::mem::take(&mut self.retired)
	}

	/// Retired identifiers plus the current one when a client holds it.
	pub(crate) fn take_revocable(&mut self) -> Vec<String> {
		let mut ids = self.take_retired();

		if std::mem::take(&mut self.issued) {
			ids.push(self.id.clone());
		}

		ids
	}
}
impl Default for Session {
	fn default() -> Self {
		Self::new()
	}
}

/// URL-safe random token of `len` bytes.
pub(crate) fn random_token(len: usize) -> String {
	let mut bytes = vec![0_u8; len];

	rand::rng().fill(bytes.as_mut_slice());

	URL_SAFE_NO_PAD.encode(bytes)
}
