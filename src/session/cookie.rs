//! Encrypted-cookie [`SessionStore`] and the cookie attributes shared by every store.
//!
//! The cookie value is `base64url(nonce || AES-256-GCM(json(session)))`, keyed by the SHA-256
//! digest of the configured session secret. Identifiers retired through rotation or discard are
//! remembered until a cookie carrying them would have expired anyway, up to [`MAX_REVOKED`]
//! entries; past that the oldest revocations are forgotten first.
//!
//! Revocations live in process memory only. After a restart, or on another replica, a cookie that
//! was logged out still decrypts and loads until its max age elapses.

// std
use std::collections::VecDeque;
// crates.io
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	session::{
		SESSION_COOKIE_NAME, SESSION_MAX_AGE, Session, SessionError, SessionFuture, SessionStore,
	},
};

const NONCE_LEN: usize = 12;

/// Upper bound on remembered revocations.
pub const MAX_REVOKED: usize = 65_536;

/// Attributes of the session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionCookie {
	name: String,
	secure: bool,
}
impl SessionCookie {
	/// Uses [`SESSION_COOKIE_NAME`]; `secure` should follow the deployment's base URL scheme.
	pub fn new(secure: bool) -> Self {
		Self { name: SESSION_COOKIE_NAME.into(), secure }
	}

	/// Overrides the cookie name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = name.into();

		self
	}

	/// Cookie name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Cookie carrying `value` with the session attributes.
	pub fn build(&self, value: String) -> Cookie<'static> {
		self.with_max_age(value, SESSION_MAX_AGE)
	}

	/// Cookie that expires the session immediately.
	pub fn removal(&self) -> Cookie<'static> {
		self.with_max_age(String::new(), Duration::ZERO)
	}

	fn with_max_age(&self, value: String, max_age: Duration) -> Cookie<'static> {
		Cookie::build((self.name.clone(), value))
			.path("/")
			.http_only(true)
			.same_site(SameSite::Lax)
			.secure(self.secure)
			.max_age(max_age)
			.build()
	}
}

// Revoked ids with their revocation time; `order` is oldest first.
#[derive(Debug)]
struct Revocations {
	ids: HashMap<String, OffsetDateTime>,
	order: VecDeque<String>,
	capacity: usize,
}
impl Revocations {
	fn new(capacity: usize) -> Self {
		Self { ids: HashMap::new(), order: VecDeque::new(), capacity }
	}

	fn contains(&self, id: &str) -> bool {
		self.ids.contains_key(id)
	}

	fn insert(&mut self, id: String, now: OffsetDateTime) {
		if self.ids.insert(id.clone(), now).is_none() {
			self.order.push_back(id);
		}
	}

	// Pops from the front only, so the cost tracks the number of evictions.
	fn prune(&mut self, now: OffsetDateTime) {
		while let Some(oldest) = self.order.front() {
			let stale = self.ids.get(oldest).is_none_or(|at| now - *at >= SESSION_MAX_AGE);

			if !stale && self.order.len() <= self.capacity {
				break;
			}
			if let Some(id) = self.order.pop_front() {
				self.ids.remove(&id);
			}
		}
	}
}

/// Stores the whole session inside an encrypted cookie.
pub struct CookieSessionStore {
	cipher: Aes256Gcm,
	revoked: Mutex<Revocations>,
}
impl CookieSessionStore {
	/// Derives the cipher key from `secret`.
	pub fn new(secret: &TokenSecret) -> Self {
		let key = Sha256::digest(secret.expose().as_bytes());
		let cipher = Aes256Gcm::new(&key);

		Self { cipher, revoked: Mutex::new(Revocations::new(MAX_REVOKED)) }
	}

	/// Overrides the revocation cap.
	pub fn with_revocation_capacity(mut self, capacity: usize) -> Self {
		self.revoked.get_mut().capacity = capacity;

		self
	}

	/// Number of identifiers currently remembered as revoked.
	pub fn revoked_len(&self) -> usize {
		self.revoked.lock().ids.len()
	}

	fn seal(&self, session: &Session) -> Result<String, SessionError> {
		let plaintext = serde_json::to_vec(session)?;
		let mut nonce_bytes = [0_u8; NONCE_LEN];

		rand::rng().fill(&mut nonce_bytes);

		let nonce = Nonce::from_slice(&nonce_bytes);
		let ciphertext =
			self.cipher.encrypt(nonce, plaintext.as_slice()).map_err(|_| SessionError::Encrypt)?;
		let mut sealed = nonce_bytes.to_vec();

		sealed.extend(ciphertext);

		Ok(URL_SAFE_NO_PAD.encode(sealed))
	}

	fn open(&self, value: &str) -> Option<Session> {
		let sealed = URL_SAFE_NO_PAD.decode(value).ok()?;

		if sealed.len() <= NONCE_LEN {
			return None;
		}

		let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
		let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;

		serde_json::from_slice(&plaintext).ok()
	}

	fn load_now(&self, cookie: Option<&str>) -> Session {
		let Some(value) = cookie else {
			return Session::new();
		};
		let Some(mut session) = self.open(value) else {
			tracing::debug!("session cookie failed to decrypt; starting a new session");

			return Session::new();
		};

		if session.is_expired_at(OffsetDateTime::now_utc()) {
			tracing::debug!("session cookie exceeded its max age");

			return Session::new();
		}
		if self.revoked.lock().contains(session.id()) {
			tracing::debug!("revoked session cookie replayed");

			return Session::new();
		}

		session.mark_issued();

		session
	}

	fn revoke(&self, ids: Vec<String>) {
		if ids.is_empty() {
			return;
		}

		let now = OffsetDateTime::now_utc();
		let mut revoked = self.revoked.lock();

		for id in ids {
			revoked.insert(id, now);
		}

		revoked.prune(now);
	}
}
impl Debug for CookieSessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CookieSessionStore")
			.field("cipher", &"<redacted>")
			.field("revoked", &self.revoked_len())
			.finish()
	}
}
impl SessionStore for CookieSessionStore {
	fn load<'a>(&'a self, cookie: Option<&'a str>) -> SessionFuture<'a, Session> {
		Box::pin(async move { Ok(self.load_now(cookie)) })
	}

	fn save<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, String> {
		Box::pin(async move {
			self.revoke(session.take_retired());

			let value = self.seal(session)?;

			session.mark_issued();

			Ok(value)
		})
	}

	fn discard<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, ()> {
		Box::pin(async move {
			self.revoke(session.take_revocable());

			Ok(())
		})
	}
}
