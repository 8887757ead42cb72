//! Thread-safe in-memory [`SessionStore`] for tests and single-instance deployments.
//!
//! Expired sessions are swept on every [`SWEEP_INTERVAL`]th save, and on demand through
//! [`MemorySessionStore::purge_expired`].

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	session::{Session, SessionError, SessionFuture, SessionStore},
};

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

/// Saves between two sweeps of expired sessions.
pub const SWEEP_INTERVAL: usize = 256;

/// Keeps sessions in-process; the cookie carries only the session identifier.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStore {
	sessions: SessionMap,
	saves: Arc<AtomicUsize>,
}
impl MemorySessionStore {
	/// Number of stored sessions, expired ones included until the next sweep.
	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	/// Returns true if no session is stored.
	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}

	/// Drops every session past its max age and returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.sessions.write();
		let before = guard.len();

		guard.retain(|_, session| !session.is_expired_at(now));

		before - guard.len()
	}

	fn load_now(map: &SessionMap, cookie: Option<&str>) -> Session {
		let now = OffsetDateTime::now_utc();
		let Some(id) = cookie else {
			return Session::new();
		};
		let mut guard = map.write();

		match guard.get(id) {
			Some(session) if !session.is_expired_at(now) => {
				let mut session = session.clone();

				session.mark_issued();

				session
			},
			Some(_) => {
				guard.remove(id);

				Session::new()
			},
			None => Session::new(),
		}
	}

	fn save_now(map: &SessionMap, session: &mut Session) -> Result<String, SessionError> {
		let retired = session.take_retired();
		let mut guard = map.write();

		for id in &retired {
			guard.remove(id);
		}

		session.mark_issued();
		guard.insert(session.id().to_owned(), session.clone());

		Ok(session.id().to_owned())
	}

	fn discard_now(map: &SessionMap, session: &mut Session) {
		let retired = session.take_retired();
		let mut guard = map.write();

		guard.remove(session.id());

		for id in &retired {
			guard.remove(id);
		}
	}
}
impl SessionStore for MemorySessionStore {
	fn load<'a>(&'a self, cookie: Option<&'a str>) -> SessionFuture<'a, Session> {
		Box::pin(async move { Ok(Self::load_now(&self.sessions, cookie)) })
	}

	fn save<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, String> {
		Box::pin(async move {
			if self.saves.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
				self.purge_expired();
			}

			Self::save_now(&self.sessions, session)
		})
	}

	fn discard<'a>(&'a self, session: &'a mut Session) -> SessionFuture<'a, ()> {
		Box::pin(async move {
			Self::discard_now(&self.sessions, session);

			Ok(())
		})
	}
}
