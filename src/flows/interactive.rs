//! Browser login: authorization redirect, callback handling, logout.
//!
//! The flow is built from an [`IdpGateway`]. A degraded gateway produces a flow whose login and
//! callback operations answer [`Error::Unavailable`]; everything else in the portal keeps working.

// self
use crate::{
	_prelude::*,
	audit::{AuditEntry, AuditSink},
	auth::{AuthenticatedUser, RolePolicy, TokenSecret},
	flows::common::{self, IDP_SCOPES},
	http::{ReqwestHttpClient, TokenHttpClient},
	idp::{IdpGateway, IdpHandle},
	oauth::{IdpFacade, OAuth2Facade, ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::Session,
};

/// Interactive flow specialized for the crate's reqwest transport.
pub type ReqwestInteractiveFlow =
	InteractiveAuthFlow<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Confidential client registered for the portal.
#[derive(Clone, Debug)]
pub struct InteractiveClient {
	/// Client id; also the expected ID-token audience.
	pub client_id: String,
	/// Client secret.
	pub client_secret: TokenSecret,
	/// Redirect URL registered with the provider.
	pub redirect_uri: Url,
}

/// Query parameters the provider appends to the redirect URL.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Echoed CSRF state.
	pub state: Option<String>,
	/// OAuth error code when the user or provider aborted.
	pub error: Option<String>,
	/// Human-readable error detail.
	pub error_description: Option<String>,
}

enum Backend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	Ready { handle: Arc<IdpHandle>, facade: IdpFacade<C, M> },
	Degraded { reason: String },
}

/// Login state machine: `Anonymous -> StatePending -> Authenticated`.
pub struct InteractiveAuthFlow<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	backend: Backend<C, M>,
	client_id: String,
	redirect_uri: Url,
	policy: RolePolicy,
	audit: Arc<dyn AuditSink>,
}
impl<C, M> InteractiveAuthFlow<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wires the flow to the gateway's token endpoint.
	pub fn new(
		gateway: &IdpGateway,
		client: InteractiveClient,
		policy: RolePolicy,
		audit: Arc<dyn AuditSink>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let backend = match gateway {
			IdpGateway::Ready(handle) => Backend::Ready {
				facade: IdpFacade::new(
					&handle.endpoints().token,
					&client.client_id,
					&client.client_secret,
					http_client,
					error_mapper,
				)?,
				handle: handle.clone(),
			},
			IdpGateway::Degraded { reason } => Backend::Degraded { reason: reason.clone() },
		};

		Ok(Self {
			backend,
			client_id: client.client_id,
			redirect_uri: client.redirect_uri,
			policy,
			audit,
		})
	}

	/// Returns true when interactive login is disabled.
	pub fn is_degraded(&self) -> bool {
		matches!(self.backend, Backend::Degraded { .. })
	}

	/// Role policy applied to session roles.
	pub fn policy(&self) -> &RolePolicy {
		&self.policy
	}

	/// Stores a fresh CSRF state in `session` and returns the authorization redirect.
	pub fn start_login(&self, session: &mut Session) -> Result<Url> {
		const KIND: FlowKind = FlowKind::Login;

		let _span = FlowSpan::new(KIND, "start_login").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.authorization_url(session);

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Consumes the stored state, exchanges the code, verifies the identity token, and signs the
	/// user in.
	///
	/// The stored state is removed whatever the outcome. On error the session must not be
	/// persisted with a user; it never receives one here.
	pub async fn handle_callback(
		&self,
		session: &mut Session,
		params: &CallbackParams,
	) -> Result<AuthenticatedUser> {
		obs::observe(FlowKind::Callback, "handle_callback", async {
			let (handle, facade) = self.ready()?;
			let stored = session.take_oauth_state();
			let matched = match (stored.as_deref(), params.state.as_deref()) {
				(Some(expected), Some(provided)) => common::states_match(expected, provided),
				_ => false,
			};

			if !matched {
				return Err(Error::InvalidState);
			}
			if let Some(error) = &params.error {
				let reason = match &params.error_description {
					Some(description) => format!("{error} ({description})"),
					None => error.clone(),
				};

				return Err(Error::ExchangeFailed { reason });
			}

			let code = params.code.as_deref().filter(|code| !code.is_empty()).ok_or_else(|| {
				Error::ExchangeFailed { reason: "missing authorization code".into() }
			})?;
			let tokens = facade
				.exchange_authorization_code(code, &self.redirect_uri)
				.await
				.map_err(|e| Error::ExchangeFailed { reason: e.to_string() })?;
			let id_token = tokens
				.id_token
				.ok_or_else(|| Error::ExchangeFailed { reason: "No ID token in response".into() })?;
			let user = handle
				.verifier()
				.verify(id_token.expose())?
				.into_user(&self.client_id, self.policy.session_roles())?;

			session.set_user(user.clone());

			if let Err(e) = self.audit.record(&AuditEntry::login(&user)).await {
				tracing::warn!(error = %e, email = %user.email, "login audit entry was not recorded");
			}

			tracing::info!(subject = %user.id, roles = %user.roles, "user signed in");

			Ok(user)
		})
		.await
	}

	/// Clears the session locally. The provider is not contacted.
	pub fn logout(&self, session: &mut Session) {
		if let Some(user) = session.user() {
			tracing::info!(subject = %user.id, "user signed out");
		}

		session.clear();
	}

	/// Signed-in user, or `None` for anonymous sessions.
	pub fn current_user<'a>(&self, session: &'a Session) -> Option<&'a AuthenticatedUser> {
		session.user()
	}

	fn ready(&self) -> Result<(&IdpHandle, &IdpFacade<C, M>)> {
		match &self.backend {
			Backend::Ready { handle, facade } => Ok((&**handle, facade)),
			Backend::Degraded { reason } => Err(Error::Unavailable { reason: reason.clone() }),
		}
	}

	fn authorization_url(&self, session: &mut Session) -> Result<Url> {
		let (handle, _) = self.ready()?;
		let state = common::generate_state();
		let mut url = handle.endpoints().authorization.clone();

		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", self.redirect_uri.as_str())
			.append_pair("scope", &IDP_SCOPES.join(" "))
			.append_pair("state", &state);
		session.set_oauth_state(state);

		Ok(url)
	}
}
impl<C, M> Debug for InteractiveAuthFlow<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InteractiveAuthFlow")
			.field("degraded", &self.is_degraded())
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}
