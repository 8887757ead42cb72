//! Service credential with caching + single-flight refresh.
//!
//! The token source performs one client-credentials grant at construction so a broken service
//! account shows up at boot. Afterwards [`ServiceCredentialTokenSource::token`] serves the cached
//! token while it is outside the safety margin. Refreshes run behind an async guard; a generation
//! counter lets callers that queued on the guard reuse the token the holder just fetched instead
//! of firing another request.

// self
use crate::{
	_prelude::*,
	auth::{ServiceAccessToken, TokenSecret},
	config::ServiceCredentials,
	error::CredentialError,
	flows::common::IDP_SCOPES,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{IdpFacade, OAuth2Facade, ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, FlowKind},
};

/// Token source specialized for the crate's reqwest transport.
pub type ReqwestTokenSource =
	ServiceCredentialTokenSource<ReqwestHttpClient, ReqwestTransportErrorMapper>;

#[derive(Default)]
struct CachedToken {
	token: Option<ServiceAccessToken>,
	generation: u64,
}
impl CachedToken {
	fn usable(&self, now: OffsetDateTime, margin: Duration) -> Option<&ServiceAccessToken> {
		self.token.as_ref().filter(|token| !token.expires_within(now, margin))
	}
}

/// Process-wide service credential.
pub struct ServiceCredentialTokenSource<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	facade: IdpFacade<C, M>,
	client_id: String,
	cached: RwLock<CachedToken>,
	refresh_guard: AsyncMutex<()>,
	safety_margin: Duration,
}
impl<C, M> ServiceCredentialTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Tokens are refreshed once they are this close to expiry.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(10);

	/// Builds the source without contacting the provider.
	pub fn new(
		token_endpoint: &Url,
		credentials: &ServiceCredentials,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
			return Err(CredentialError::MissingCredentials.into());
		}

		let facade = IdpFacade::new(
			token_endpoint,
			&credentials.client_id,
			&credentials.client_secret,
			http_client,
			error_mapper,
		)?;

		Ok(Self {
			facade,
			client_id: credentials.client_id.clone(),
			cached: RwLock::new(CachedToken::default()),
			refresh_guard: AsyncMutex::new(()),
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
		})
	}

	/// Builds the source and fetches the first token.
	pub async fn connect(
		token_endpoint: &Url,
		credentials: &ServiceCredentials,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let source = Self::new(token_endpoint, credentials, http_client, error_mapper)?;

		source.prime().await?;

		Ok(source)
	}

	/// Overrides the refresh safety margin. Negative values count as zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Fetches a token unconditionally, replacing the cached one.
	pub async fn prime(&self) -> Result<()> {
		let _singleflight = self.refresh_guard.lock().await;

		self.fetch().await.map(|_| ())
	}

	/// Service-account client id.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// Expiry of the cached token, if one is held.
	pub fn cached_expiry(&self) -> Option<OffsetDateTime> {
		self.cached.read().token.as_ref().map(|token| token.expires_at)
	}

	/// Returns a valid access token, refreshing when the cached one is near expiry.
	pub async fn token(&self) -> Result<TokenSecret> {
		let observed = {
			let cached = self.cached.read();

			if let Some(token) = cached.usable(OffsetDateTime::now_utc(), self.safety_margin) {
				return Ok(token.access_token.clone());
			}

			cached.generation
		};

		obs::observe(FlowKind::ServiceCredential, "refresh", async {
			let _singleflight = self.refresh_guard.lock().await;

			{
				let cached = self.cached.read();
				let now = OffsetDateTime::now_utc();

				if let Some(token) = cached.usable(now, self.safety_margin) {
					return Ok(token.access_token.clone());
				}
				// Another caller refreshed while this one waited on the guard.
				if let Some(token) = cached
					.token
					.as_ref()
					.filter(|token| cached.generation != observed && !token.is_expired_at(now))
				{
					return Ok(token.access_token.clone());
				}
			}

			self.fetch().await
		})
		.await
	}

	async fn fetch(&self) -> Result<TokenSecret> {
		let token = self
			.facade
			.exchange_client_credentials(&IDP_SCOPES)
			.await
			.map_err(|source| CredentialError::Grant { source: Box::new(source) })?;
		let secret = token.access_token.clone();

		tracing::debug!(
			client_id = %self.client_id,
			expires_at = %token.expires_at,
			"service credential refreshed"
		);

		let mut cached = self.cached.write();

		cached.token = Some(token);
		cached.generation += 1;

		Ok(secret)
	}
}
impl<C, M> Debug for ServiceCredentialTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceCredentialTokenSource")
			.field("client_id", &self.client_id)
			.field("cached_expiry", &self.cached_expiry())
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}
