//! Identity provider gateway.
//!
//! Discovery runs once at startup. A reachable provider yields [`IdpGateway::Ready`] with the
//! authorization/token endpoints and an [`IdTokenVerifier`]; any failure yields
//! [`IdpGateway::Degraded`], which stays in place for the life of the process.

mod discovery;
mod verifier;

pub use discovery::*;
pub use verifier::*;

// self
use crate::_prelude::*;

/// Discovered endpoints plus the verifier built from the provider's signing keys.
#[derive(Debug)]
pub struct IdpHandle {
	endpoints: IdpEndpoints,
	verifier: IdTokenVerifier,
}
impl IdpHandle {
	/// Assembles a handle from already-fetched parts.
	pub fn new(endpoints: IdpEndpoints, verifier: IdTokenVerifier) -> Self {
		Self { endpoints, verifier }
	}

	/// Provider endpoints.
	pub fn endpoints(&self) -> &IdpEndpoints {
		&self.endpoints
	}

	/// ID-token verifier.
	pub fn verifier(&self) -> &IdTokenVerifier {
		&self.verifier
	}
}

/// Startup outcome of identity-provider discovery.
#[derive(Clone, Debug)]
pub enum IdpGateway {
	/// Discovery succeeded.
	Ready(Arc<IdpHandle>),
	/// Discovery failed; interactive login answers `Unavailable`.
	Degraded {
		/// Failure recorded at startup.
		reason: String,
	},
}
impl IdpGateway {
	/// Runs discovery and returns the handle or the failure.
	pub async fn discover(
		http: &ReqwestClient,
		issuer: &Url,
		client_id: &str,
	) -> Result<IdpHandle, DiscoveryError> {
		let document = fetch_discovery(http, issuer).await?;
		let endpoints = document.endpoints()?;
		let jwks = fetch_jwks(http, &endpoints.jwks).await?;
		let verifier = IdTokenVerifier::from_jwks(endpoints.issuer.clone(), client_id, &jwks)?;

		tracing::info!(
			issuer = %endpoints.issuer,
			keys = verifier.key_count(),
			"identity provider discovered"
		);

		Ok(IdpHandle::new(endpoints, verifier))
	}

	/// Runs discovery and falls back to Degraded Mode instead of failing.
	pub async fn connect(http: &ReqwestClient, issuer: &Url, client_id: &str) -> Self {
		match Self::discover(http, issuer, client_id).await {
			Ok(handle) => Self::Ready(Arc::new(handle)),
			Err(e) => {
				tracing::warn!(
					issuer = %issuer,
					reason = %e,
					"identity provider unreachable; interactive authentication disabled"
				);

				Self::degraded(e.to_string())
			},
		}
	}

	/// Builds a gateway that is degraded from the start.
	pub fn degraded(reason: impl Into<String>) -> Self {
		Self::Degraded { reason: reason.into() }
	}

	/// Returns the handle, or [`Error::Unavailable`] in Degraded Mode.
	pub fn ready(&self) -> Result<&Arc<IdpHandle>> {
		match self {
			Self::Ready(handle) => Ok(handle),
			Self::Degraded { reason } => Err(Error::Unavailable { reason: reason.clone() }),
		}
	}

	/// Returns true in Degraded Mode.
	pub fn is_degraded(&self) -> bool {
		matches!(self, Self::Degraded { .. })
	}
}
