//! Identity-core error taxonomy shared by flows, the admin client, sessions, and reconciliation.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The identity provider was unreachable at startup; interactive login is disabled.
	#[error("Authentication unavailable: {}.", .reason.trim_end_matches('.'))]
	Unavailable {
		/// Reason recorded when the gateway entered Degraded Mode.
		reason: String,
	},
	/// CSRF state was missing or did not match the value stored in the session.
	#[error("Invalid state parameter.")]
	InvalidState,
	/// The authorization code could not be exchanged for tokens.
	#[error("Token exchange failed: {}.", .reason.trim_end_matches('.'))]
	ExchangeFailed {
		/// Human-readable failure summary.
		reason: String,
	},
	/// The identity token failed signature, issuer, audience, or expiry checks.
	#[error("Identity token verification failed: {}.", .reason.trim_end_matches('.'))]
	VerificationFailed {
		/// Human-readable failure summary.
		reason: String,
	},
	/// Service-account bootstrap or refresh failure.
	#[error(transparent)]
	Credential(#[from] CredentialError),
	/// Non-2xx response from the identity provider's admin surface.
	#[error("Identity provider admin API returned {status}: {body}.")]
	AdminApi {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
	},
	/// A role name did not resolve to a realm role.
	#[error("Role `{name}` does not exist in the realm.")]
	NotFound {
		/// Requested role name.
		name: String,
	},
	/// OIDC discovery or key retrieval failed.
	#[error(transparent)]
	Discovery(#[from] crate::idp::DiscoveryError),
	/// Session encoding or persistence failed.
	#[error(transparent)]
	Session(#[from] crate::session::SessionError),
	/// The local member directory failed.
	#[error(transparent)]
	Directory(#[from] crate::reconcile::DirectoryError),
	/// The token endpoint rejected the grant with an OAuth error body.
	#[error("Identity provider rejected the {grant} grant: {}.", .reason.trim_end_matches('.'))]
	Rejected {
		/// Grant label.
		grant: &'static str,
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Stable category name rendered on plain error pages.
	pub fn category(&self) -> &'static str {
		match self {
			Error::Unavailable { .. } => "Unavailable",
			Error::InvalidState => "InvalidState",
			Error::ExchangeFailed { .. } => "ExchangeFailed",
			Error::VerificationFailed { .. } => "VerificationFailed",
			Error::Credential(_) => "CredentialError",
			Error::AdminApi { .. } => "AdminAPIError",
			Error::NotFound { .. } => "NotFound",
			Error::Discovery(_) => "Unavailable",
			Error::Session(_) => "SessionError",
			Error::Directory(_) => "DirectoryError",
			Error::Rejected { .. } => "Rejected",
			Error::Config(_) => "ConfigError",
			Error::Transient(_) => "TransientError",
			Error::Transport(_) => "TransportError",
		}
	}
}

/// Service-account credential failures.
#[derive(Debug, ThisError)]
pub enum CredentialError {
	/// Client id or secret was empty.
	#[error("Service account client ID and secret are required.")]
	MissingCredentials,
	/// The client-credentials grant failed.
	#[error("Failed to authenticate service account: {source}")]
	Grant {
		/// Classified token-endpoint failure.
		#[source]
		source: Box<Error>,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured or derived URL is invalid.
	#[error("Configured URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required setting was empty.
	#[error("Setting `{name}` must not be empty.")]
	MissingSetting {
		/// Setting name.
		name: &'static str,
	},
	/// Identifier validation failed.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Role name validation failed.
	#[error(transparent)]
	InvalidRole(#[from] crate::auth::RoleValidationError),
	/// The admin API allow-list contains the administrator role.
	#[error("Managed roles must not include the administrator role `{role}`.")]
	AdminRoleManaged {
		/// Administrator role name.
		role: String,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_url(value: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { value: value.into(), source }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {}.", .message.trim_end_matches('.'))]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Admin API answered 2xx with a body that did not match the expected shape.
	#[error("Identity provider admin API returned malformed JSON.")]
	AdminResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code.
		status: u16,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
