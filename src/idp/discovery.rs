//! OIDC discovery document and JWKS retrieval.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, idp::JwkSet};

/// Failures raised while discovering the provider or loading its keys.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// The request never produced a response.
	#[error("Request to {url} failed.")]
	Request {
		/// Requested URL.
		url: String,
		/// Transport failure.
		#[source]
		source: ReqwestError,
	},
	/// The provider answered with a non-2xx status.
	#[error("{url} returned HTTP {status}.")]
	Status {
		/// Requested URL.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// The response body was not the expected JSON document.
	#[error("{url} returned a malformed document.")]
	Decode {
		/// Requested URL.
		url: String,
		/// Decoding failure.
		#[source]
		source: ReqwestError,
	},
	/// The document describes a different issuer.
	#[error("Discovery document issuer `{actual}` does not match `{expected}`.")]
	IssuerMismatch {
		/// Configured issuer.
		expected: String,
		/// Issuer advertised by the provider.
		actual: String,
	},
	/// An advertised endpoint is not a valid URL.
	#[error("Advertised endpoint `{value}` is not a valid URL.")]
	InvalidEndpoint {
		/// Offending value.
		value: String,
		/// Parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The key set carried no usable RSA signing key.
	#[error("The key set contains no usable RSA signing key.")]
	NoSigningKeys,
}

/// Subset of the OpenID Provider metadata the portal relies on.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryDocument {
	/// Issuer identifier.
	pub issuer: String,
	/// Authorization endpoint.
	pub authorization_endpoint: String,
	/// Token endpoint.
	pub token_endpoint: String,
	/// JWKS location.
	pub jwks_uri: String,
	/// RP-initiated logout endpoint.
	#[serde(default)]
	pub end_session_endpoint: Option<String>,
}
impl DiscoveryDocument {
	/// Parses the advertised endpoints.
	pub fn endpoints(&self) -> Result<IdpEndpoints, DiscoveryError> {
		Ok(IdpEndpoints {
			issuer: self.issuer.clone(),
			authorization: parse_endpoint(&self.authorization_endpoint)?,
			token: parse_endpoint(&self.token_endpoint)?,
			jwks: parse_endpoint(&self.jwks_uri)?,
			end_session: self.end_session_endpoint.as_deref().map(parse_endpoint).transpose()?,
		})
	}
}

/// Endpoints used by the interactive flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdpEndpoints {
	/// Issuer exactly as advertised; ID tokens must carry this `iss`.
	pub issuer: String,
	/// Browser-facing authorization endpoint.
	pub authorization: Url,
	/// Token endpoint for the authorization-code exchange.
	pub token: Url,
	/// Signing key set.
	pub jwks: Url,
	/// Logout endpoint, when the provider advertises one.
	pub end_session: Option<Url>,
}

/// `{issuer}/.well-known/openid-configuration`.
pub fn discovery_url(issuer: &Url) -> String {
	format!("{}/.well-known/openid-configuration", issuer.as_str().trim_end_matches('/'))
}

pub(crate) async fn fetch_discovery(
	http: &ReqwestClient,
	issuer: &Url,
) -> Result<DiscoveryDocument, DiscoveryError> {
	let url = discovery_url(issuer);

	tracing::debug!(%url, "fetching discovery document");

	let document = get_json::<DiscoveryDocument>(http, &url).await?;
	let expected = issuer.as_str().trim_end_matches('/');

	if document.issuer.trim_end_matches('/') != expected {
		return Err(DiscoveryError::IssuerMismatch {
			expected: expected.to_owned(),
			actual: document.issuer,
		});
	}

	Ok(document)
}

pub(crate) async fn fetch_jwks(http: &ReqwestClient, jwks: &Url) -> Result<JwkSet, DiscoveryError> {
	tracing::debug!(url = %jwks, "fetching signing keys");

	get_json(http, jwks.as_str()).await
}

async fn get_json<T>(http: &ReqwestClient, url: &str) -> Result<T, DiscoveryError>
where
	T: DeserializeOwned,
{
	let response = http
		.get(url)
		.send()
		.await
		.map_err(|source| DiscoveryError::Request { url: url.to_owned(), source })?;
	let status = response.status();

	if !status.is_success() {
		return Err(DiscoveryError::Status { url: url.to_owned(), status: status.as_u16() });
	}

	response.json::<T>().await.map_err(|source| DiscoveryError::Decode { url: url.to_owned(), source })
}

fn parse_endpoint(value: &str) -> Result<Url, DiscoveryError> {
	Url::parse(value)
		.map_err(|source| DiscoveryError::InvalidEndpoint { value: value.to_owned(), source })
}
