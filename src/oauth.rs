//! `oauth2` facade for the identity provider's token endpoint.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, RedirectUrl, RequestTokenError, Scope,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ServiceAccessToken, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Token response carrying the OIDC `id_token` next to the standard fields.
pub type IdpTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type ConfiguredClient = oauth2::Client<
	BasicErrorResponse,
	IdpTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Extra token-response fields returned by an OIDC token endpoint.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IdTokenFields {
	/// Raw compact-serialized identity token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Grants issued against the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// Interactive browser login.
	AuthorizationCode,
	/// Service-account credential.
	ClientCredentials,
}
impl GrantType {
	/// OAuth 2.0 `grant_type` value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Tokens returned by the authorization-code exchange.
#[derive(Clone, Debug)]
pub struct CodeExchangeTokens {
	/// Access token for the signed-in user. Not persisted.
	pub access_token: TokenSecret,
	/// Raw identity token, if the provider returned one.
	pub id_token: Option<TokenSecret>,
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_unknown_transport_error(meta),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_client_credentials<'a, 'scopes>(
		&'a self,
		scopes: &'scopes [&'scopes str],
	) -> FacadeFuture<'a, ServiceAccessToken>
	where
		'scopes: 'a;

	fn exchange_authorization_code<'a, 'code, 'redirect>(
		&'a self,
		code: &'code str,
		redirect_uri: &'redirect Url,
	) -> FacadeFuture<'a, CodeExchangeTokens>
	where
		'code: 'a,
		'redirect: 'a;
}

/// Confidential-client facade over a single token endpoint.
pub(crate) struct IdpFacade<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> IdpFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Client secrets travel in the request body (`client_secret_post`).
	pub(crate) fn new(
		token_endpoint: &Url,
		client_id: &str,
		client_secret: &TokenSecret,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConfigError::invalid_url(token_endpoint.as_str(), source))?;
		let oauth_client: ConfiguredClient = oauth2::Client::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
			.set_auth_type(AuthType::RequestBody)
			.set_token_uri(token_url);

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}
}
impl<C, M> OAuth2Facade for IdpFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_client_credentials<'a, 'scopes>(
		&'a self,
		scopes: &'scopes [&'scopes str],
	) -> FacadeFuture<'a, ServiceAccessToken>
	where
		'scopes: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			for scope in scopes {
				request = request.add_scope(Scope::new((*scope).to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					GrantType::ClientCredentials,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_service_token_response(response)
		})
	}

	fn exchange_authorization_code<'a, 'code, 'redirect>(
		&'a self,
		code: &'code str,
		redirect_uri: &'redirect Url,
	) -> FacadeFuture<'a, CodeExchangeTokens>
	where
		'code: 'a,
		'redirect: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidRedirect { source })?;
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						GrantType::AuthorizationCode,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			Ok(CodeExchangeTokens {
				access_token: TokenSecret::new(response.access_token().secret().to_owned()),
				id_token: response.extra_fields().id_token.clone().map(TokenSecret::new),
			})
		})
	}
}

fn map_service_token_response(response: IdpTokenResponse) -> Result<ServiceAccessToken> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	ServiceAccessToken::new(
		response.access_token().secret().to_owned(),
		OffsetDateTime::now_utc(),
		Duration::seconds(expires_in),
	)
	.map_err(Error::from)
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(grant, response),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::TokenEndpoint {
			message,
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(grant: GrantType, response: BasicErrorResponse) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{} ({description})", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	Error::Rejected { grant: grant.as_str(), reason }
}

fn map_reqwest_error(grant: GrantType, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("request timed out during the {grant} grant"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn map_unknown_transport_error(meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message: "unknown HTTP client error".into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
