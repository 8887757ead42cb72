mod common;

// crates.io
use serde_json::json;
// self
use common::*;
use memberportal_identity::{
	auth::TokenSecret,
	config::ServiceCredentials,
	error::{CredentialError, Error},
	flows::ReqwestTokenSource,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
};

#[tokio::test]
async fn connect_primes_and_reuses_cached_token() {
	let idp = MockIdp::start().await;
	let mock = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let source = ReqwestTokenSource::connect(
		&idp.token_endpoint(),
		&service_credentials(),
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.await
	.expect("Service credential should authenticate at startup.");
	let first = source.token().await.expect("Cached token should be served.");
	let second = source.token().await.expect("Cached token should be served again.");

	assert_eq!(first.expose(), SERVICE_TOKEN);
	assert_eq!(first, second);
	assert!(source.cached_expiry().is_some());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let idp = MockIdp::start().await;
	let mock = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let source = idp.token_source();
	let (left, right, third) = tokio::join!(source.token(), source.token(), source.token());
	let left = left.expect("First concurrent caller should receive a token.");

	assert_eq!(left, right.expect("Second concurrent caller should receive a token."));
	assert_eq!(left, third.expect("Third concurrent caller should receive a token."));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn token_inside_safety_margin_is_refreshed() {
	let idp = MockIdp::start().await;
	let mock = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 5)).await;
	let source = idp.token_source();

	source.token().await.expect("Initial fetch should succeed.");
	source.token().await.expect("Refresh should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejected_grant_is_credential_error() {
	let idp = MockIdp::start().await;
	let mock = idp
		.mock_token(
			401,
			json!({ "error": "unauthorized_client", "error_description": "Invalid client secret" }),
		)
		.await;
	let err = idp.token_source().token().await.expect_err("Rejected grant must fail.");

	assert_eq!(err.category(), "CredentialError");
	assert!(matches!(err, Error::Credential(CredentialError::Grant { .. })));

	mock.assert_async().await;
}

#[tokio::test]
async fn missing_secret_fails_before_any_request() {
	let idp = MockIdp::start().await;
	let mock = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let credentials =
		ServiceCredentials { client_id: SERVICE_CLIENT_ID.into(), client_secret: TokenSecret::new("") };
	let err = ReqwestTokenSource::connect(
		&idp.token_endpoint(),
		&credentials,
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.await
	.expect_err("Empty secret must be rejected.");

	assert!(matches!(err, Error::Credential(CredentialError::MissingCredentials)));

	mock.assert_calls_async(0).await;
}
