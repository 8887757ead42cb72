//! Shared fixtures for integration tests: a mock identity provider and signed identity tokens.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::{Method, Mock, prelude::*};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use time::OffsetDateTime;
// self
use memberportal_identity::{
	audit::MemoryAuditSink,
	auth::{RolePolicy, TokenSecret},
	config::{RealmDescriptor, ServiceCredentials},
	flows::{InteractiveClient, ReqwestInteractiveFlow, ReqwestTokenSource},
	http::ReqwestHttpClient,
	idp::IdpGateway,
	oauth::ReqwestTransportErrorMapper,
	reqwest::Client,
	url::Url,
};

pub const REALM: &str = "portal";
pub const CLIENT_ID: &str = "memberportal";
pub const CLIENT_SECRET: &str = "portal-secret";
pub const SERVICE_CLIENT_ID: &str = "portal-sync";
pub const SERVICE_CLIENT_SECRET: &str = "sync-secret";
pub const SERVICE_TOKEN: &str = "service-token";
pub const SIGNING_KID: &str = "test-key";
pub const REDIRECT_URI: &str = "http://portal.test/auth/callback";

const SIGNING_KEY: &[u8] = include_bytes!("../fixtures/idp-signing-key.pem");
const MODULUS: &str = "0GRtiuUgsqmCFOMhOFCjFN70CDA7sfyF52gHfeW0K83edxRAfQ2MMFHp_LtDs8h5HAHKE-z9QAZ8NU2ebmxPGfdxvp0A-uUvN6LH9ElSzoSJTAhvGUhSTwbQG4-6GWknR2Ki3kS1F4wPAweCnbJzKhPOGmax0iGsYIkXNHQwysIaFCZ1qqpeoUOc1-lO-WN2zbE3mknWQysyqPUmolPR6PTFBxs-13bzL2Jh8r4rQPktCCfotYQcQHzMulE60Dcr8mBno9EauOiNXKZl3Cg3Jjoq46BorYhTAuK4fA2DCfVaUzukOKei8mseJn5k9C8gMsEPUSuTRW-Cb3Pf_3V9sQ";

/// Identity provider double covering discovery, keys, tokens, and the admin API.
pub struct MockIdp {
	pub server: MockServer,
}
impl MockIdp {
	pub async fn start() -> Self {
		Self { server: MockServer::start_async().await }
	}

	pub fn realm(&self) -> RealmDescriptor {
		RealmDescriptor::new(&self.server.base_url(), REALM)
			.expect("Mock realm descriptor should build.")
	}

	pub fn issuer(&self) -> Url {
		self.realm().issuer().expect("Mock issuer should derive.")
	}

	pub fn token_endpoint(&self) -> Url {
		self.realm().token_endpoint().expect("Mock token endpoint should derive.")
	}

	pub fn admin_base(&self) -> Url {
		self.realm().admin_base().expect("Mock admin base should derive.")
	}

	fn realm_path(&self, suffix: &str) -> String {
		format!("/realms/{REALM}{suffix}")
	}

	fn admin_path(&self, suffix: &str) -> String {
		format!("/admin/realms/{REALM}{suffix}")
	}

	pub async fn mock_discovery(&self) -> Mock<'_> {
		let issuer = self.issuer();
		let issuer = issuer.as_str();
		let path = self.realm_path("/.well-known/openid-configuration");

		self.server
			.mock_async(|when, then| {
				when.method(GET).path(path);
				then.status(200).json_body(json!({
					"issuer": issuer,
					"authorization_endpoint": format!("{issuer}/protocol/openid-connect/auth"),
					"token_endpoint": format!("{issuer}/protocol/openid-connect/token"),
					"jwks_uri": format!("{issuer}/protocol/openid-connect/certs"),
					"end_session_endpoint": format!("{issuer}/protocol/openid-connect/logout"),
				}));
			})
			.await
	}

	pub async fn mock_jwks(&self) -> Mock<'_> {
		let path = self.realm_path("/protocol/openid-connect/certs");

		self.server
			.mock_async(|when, then| {
				when.method(GET).path(path);
				then.status(200).json_body(json!({
					"keys": [{
						"kty": "RSA",
						"kid": SIGNING_KID,
						"use": "sig",
						"alg": "RS256",
						"n": MODULUS,
						"e": "AQAB"
					}]
				}));
			})
			.await
	}

	/// Discovery plus keys.
	pub async fn mock_oidc(&self) -> (Mock<'_>, Mock<'_>) {
		(self.mock_discovery().await, self.mock_jwks().await)
	}

	pub async fn mock_token(&self, status: u16, body: Value) -> Mock<'_> {
		let path = self.realm_path("/protocol/openid-connect/token");

		self.server
			.mock_async(|when, then| {
				when.method(POST).path(path);
				then.status(status).json_body(body);
			})
			.await
	}

	pub async fn mock_role(&self, name: &str) -> Mock<'_> {
		let path = self.admin_path(&format!("/roles/{name}"));
		let body = role_json(name);

		self.server
			.mock_async(|when, then| {
				when.method(GET).path(path).header("authorization", bearer());
				then.status(200).json_body(body);
			})
			.await
	}

	pub async fn mock_user_roles(&self, subject: &str, roles: &[&str]) -> Mock<'_> {
		let path = self.admin_path(&format!("/users/{subject}/role-mappings/realm"));
		let body = Value::Array(roles.iter().map(|role| role_json(role)).collect());

		self.server
			.mock_async(|when, then| {
				when.method(GET).path(path).header("authorization", bearer());
				then.status(200).json_body(body);
			})
			.await
	}

	pub async fn mock_role_mapping(&self, method: Method, subject: &str, status: u16) -> Mock<'_> {
		let path = self.admin_path(&format!("/users/{subject}/role-mappings/realm"));

		self.server
			.mock_async(|when, then| {
				when.method(method).path(path).header("authorization", bearer());
				then.status(status).body(if status < 300 { "" } else { "{\"error\":\"denied\"}" });
			})
			.await
	}

	pub async fn gateway(&self) -> IdpGateway {
		IdpGateway::connect(&Client::new(), &self.issuer(), CLIENT_ID).await
	}

	pub async fn flow(&self, audit: &MemoryAuditSink) -> ReqwestInteractiveFlow {
		interactive_flow(&self.gateway().await, audit)
	}

	/// Unprimed service-credential source pointed at the mock token endpoint.
	pub fn token_source(&self) -> ReqwestTokenSource {
		ReqwestTokenSource::new(
			&self.token_endpoint(),
			&service_credentials(),
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
		.expect("Token source should build.")
	}
}

pub fn interactive_flow(gateway: &IdpGateway, audit: &MemoryAuditSink) -> ReqwestInteractiveFlow {
	ReqwestInteractiveFlow::new(
		gateway,
		InteractiveClient {
			client_id: CLIENT_ID.into(),
			client_secret: TokenSecret::new(CLIENT_SECRET),
			redirect_uri: Url::parse(REDIRECT_URI).expect("Redirect fixture should parse."),
		},
		RolePolicy::default(),
		Arc::new(audit.clone()),
		ReqwestHttpClient::default(),
		ReqwestTransportErrorMapper,
	)
	.expect("Interactive flow should build.")
}

pub fn service_credentials() -> ServiceCredentials {
	ServiceCredentials {
		client_id: SERVICE_CLIENT_ID.into(),
		client_secret: TokenSecret::new(SERVICE_CLIENT_SECRET),
	}
}

pub fn bearer() -> String {
	format!("Bearer {SERVICE_TOKEN}")
}

pub fn role_json(name: &str) -> Value {
	json!({
		"id": format!("role-{name}"),
		"name": name,
		"composite": false,
		"clientRole": false,
		"containerId": REALM
	})
}

pub fn service_token_body(access_token: &str, expires_in: i64) -> Value {
	json!({ "access_token": access_token, "token_type": "bearer", "expires_in": expires_in })
}

pub fn code_exchange_body(id_token: Option<&str>) -> Value {
	let mut body = json!({ "access_token": "user-access", "token_type": "bearer", "expires_in": 300 });

	if let Some(id_token) = id_token {
		body["id_token"] = Value::String(id_token.into());
	}

	body
}

pub fn id_token_claims(issuer: &Url, subject: &str, email: &str, roles: &[&str]) -> Value {
	let now = OffsetDateTime::now_utc().unix_timestamp();

	json!({
		"iss": issuer.as_str(),
		"aud": CLIENT_ID,
		"sub": subject,
		"iat": now,
		"exp": now + 300,
		"email": email,
		"email_verified": true,
		"name": "Test Member",
		"preferred_username": "member",
		"realm_access": { "roles": roles },
	})
}

pub fn sign_id_token(claims: &Value) -> String {
	let mut header = Header::new(Algorithm::RS256);

	header.kid = Some(SIGNING_KID.into());

	let key = EncodingKey::from_rsa_pem(SIGNING_KEY).expect("Signing key fixture should parse.");

	jsonwebtoken::encode(&header, claims, &key).expect("Identity token should sign.")
}

/// Replaces the first character of the signature segment.
pub fn tamper_signature(token: &str) -> String {
	let (signed, signature) = token.rsplit_once('.').expect("Token should have three segments.");
	let mut chars = signature.chars();
	let first = chars.next().expect("Signature should not be empty.");
	let replacement = if first == 'A' { 'B' } else { 'A' };

	format!("{signed}.{replacement}{}", chars.as_str())
}

/// Value of the `state` query parameter in a login redirect.
pub fn state_from(url: &Url) -> String {
	url.query_pairs()
		.find(|(key, _)| key == "state")
		.map(|(_, value)| value.into_owned())
		.expect("Login redirect should carry a state.")
}
