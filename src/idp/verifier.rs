//! ID-token verification against the provider's RSA signing keys.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
// self
use crate::{
	_prelude::*,
	auth::{AuthenticatedUser, RoleSet, SubjectId},
	idp::DiscoveryError,
};

/// JSON Web Key Set document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JwkSet {
	/// Advertised keys, including ones the verifier ignores.
	#[serde(default)]
	pub keys: Vec<Jwk>,
}

/// Single JSON Web Key. Only the RSA members are read.
#[derive(Clone, Debug, Deserialize)]
pub struct Jwk {
	/// Key type (`RSA`, `EC`, ...).
	pub kty: String,
	/// Key id.
	#[serde(default)]
	pub kid: Option<String>,
	/// Intended algorithm.
	#[serde(default)]
	pub alg: Option<String>,
	/// Intended use (`sig` or `enc`).
	#[serde(default, rename = "use")]
	pub key_use: Option<String>,
	/// RSA modulus, base64url.
	#[serde(default)]
	pub n: Option<String>,
	/// RSA public exponent, base64url.
	#[serde(default)]
	pub e: Option<String>,
}

struct SigningKey {
	kid: Option<String>,
	algorithm: Algorithm,
	key: DecodingKey,
}

/// Verifies signature, issuer, audience, and expiry of identity tokens.
pub struct IdTokenVerifier {
	issuer: String,
	client_id: String,
	keys: Vec<SigningKey>,
}
impl IdTokenVerifier {
	/// Builds a verifier from a key set. Keys that are not RSA signing keys are skipped.
	pub fn from_jwks(
		issuer: impl Into<String>,
		client_id: impl Into<String>,
		jwks: &JwkSet,
	) -> Result<Self, DiscoveryError> {
		let keys = jwks.keys.iter().filter_map(signing_key).collect::<Vec<_>>();

		if keys.is_empty() {
			return Err(DiscoveryError::NoSigningKeys);
		}

		Ok(Self { issuer: issuer.into(), client_id: client_id.into(), keys })
	}

	/// Number of usable signing keys.
	pub fn key_count(&self) -> usize {
		self.keys.len()
	}

	/// Verifies `token` and decodes its claims.
	pub fn verify(&self, token: &str) -> Result<IdTokenClaims> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|e| verification_failed(format!("malformed token header: {e}")))?;
		let key = self.select(&header)?;

		if header.alg != key.algorithm {
			return Err(verification_failed(format!(
				"token signed with {:?}, key expects {:?}",
				header.alg, key.algorithm
			)));
		}

		let mut validation = Validation::new(key.algorithm);

		validation.set_issuer(&[&self.issuer]);
		validation.set_audience(&[&self.client_id]);
		validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

		jsonwebtoken::decode::<IdTokenClaims>(token, &key.key, &validation)
			.map(|data| data.claims)
			.map_err(|e| verification_failed(e.to_string()))
	}

	fn select(&self, header: &Header) -> Result<&SigningKey> {
		let found = match &header.kid {
			Some(kid) => self.keys.iter().find(|key| key.kid.as_deref() == Some(kid.as_str())),
			None if self.keys.len() == 1 => self.keys.first(),
			None => None,
		};

		found.ok_or_else(|| verification_failed("no matching signing key"))
	}
}
impl Debug for IdTokenVerifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdTokenVerifier")
			.field("issuer", &self.issuer)
			.field("client_id", &self.client_id)
			.field("keys", &self.keys.iter().map(|key| key.kid.as_deref()).collect::<Vec<_>>())
			.finish()
	}
}

/// Role list nested under `realm_access` or `resource_access.<client>`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoleClaim {
	/// Role names as issued.
	#[serde(default)]
	pub roles: Vec<String>,
}

/// Claims the portal reads from a verified identity token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IdTokenClaims {
	/// Subject.
	pub sub: String,
	/// Email address.
	#[serde(default)]
	pub email: String,
	/// Email verification flag.
	#[serde(default)]
	pub email_verified: bool,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Preferred username.
	#[serde(default)]
	pub preferred_username: String,
	/// Realm-wide roles.
	#[serde(default)]
	pub realm_access: RoleClaim,
	/// Client-scoped roles keyed by client id.
	#[serde(default)]
	pub resource_access: HashMap<String, RoleClaim>,
}
impl IdTokenClaims {
	/// Realm roles unioned with the roles scoped to `client_id`, filtered through `allowed`.
	pub fn roles(&self, client_id: &str, allowed: &RoleSet) -> RoleSet {
		let client_roles = self.resource_access.get(client_id).map(|claim| claim.roles.as_slice());
		let candidates = self
			.realm_access
			.roles
			.iter()
			.chain(client_roles.unwrap_or_default())
			.map(String::as_str);

		allowed.retain_allowed(candidates)
	}

	/// Builds the session user.
	pub fn into_user(self, client_id: &str, allowed: &RoleSet) -> Result<AuthenticatedUser> {
		let roles = self.roles(client_id, allowed);
		let id = SubjectId::new(&self.sub)
			.map_err(|e| verification_failed(format!("invalid subject claim: {e}")))?;

		Ok(AuthenticatedUser {
			id,
			email: self.email,
			email_verified: self.email_verified,
			name: self.name,
			preferred_username: self.preferred_username,
			roles,
		})
	}
}

fn signing_key(jwk: &Jwk) -> Option<SigningKey> {
	if jwk.kty != "RSA" || jwk.key_use.as_deref().is_some_and(|key_use| key_use != "sig") {
		return None;
	}

	let algorithm = match jwk.alg.as_deref() {
		None => Algorithm::RS256,
		Some(alg) => match Algorithm::from_str(alg).ok()? {
			algorithm @ (Algorithm::RS256
			| Algorithm::RS384
			| Algorithm::RS512
			| Algorithm::PS256
			| Algorithm::PS384
			| Algorithm::PS512) => algorithm,
			_ => return None,
		},
	};
	let key = match DecodingKey::from_rsa_components(jwk.n.as_deref()?, jwk.e.as_deref()?) {
		Ok(key) => key,
		Err(e) => {
			tracing::warn!(kid = ?jwk.kid, error = %e, "skipping malformed signing key");

			return None;
		},
	};

	Some(SigningKey { kid: jwk.kid.clone(), algorithm, key })
}

fn verification_failed(reason: impl Into<String>) -> Error {
	Error::VerificationFailed { reason: reason.into() }
}
