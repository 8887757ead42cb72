//! Process configuration read from flags or the environment.
//!
//! Settings are split into argument groups so each binary flattens only what it needs: the web
//! server takes all four, the reconciliation job skips [`InteractiveArgs`].

// self
use crate::{
	_prelude::*,
	auth::{RealmName, RolePolicy, RoleSet, TokenSecret},
	error::{ConfigError, CredentialError},
};

/// Loads `.env` from the working directory when present.
///
/// Returns the loaded path, or `None` when no file exists. Variables already set in the process
/// environment win over the file.
pub fn load_env_file() -> Option<std::path::PathBuf> {
	dotenvy::dotenv().ok()
}

/// Everything the web server reads at startup.
#[derive(Clone, Debug, clap::Args)]
pub struct IdentityConfig {
	#[allow(missing_docs)]
	#[command(flatten)]
	pub realm: RealmArgs,
	#[allow(missing_docs)]
	#[command(flatten)]
	pub interactive: InteractiveArgs,
	#[allow(missing_docs)]
	#[command(flatten)]
	pub service_account: ServiceAccountArgs,
	#[allow(missing_docs)]
	#[command(flatten)]
	pub roles: RoleArgs,
}

/// Identity provider location.
#[derive(Clone, Debug, clap::Args)]
pub struct RealmArgs {
	/// Identity provider base URL, e.g. `https://sso.example.com`.
	#[arg(long = "keycloak-url", env = "KEYCLOAK_URL")]
	pub idp_base_url: String,
	/// Realm holding portal users and roles.
	#[arg(long = "keycloak-realm", env = "KEYCLOAK_REALM")]
	pub realm: String,
}
impl RealmArgs {
	/// Validates the settings and derives realm URLs.
	pub fn descriptor(&self) -> Result<RealmDescriptor, ConfigError> {
		RealmDescriptor::new(&self.idp_base_url, &self.realm)
	}
}

/// Interactive (browser) client settings.
#[derive(Clone, clap::Args)]
pub struct InteractiveArgs {
	/// Client id registered for the portal.
	#[arg(long = "client-id", env = "KEYCLOAK_CLIENT_ID")]
	pub client_id: String,
	/// Confidential client secret.
	#[arg(long = "client-secret", env = "KEYCLOAK_CLIENT_SECRET", hide_env_values = true)]
	pub client_secret: String,
	/// Public base URL of the portal.
	#[arg(long = "base-url", env = "BASE_URL")]
	pub base_url: String,
	/// Redirect URL registered with the identity provider. Defaults to `{base}/auth/callback`.
	#[arg(long = "redirect-url", env = "OAUTH_REDIRECT_URL")]
	pub redirect_url: Option<String>,
	/// Secret the session cookie key is derived from.
	#[arg(long = "session-secret", env = "SESSION_SECRET", hide_env_values = true)]
	pub session_secret: String,
	/// Page users land on after login.
	#[arg(long = "landing-path", env = "PORTAL_LANDING_PATH", default_value = "/dashboard")]
	pub landing_path: String,
}
impl InteractiveArgs {
	/// Redirect URL sent with every authorization request.
	pub fn redirect_url(&self) -> Result<Url, ConfigError> {
		let raw = match &self.redirect_url {
			Some(explicit) if !explicit.is_empty() => explicit.clone(),
			_ => format!("{}/auth/callback", self.base_url.trim_end_matches('/')),
		};

		Url::parse(&raw).map_err(|source| ConfigError::InvalidRedirect { source })
	}

	/// Session cookies carry `Secure` only when the portal is served over https.
	pub fn secure_cookies(&self) -> bool {
		self.base_url.starts_with("https")
	}

	/// Client secret wrapped for redaction.
	pub fn client_secret(&self) -> TokenSecret {
		TokenSecret::new(self.client_secret.clone())
	}

	/// Ensures required values are present and the base URL parses.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let required = [
			("KEYCLOAK_CLIENT_ID", &self.client_id),
			("KEYCLOAK_CLIENT_SECRET", &self.client_secret),
			("BASE_URL", &self.base_url),
			("SESSION_SECRET", &self.session_secret),
		];

		if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
			return Err(ConfigError::MissingSetting { name: *name });
		}

		Url::parse(&self.base_url)
			.map_err(|source| ConfigError::invalid_url(self.base_url.as_str(), source))?;

		Ok(())
	}
}
impl Debug for InteractiveArgs {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InteractiveArgs")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.field("base_url", &self.base_url)
			.field("redirect_url", &self.redirect_url)
			.field("landing_path", &self.landing_path)
			.finish()
	}
}

/// Service-account client settings.
#[derive(Clone, Default, clap::Args)]
pub struct ServiceAccountArgs {
	/// Client id of the service-account client.
	#[arg(
		long = "service-account-client-id",
		env = "KEYCLOAK_SERVICE_ACCOUNT_CLIENT_ID",
		default_value = ""
	)]
	pub client_id: String,
	/// Client secret of the service-account client.
	#[arg(
		long = "service-account-client-secret",
		env = "KEYCLOAK_SERVICE_ACCOUNT_CLIENT_SECRET",
		default_value = "",
		hide_env_values = true
	)]
	pub client_secret: String,
}
impl ServiceAccountArgs {
	/// Returns the credentials when both values are non-empty.
	pub fn credentials(&self) -> Option<ServiceCredentials> {
		self.require().ok()
	}

	/// Returns the credentials or fails fast when either value is empty.
	pub fn require(&self) -> Result<ServiceCredentials, CredentialError> {
		if self.client_id.is_empty() || self.client_secret.is_empty() {
			return Err(CredentialError::MissingCredentials);
		}

		Ok(ServiceCredentials {
			client_id: self.client_id.clone(),
			client_secret: TokenSecret::new(self.client_secret.clone()),
		})
	}
}
impl Debug for ServiceAccountArgs {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountArgs")
			.field("client_id", &self.client_id)
			.field("client_secret_set", &!self.client_secret.is_empty())
			.finish()
	}
}

/// Role names and allow-lists.
#[derive(Clone, Debug, clap::Args)]
pub struct RoleArgs {
	/// Roles copied from identity-token claims into the session.
	#[arg(
		long = "session-roles",
		env = "PORTAL_SESSION_ROLES",
		default_value = "memberportal_admin,active_member,in_debt"
	)]
	pub session_roles: String,
	/// Roles the admin API may assign or remove.
	#[arg(long = "managed-roles", env = "PORTAL_MANAGED_ROLES", default_value = "active_member,in_debt")]
	pub managed_roles: String,
	/// Role unlocking the admin API.
	#[arg(long = "admin-role", env = "PORTAL_ADMIN_ROLE", default_value = "memberportal_admin")]
	pub admin_role: String,
	/// Role maintained by debt reconciliation.
	#[arg(long = "debt-role", env = "PORTAL_DEBT_ROLE", default_value = "in_debt")]
	pub debt_role: String,
}
impl RoleArgs {
	/// Builds the validated role policy.
	pub fn policy(&self) -> Result<RolePolicy, ConfigError> {
		RolePolicy::new(
			RoleSet::from_str(&self.session_roles)?,
			RoleSet::from_str(&self.managed_roles)?,
			self.admin_role.clone(),
			self.debt_role.clone(),
		)
	}
}

/// Client id and secret used for the client-credentials grant.
#[derive(Clone)]
pub struct ServiceCredentials {
	/// Service-account client id.
	pub client_id: String,
	/// Service-account client secret.
	pub client_secret: TokenSecret,
}
impl Debug for ServiceCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.finish()
	}
}

/// Realm URLs derived from the base URL and realm name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealmDescriptor {
	base: Url,
	realm: RealmName,
}
impl RealmDescriptor {
	/// Parses the base URL and validates the realm name.
	pub fn new(base: &str, realm: &str) -> Result<Self, ConfigError> {
		if base.is_empty() {
			return Err(ConfigError::MissingSetting { name: "KEYCLOAK_URL" });
		}

		let base = Url::parse(base.trim_end_matches('/'))
			.map_err(|source| ConfigError::invalid_url(base, source))?;
		let realm = RealmName::new(realm)?;

		Ok(Self { base, realm })
	}

	/// Realm name.
	pub fn realm(&self) -> &RealmName {
		&self.realm
	}

	/// `{base}/realms/{realm}`.
	pub fn issuer(&self) -> Result<Url, ConfigError> {
		self.join(&["realms", &self.realm])
	}

	/// `{base}/realms/{realm}/protocol/openid-connect/token`.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		self.join(&["realms", &self.realm, "protocol", "openid-connect", "token"])
	}

	/// `{base}/admin/realms/{realm}`.
	pub fn admin_base(&self) -> Result<Url, ConfigError> {
		self.join(&["admin", "realms", &self.realm])
	}

	fn join(&self, segments: &[&str]) -> Result<Url, ConfigError> {
		let mut url = self.base.clone();

		url.path_segments_mut()
			.map_err(|_| {
				ConfigError::invalid_url(self.base.as_str(), url::ParseError::RelativeUrlWithCannotBeABaseBase)
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}
}
