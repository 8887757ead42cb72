//! Realm role administration over the identity provider's admin REST surface.
//!
//! [`RoleAdminClient`] never acquires tokens itself. Callers hand it a bearer obtained from the
//! service credential, which keeps human sessions and machine credentials apart. There is no retry:
//! every non-2xx response surfaces as [`Error::AdminApi`] with the status and raw body.

// crates.io
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	obs::{self, FlowKind},
};

/// Realm or client role as returned by the admin API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
	/// Role id.
	pub id: String,
	/// Role name.
	pub name: String,
	/// Optional description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	/// Whether the role aggregates other roles.
	#[serde(default)]
	pub composite: bool,
	/// Whether the role belongs to a client rather than the realm.
	#[serde(default)]
	pub client_role: bool,
	/// Realm or client id owning the role.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub container_id: Option<String>,
}

/// Stateless client bound to one realm and one bearer token.
#[derive(Clone)]
pub struct RoleAdminClient {
	http: ReqwestClient,
	admin_base: Url,
	bearer: TokenSecret,
}
impl RoleAdminClient {
	/// `admin_base` is `{base}/admin/realms/{realm}`.
	pub fn new(http: ReqwestClient, admin_base: Url, bearer: TokenSecret) -> Self {
		Self { http, admin_base, bearer }
	}

	/// All realm roles.
	pub async fn list_realm_roles(&self) -> Result<Vec<Role>> {
		obs::observe(FlowKind::AdminApi, "list_realm_roles", async {
			let response = self.send(Method::GET, &["roles"], None).await?;

			decode(response).await
		})
		.await
	}

	/// Resolves a realm role by name. A 404 becomes [`Error::NotFound`].
	pub async fn get_role_by_name(&self, name: &str) -> Result<Role> {
		obs::observe(FlowKind::AdminApi, "get_role_by_name", self.fetch_role(name)).await
	}

	/// Realm roles currently mapped to `user`.
	pub async fn get_user_roles(&self, user: &SubjectId) -> Result<Vec<Role>> {
		obs::observe(FlowKind::AdminApi, "get_user_roles", self.fetch_user_roles(user)).await
	}

	/// Maps the role to the user. The role is resolved first so the mutation carries its
	/// authoritative id.
	pub async fn assign_role(&self, user: &SubjectId, role_name: &str) -> Result<()> {
		obs::observe(FlowKind::AdminApi, "assign_role", self.mutate(Method::POST, user, role_name))
			.await
	}

	/// Unmaps the role from the user.
	pub async fn remove_role(&self, user: &SubjectId, role_name: &str) -> Result<()> {
		obs::observe(FlowKind::AdminApi, "remove_role", self.mutate(Method::DELETE, user, role_name))
			.await
	}

	/// Returns true if the user currently holds `role_name`. Always asks the provider.
	pub async fn user_has_role(&self, user: &SubjectId, role_name: &str) -> Result<bool> {
		obs::observe(FlowKind::AdminApi, "user_has_role", async {
			let roles = self.fetch_user_roles(user).await?;

			Ok(roles.iter().any(|role| role.name == role_name))
		})
		.await
	}

	async fn fetch_role(&self, name: &str) -> Result<Role> {
		let response = self.request(Method::GET, &["roles", name])?.send().await;
		let response = response.map_err(TransportError::from)?;

		if response.status() == StatusCode::NOT_FOUND {
			return Err(Error::NotFound { name: name.to_owned() });
		}

		decode(ensure_success(response).await?).await
	}

	async fn fetch_user_roles(&self, user: &SubjectId) -> Result<Vec<Role>> {
		let response =
			self.send(Method::GET, &["users", &**user, "role-mappings", "realm"], None).await?;

		decode(response).await
	}

	async fn mutate(&self, method: Method, user: &SubjectId, role_name: &str) -> Result<()> {
		let role = self.fetch_role(role_name).await?;
		let payload = [role];

		self.send(method, &["users", &**user, "role-mappings", "realm"], Some(payload.as_slice())).await?;

		tracing::debug!(subject = %user, role = role_name, "realm role mapping updated");

		Ok(())
	}

	async fn send(
		&self,
		method: Method,
		segments: &[&str],
		body: Option<&[Role]>,
	) -> Result<Response> {
		let mut request = self.request(method, segments)?;

		if let Some(body) = body {
			request = request.json(body);
		}

		let response = request.send().await.map_err(TransportError::from)?;

		ensure_success(response).await
	}

	fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
		let url = self.endpoint(segments)?;

		Ok(self.http.request(method, url).bearer_auth(self.bearer.expose()))
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url, ConfigError> {
		let mut url = self.admin_base.clone();

		url.path_segments_mut()
			.map_err(|_| {
				ConfigError::invalid_url(
					self.admin_base.as_str(),
					url::ParseError::RelativeUrlWithCannotBeABaseBase,
				)
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}
}
impl Debug for RoleAdminClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RoleAdminClient")
			.field("admin_base", &self.admin_base.as_str())
			.field("bearer", &self.bearer)
			.finish()
	}
}

async fn ensure_success(response: Response) -> Result<Response> {
	let status = response.status();

	if status.is_success() {
		return Ok(response);
	}

	let body = response.text().await.unwrap_or_default();

	tracing::debug!(status = status.as_u16(), "admin API request failed");

	Err(Error::AdminApi { status: status.as_u16(), body })
}

async fn decode<T>(response: Response) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status().as_u16();
	let body = response.bytes().await.map_err(TransportError::from)?;
	let mut deserializer = serde_json::Deserializer::from_slice(&body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::AdminResponseParse { source, status }.into())
}
