//! Member-portal identity server: login, sessions, and the admin role API.
//!
//! Starts in Degraded Mode when discovery fails and without admin endpoints when the service
//! credential is missing or rejected; neither stops the server.

// std
use std::{net::SocketAddr, sync::Arc};
// crates.io
use clap::Parser;
use color_eyre::Result;
use tokio::net::TcpListener;
// self
use memberportal_identity::{
	audit::TracingAuditSink,
	auth::TokenSecret,
	config::{self, IdentityConfig, RealmDescriptor},
	flows::{InteractiveClient, ReqwestInteractiveFlow, ReqwestTokenSource},
	http::ReqwestHttpClient,
	idp::IdpGateway,
	oauth::ReqwestTransportErrorMapper,
	obs::{self, LogFormat},
	session::{CookieSessionStore, SessionCookie},
	web::{self, AdminServices, AppState},
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	#[command(flatten)]
	identity: IdentityConfig,
	/// Socket address to listen on.
	#[arg(long = "bind", env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
	bind: SocketAddr,
	/// Log output format.
	#[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
	log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let env_file = config::load_env_file();
	let cli = Cli::parse();

	obs::install_subscriber(cli.log_format);

	if let Some(path) = env_file {
		tracing::debug!(path = %path.display(), "environment file loaded");
	}

	let identity = &cli.identity;

	identity.interactive.validate()?;

	let realm = identity.realm.descriptor()?;
	let policy = identity.roles.policy()?;
	let http = ReqwestHttpClient::with_idp_timeouts()?;
	let gateway =
		IdpGateway::connect(&http, &realm.issuer()?, &identity.interactive.client_id).await;
	let client = InteractiveClient {
		client_id: identity.interactive.client_id.clone(),
		client_secret: identity.interactive.client_secret(),
		redirect_uri: identity.interactive.redirect_url()?,
	};
	let flow = ReqwestInteractiveFlow::new(
		&gateway,
		client,
		policy,
		Arc::new(TracingAuditSink),
		http.clone(),
		ReqwestTransportErrorMapper,
	)?;
	let sessions = Arc::new(CookieSessionStore::new(&TokenSecret::new(
		identity.interactive.session_secret.clone(),
	)));
	let cookie = SessionCookie::new(identity.interactive.secure_cookies());
	let mut state = AppState::new(Arc::new(flow), sessions, cookie)
		.with_landing_path(identity.interactive.landing_path.clone());

	if let Some(admin) = admin_services(identity, &realm, &http).await {
		state = state.with_admin(admin);
	}

	let listener = TcpListener::bind(cli.bind).await?;

	web::serve(listener, web::router(state)).await?;

	Ok(())
}

async fn admin_services(
	identity: &IdentityConfig,
	realm: &RealmDescriptor,
	http: &ReqwestHttpClient,
) -> Option<AdminServices> {
	let Some(credentials) = identity.service_account.credentials() else {
		tracing::warn!("service account not configured; admin endpoints disabled");

		return None;
	};
	let services = async {
		let tokens = ReqwestTokenSource::connect(
			&realm.token_endpoint()?,
			&credentials,
			http.clone(),
			ReqwestTransportErrorMapper,
		)
		.await?;

		Ok::<_, memberportal_identity::error::Error>(AdminServices::new(
			Arc::new(tokens),
			http.0.clone(),
			realm.admin_base()?,
		))
	};

	match services.await {
		Ok(services) => {
			tracing::info!(client_id = %credentials.client_id, "service account authenticated");

			Some(services)
		},
		Err(e) => {
			tracing::warn!(error = %e, "service account unavailable; admin endpoints disabled");

			None
		},
	}
}
