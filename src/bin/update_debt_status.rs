//! Runs one debt-role reconciliation pass over a member snapshot.
//!
//! Meant for cron, e.g. `0 2 * * * update-debt-status --members /var/lib/portal/members.json`.
//! Exits non-zero when any member failed, even though the other members were updated.

// std
use std::{path::PathBuf, process::ExitCode, sync::Arc};
// crates.io
use clap::Parser;
use color_eyre::Result;
// self
use memberportal_identity::{
	config::{self, RealmArgs, RoleArgs, ServiceAccountArgs},
	flows::ReqwestTokenSource,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	obs::{self, LogFormat},
	reconcile::{FileDirectory, ReqwestReconciliationJob},
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	#[command(flatten)]
	realm: RealmArgs,
	#[command(flatten)]
	service_account: ServiceAccountArgs,
	#[command(flatten)]
	roles: RoleArgs,
	/// JSON member snapshot exported by the portal database.
	#[arg(long = "members", env = "PORTAL_MEMBERS_SNAPSHOT")]
	members: PathBuf,
	/// Log output format.
	#[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
	log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	color_eyre::install()?;

	let env_file = config::load_env_file();
	let cli = Cli::parse();

	obs::install_subscriber(cli.log_format);

	if env_file.is_none() {
		tracing::info!("No .env file found, using environment variables");
	}

	let credentials = cli.service_account.require()?;
	let realm = cli.realm.descriptor()?;
	let policy = cli.roles.policy()?;
	let http = ReqwestHttpClient::with_idp_timeouts()?;
	let tokens = ReqwestTokenSource::connect(
		&realm.token_endpoint()?,
		&credentials,
		http.clone(),
		ReqwestTransportErrorMapper,
	)
	.await?;

	tracing::info!("✓ Service account authenticated");

	let directory = FileDirectory::open(&cli.members).await?;
	let job = ReqwestReconciliationJob::new(
		Arc::new(directory),
		Arc::new(tokens),
		http.0.clone(),
		realm.admin_base()?,
		policy.debt_role(),
	);
	let report = job.run().await?;

	if report.summary.succeeded() {
		tracing::info!("{}", report.summary.status_line());

		Ok(ExitCode::SUCCESS)
	} else {
		tracing::error!("{}", report.summary.status_line());

		Ok(ExitCode::FAILURE)
	}
}
