mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use common::*;
use memberportal_identity::{
	error::Error,
	reconcile::{
		DebtReconciliationJob, FileDirectory, MemberDirectory, MemberStatus, MemoryDirectory,
		Member, ReconciliationSummary,
	},
	reqwest::Client,
};

fn member(id: i64, email: &str, subject: Option<&str>) -> Member {
	Member::new(id, email, subject)
}

fn job(idp: &MockIdp, directory: &MemoryDirectory) -> DebtReconciliationJob {
	job_over(idp, Arc::new(directory.clone()))
}

fn job_over(idp: &MockIdp, directory: Arc<dyn MemberDirectory>) -> DebtReconciliationJob {
	DebtReconciliationJob::new(
		directory,
		Arc::new(idp.token_source()),
		Client::new(),
		idp.admin_base(),
		"in_debt",
	)
}

#[tokio::test]
async fn negative_balance_assigns_debt_role() {
	let idp = MockIdp::start().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _roles = idp.mock_user_roles("kc-debtor", &["active_member"]).await;
	let _role = idp.mock_role("in_debt").await;
	let assign = idp.mock_role_mapping(POST, "kc-debtor", 204).await;
	let directory = MemoryDirectory::default();

	directory.insert(member(1, "debtor@example.com", Some("kc-debtor")), -500);

	let report = job(&idp, &directory).run().await.expect("Pass should run.");

	assert_eq!(
		report.summary,
		ReconciliationSummary { total: 1, skipped: 0, updated: 1, errors: 0 }
	);
	assert_eq!(
		report.outcomes[0].to_string(),
		"✓ Assigned in_debt to debtor@example.com (balance: -500)"
	);
	assert!(report.summary.succeeded());

	assign.assert_async().await;
}

#[tokio::test]
async fn failures_are_counted_and_the_pass_continues() {
	let idp = MockIdp::start().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _role = idp.mock_role("in_debt").await;
	let _broken_roles = idp.mock_user_roles("kc-broken", &[]).await;
	let broken_assign = idp.mock_role_mapping(POST, "kc-broken", 500).await;
	let _settled_roles = idp.mock_user_roles("kc-settled", &["in_debt"]).await;
	let removal = idp.mock_role_mapping(DELETE, "kc-settled", 204).await;
	let directory = MemoryDirectory::default();

	directory.insert(member(1, "nobalance@example.com", Some("kc-nobalance")), -10);
	directory.insert(member(2, "offline@example.com", None), -10);
	directory.insert(member(3, "broken@example.com", Some("kc-broken")), -20);
	directory.insert(member(4, "settled@example.com", Some("kc-settled")), 0);
	directory.fail_balance(1, true);

	let report = job(&idp, &directory).run().await.expect("Pass should run.");

	assert_eq!(
		report.summary,
		ReconciliationSummary { total: 4, skipped: 1, updated: 1, errors: 2 }
	);
	assert!(!report.summary.succeeded());
	assert!(matches!(report.outcomes[0].status, MemberStatus::BalanceFailed { .. }));
	assert_eq!(report.outcomes[1].status, MemberStatus::Skipped);
	assert!(
		report.outcomes[2].to_string().starts_with("✗ Failed to assign in_debt to broken@example.com:")
	);
	assert_eq!(
		report.outcomes[3].to_string(),
		"✓ Removed in_debt from settled@example.com (balance: 0)"
	);

	broken_assign.assert_async().await;
	removal.assert_async().await;
}

#[tokio::test]
async fn second_pass_performs_no_mutation() {
	let idp = MockIdp::start().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _role = idp.mock_role("in_debt").await;
	let mut roles = idp.mock_user_roles("kc-idem", &[]).await;
	let assign = idp.mock_role_mapping(POST, "kc-idem", 204).await;
	let directory = MemoryDirectory::default();

	directory.insert(member(9, "idem@example.com", Some("kc-idem")), -75);

	let job = job(&idp, &directory);
	let first = job.run().await.expect("First pass should run.");

	assert_eq!(first.summary.updated, 1);

	roles.delete_async().await;
	roles = idp.mock_user_roles("kc-idem", &["in_debt"]).await;

	let second = job.run().await.expect("Second pass should run.");

	assert_eq!(
		second.summary,
		ReconciliationSummary { total: 1, skipped: 0, updated: 0, errors: 0 }
	);
	assert_eq!(second.outcomes[0].status, MemberStatus::Unchanged { balance: -75 });

	roles.assert_async().await;
	assign.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_service_credential_aborts_before_listing() {
	let idp = MockIdp::start().await;
	let _token = idp
		.mock_token(401, json!({ "error": "invalid_client", "error_description": "Bad secret" }))
		.await;
	let directory = MemoryDirectory::default();

	directory.fail_listing(Some("must not be reached"));

	let err = job(&idp, &directory).run().await.expect_err("Rejected credential must abort.");

	assert_eq!(err.category(), "CredentialError");
}

#[tokio::test]
async fn directory_listing_failure_aborts() {
	let idp = MockIdp::start().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let directory = MemoryDirectory::default();

	directory.fail_listing(Some("database locked"));

	let err = job(&idp, &directory).run().await.expect_err("Listing failure must abort.");

	assert!(matches!(err, Error::Directory(_)));
}

#[tokio::test]
async fn malformed_snapshot_row_is_counted_without_aborting() {
	let idp = MockIdp::start().await;
	let _token = idp.mock_token(200, service_token_body(SERVICE_TOKEN, 300)).await;
	let _roles = idp.mock_user_roles("kc-good", &[]).await;
	let _role = idp.mock_role("in_debt").await;
	let assign = idp.mock_role_mapping(POST, "kc-good", 204).await;
	let path =
		std::env::temp_dir().join(format!("memberportal-malformed-{}.json", std::process::id()));

	tokio::fs::write(
		&path,
		json!([
			{ "id": 1, "email": "good@example.com", "keycloak_id": "kc-good", "balance": -50 },
			{ "id": 2, "email": "bad@example.com", "keycloak_id": "kc bad", "balance": -50 }
		])
		.to_string(),
	)
	.await
	.expect("Snapshot fixture should be written.");

	let directory = FileDirectory::open(&path).await.expect("Snapshot should load.");
	let report = job_over(&idp, Arc::new(directory)).run().await.expect("Pass should run.");

	let _ = tokio::fs::remove_file(&path).await;

	assert_eq!(
		report.summary,
		ReconciliationSummary { total: 2, skipped: 0, updated: 1, errors: 1 }
	);
	assert!(matches!(report.outcomes[1].status, MemberStatus::InvalidSubject { .. }));
	assert!(!report.summary.succeeded());

	assign.assert_calls_async(1).await;
}
