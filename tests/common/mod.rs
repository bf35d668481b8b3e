// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tabbly::application::{BillService, MembershipPolicy};
use tabbly::domain::{BillList, NewTransaction, Transaction, parse_split};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(BillService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = BillService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Same as `test_service`, rejecting names that are not participants
pub async fn strict_service() -> Result<(BillService, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    Ok((
        service.with_membership_policy(MembershipPolicy::Strict),
        temp_dir,
    ))
}

/// Create a bill list with the given participant names
pub async fn bill_list_with(service: &BillService, names: &[&str]) -> Result<BillList> {
    let participants = names.iter().map(|n| n.to_string()).collect();
    Ok(service
        .create_bill_list("test bill list".into(), participants)
        .await?)
}

/// Record a transaction; `split` uses the "a, b" form
pub async fn record(
    service: &BillService,
    bill_list_id: i64,
    amount_cents: i64,
    payer: &str,
    split: &str,
) -> Result<Transaction> {
    let new = NewTransaction::new(amount_cents, "test transaction", payer, parse_split(split));
    Ok(service.create_transaction(bill_list_id, new).await?)
}
