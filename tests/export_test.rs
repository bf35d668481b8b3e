mod common;

use anyhow::Result;
use common::{bill_list_with, record, test_service};
use tabbly::io::Exporter;

#[tokio::test]
async fn test_export_transactions_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let bill_list = bill_list_with(&service, &["ann", "ben"]).await?;
    record(&service, bill_list.id, 1250, "ann", "ann, ben").await?;
    record(&service, bill_list.id, 300, "ben", "ann").await?;

    let mut out = Vec::new();
    let count = Exporter::new(&service)
        .export_transactions_csv(bill_list.id, &mut out)
        .await?;
    assert_eq!(count, 2);

    let text = String::from_utf8(out)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id,recorded_at,amount,whatfor,payer,split_between");
    assert!(lines[1].ends_with(",12.50,test transaction,ann,\"ann, ben\""));
    assert!(lines[2].ends_with(",3.00,test transaction,ben,ann"));

    Ok(())
}

#[tokio::test]
async fn test_export_balance_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let bill_list = bill_list_with(&service, &["ben", "ann"]).await?;
    record(&service, bill_list.id, 10000, "ann", "ann, ben").await?;

    let mut out = Vec::new();
    let rows = Exporter::new(&service)
        .export_balance_csv(bill_list.id, &mut out)
        .await?;

    assert_eq!(rows, 2);
    assert_eq!(
        String::from_utf8(out)?,
        "name,ann,ben\nann,0.00,50.00\nben,-50.00,0.00\n"
    );

    Ok(())
}

#[tokio::test]
async fn test_export_full_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let bill_list = bill_list_with(&service, &["ann", "ben"]).await?;
    record(&service, bill_list.id, 10000, "ann", "ann, ben").await?;

    let mut out = Vec::new();
    let snapshot = Exporter::new(&service)
        .export_full_json(bill_list.id, &mut out)
        .await?;
    assert_eq!(snapshot.bill_list.transactions.len(), 1);

    let value: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(value["bill_list"]["title"], "test bill list");
    assert_eq!(value["balance"]["ann"]["ben"], 50.0);
    assert_eq!(value["balance"]["ben"]["ann"], -50.0);

    Ok(())
}

#[tokio::test]
async fn test_export_missing_bill_list() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let mut out = Vec::new();
    let result = Exporter::new(&service)
        .export_balance_csv(77, &mut out)
        .await;

    assert!(result.is_err());
    assert!(out.is_empty());

    Ok(())
}
