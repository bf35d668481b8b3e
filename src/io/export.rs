use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

use crate::application::BillService;
use crate::domain::{BalanceMatrix, BillList, BillListId, format_cents, format_split};

/// Bill list snapshot for JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillListSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub bill_list: BillList,
    /// Balances in decimal units, keyed creditor -> debtor
    pub balance: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Exporter for writing a bill list in various formats
pub struct Exporter<'a> {
    service: &'a BillService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a BillService) -> Self {
        Self { service }
    }

    /// Export a bill list's transactions to CSV format
    pub async fn export_transactions_csv<W: Write>(
        &self,
        bill_list_id: BillListId,
        writer: W,
    ) -> Result<usize> {
        let transactions = self.service.list_transactions(bill_list_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "recorded_at",
            "amount",
            "whatfor",
            "payer",
            "split_between",
        ])?;

        for transaction in &transactions {
            csv_writer.write_record([
                transaction.id.to_string(),
                transaction.recorded_at.to_rfc3339(),
                format_cents(transaction.amount_cents),
                transaction.whatfor.clone(),
                transaction.payer.clone(),
                format_split(&transaction.split_between),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    /// Export the balance matrix to CSV: one row per creditor, one column per debtor
    pub async fn export_balance_csv<W: Write>(
        &self,
        bill_list_id: BillListId,
        writer: W,
    ) -> Result<usize> {
        let matrix = self.service.compute_balance(bill_list_id).await?;
        write_balance_csv(&matrix, writer)?;
        Ok(matrix.len())
    }

    /// Export a bill list with its computed balance as JSON
    pub async fn export_full_json<W: Write>(
        &self,
        bill_list_id: BillListId,
        writer: W,
    ) -> Result<BillListSnapshot> {
        let bill_list = self.service.get_bill_list(bill_list_id).await?;
        let matrix = self.service.compute_balance(bill_list_id).await?;

        let snapshot = BillListSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            bill_list,
            balance: matrix.to_units(),
        };

        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}

fn write_balance_csv<W: Write>(matrix: &BalanceMatrix, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["name".to_string()];
    header.extend(matrix.names().map(String::from));
    csv_writer.write_record(&header)?;

    for (creditor, row) in matrix.rows() {
        let mut record = vec![creditor.clone()];
        record.extend(row.values().map(|cents| format_cents(*cents)));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}
