use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BillListId, Cents, normalize_split};

pub type TransactionId = i64;

/// One recorded expense: `payer` fronted `amount_cents`, shared equally among
/// everyone in `split_between`. The payer may or may not be in the split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub bill_list_id: BillListId,
    pub amount_cents: Cents,
    pub whatfor: String,
    pub payer: String,
    pub split_between: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Input for recording a transaction. Ids and timestamps are assigned on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub amount_cents: Cents,
    pub whatfor: String,
    pub payer: String,
    pub split_between: Vec<String>,
}

impl NewTransaction {
    pub fn new(
        amount_cents: Cents,
        whatfor: impl Into<String>,
        payer: impl Into<String>,
        split_between: Vec<String>,
    ) -> Self {
        Self {
            amount_cents,
            whatfor: whatfor.into(),
            payer: payer.into(),
            split_between,
        }
    }

    /// Trim the payer and put the split in its stored shape.
    pub fn normalized(mut self) -> Self {
        self.payer = self.payer.trim().to_string();
        self.split_between = normalize_split(&self.split_between);
        self
    }

    /// Every participant name this transaction refers to, payer first.
    pub fn referenced_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.payer.as_str()).chain(self.split_between.iter().map(String::as_str))
    }
}

/// Partial update of a transaction. Only fields set to `Some` are changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub amount_cents: Option<Cents>,
    pub whatfor: Option<String>,
    pub payer: Option<String>,
    pub split_between: Option<Vec<String>>,
}

impl TransactionUpdate {
    pub fn with_amount(mut self, amount_cents: Cents) -> Self {
        self.amount_cents = Some(amount_cents);
        self
    }

    pub fn with_whatfor(mut self, whatfor: impl Into<String>) -> Self {
        self.whatfor = Some(whatfor.into());
        self
    }

    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    pub fn with_split_between(mut self, split_between: Vec<String>) -> Self {
        self.split_between = Some(split_between);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.amount_cents.is_none()
            && self.whatfor.is_none()
            && self.payer.is_none()
            && self.split_between.is_none()
    }

    /// Same as `NewTransaction::normalized`, for the fields that are set.
    pub fn normalized(mut self) -> Self {
        self.payer = self.payer.map(|payer| payer.trim().to_string());
        self.split_between = self.split_between.map(|split| normalize_split(&split));
        self
    }

    /// Names introduced by this update.
    pub fn referenced_names(&self) -> impl Iterator<Item = &str> {
        self.payer
            .as_deref()
            .into_iter()
            .chain(self.split_between.iter().flatten().map(String::as_str))
    }

    /// Apply the set fields onto `transaction`, leaving the rest untouched.
    pub fn apply(self, transaction: &mut Transaction) {
        if let Some(amount_cents) = self.amount_cents {
            transaction.amount_cents = amount_cents;
        }
        if let Some(whatfor) = self.whatfor {
            transaction.whatfor = whatfor;
        }
        if let Some(payer) = self.payer {
            transaction.payer = payer;
        }
        if let Some(split_between) = self.split_between {
            transaction.split_between = split_between;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            id: 7,
            bill_list_id: 1,
            amount_cents: 10000,
            whatfor: "Dinner".into(),
            payer: "alice".into(),
            split_between: vec!["alice".into(), "bob".into()],
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_update_amount_only() {
        let mut tx = sample();
        let before = tx.clone();

        TransactionUpdate::default().with_amount(15000).apply(&mut tx);

        assert_eq!(tx.amount_cents, 15000);
        assert_eq!(tx.whatfor, before.whatfor);
        assert_eq!(tx.payer, before.payer);
        assert_eq!(tx.split_between, before.split_between);
        assert_eq!(tx.id, before.id);
    }

    #[test]
    fn test_update_all_fields() {
        let mut tx = sample();

        TransactionUpdate::default()
            .with_amount(900)
            .with_whatfor("Taxi")
            .with_payer("bob")
            .with_split_between(vec!["alice".into()])
            .apply(&mut tx);

        assert_eq!(tx.amount_cents, 900);
        assert_eq!(tx.whatfor, "Taxi");
        assert_eq!(tx.payer, "bob");
        assert_eq!(tx.split_between, vec!["alice".to_string()]);
    }

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut tx = sample();
        let before = tx.clone();
        let update = TransactionUpdate::default();

        assert!(update.is_empty());
        update.apply(&mut tx);
        assert_eq!(tx, before);
    }

    #[test]
    fn test_normalized_names() {
        let new_tx = NewTransaction::new(
            100,
            "x",
            " carol ",
            vec![" dan ".into(), "".into(), "erin,frank".into()],
        )
        .normalized();
        assert_eq!(new_tx.payer, "carol");
        assert_eq!(new_tx.split_between, vec!["dan", "erin", "frank"]);

        let update = TransactionUpdate::default()
            .with_payer("bob ")
            .normalized();
        assert_eq!(update.payer.as_deref(), Some("bob"));
        assert!(update.split_between.is_none());
    }

    #[test]
    fn test_referenced_names() {
        let new_tx = NewTransaction::new(100, "x", "carol", vec!["dan".into(), "erin".into()]);
        assert_eq!(
            new_tx.referenced_names().collect::<Vec<_>>(),
            vec!["carol", "dan", "erin"]
        );

        let update = TransactionUpdate::default().with_split_between(vec!["frank".into()]);
        assert_eq!(update.referenced_names().collect::<Vec<_>>(), vec!["frank"]);
    }
}
