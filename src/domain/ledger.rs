use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Cents, Transaction, cents_to_units};

/// Pairwise net balances between every two participants of a bill list.
///
/// `get(a, b)` is the amount `b` owes `a` when positive, or `a` owes `b`
/// when negative. The diagonal is always 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BalanceMatrix {
    rows: BTreeMap<String, BTreeMap<String, Cents>>,
}

impl BalanceMatrix {
    /// A matrix with every cell at 0.
    pub fn zeroed<S: AsRef<str>>(participants: &[S]) -> Self {
        let names: BTreeSet<&str> = participants.iter().map(AsRef::as_ref).collect();
        let rows = names
            .iter()
            .map(|a| {
                let row = names.iter().map(|b| (b.to_string(), 0)).collect();
                (a.to_string(), row)
            })
            .collect();
        Self { rows }
    }

    pub fn get(&self, creditor: &str, debtor: &str) -> Option<Cents> {
        self.rows.get(creditor)?.get(debtor).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn rows(&self) -> &BTreeMap<String, BTreeMap<String, Cents>> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// What everyone else owes `name` in total (negative: what `name` owes).
    pub fn net_position(&self, name: &str) -> Option<Cents> {
        let row = self.rows.get(name)?;
        Some(row.values().fold(0, |acc: Cents, v| acc.saturating_add(*v)))
    }

    /// True when nobody owes anybody anything.
    pub fn is_settled(&self) -> bool {
        self.rows.values().flat_map(|row| row.values()).all(|v| *v == 0)
    }

    /// Decimal units instead of cents, the shape returned to API clients.
    pub fn to_units(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.rows
            .iter()
            .map(|(a, row)| {
                let row = row
                    .iter()
                    .map(|(b, cents)| (b.clone(), cents_to_units(*cents)))
                    .collect();
                (a.clone(), row)
            })
            .collect()
    }

    fn set_pair(&mut self, creditor: &str, debtor: &str, amount: Cents) {
        if let Some(cell) = self.rows.get_mut(creditor).and_then(|r| r.get_mut(debtor)) {
            *cell = amount;
        }
        if let Some(cell) = self.rows.get_mut(debtor).and_then(|r| r.get_mut(creditor)) {
            *cell = -amount;
        }
    }
}

/// Compute the balance matrix of a bill list from its transactions.
///
/// Each transaction splits its amount equally among the names in
/// `split_between`; every split member other than the payer owes the payer
/// one share. Transactions with an empty split contribute nothing, and so do
/// names that are not in `participants`.
///
/// Shares are not rounded per transaction. Amounts are summed exactly per
/// participant pair and split size, then divided once and rounded half away
/// from zero to the cent. Each pair is computed once and mirrored, so
/// `get(a, b) == -get(b, a)` holds exactly. The result does not depend on
/// transaction order.
pub fn compute_balances<S: AsRef<str>>(
    participants: &[S],
    transactions: &[Transaction],
) -> BalanceMatrix {
    let mut matrix = BalanceMatrix::zeroed(participants);
    let members: BTreeSet<&str> = participants.iter().map(AsRef::as_ref).collect();

    // (lower name, higher name) -> split size -> amount owed by higher to lower
    let mut owed: BTreeMap<(&str, &str), BTreeMap<usize, i128>> = BTreeMap::new();

    for transaction in transactions {
        let size = transaction.split_between.len();
        if size == 0 {
            continue;
        }
        let payer = transaction.payer.as_str();
        if !members.contains(payer) {
            continue;
        }

        for member in &transaction.split_between {
            let member = member.as_str();
            if member == payer || !members.contains(member) {
                continue;
            }
            let amount = i128::from(transaction.amount_cents);
            let (key, signed) = if payer < member {
                ((payer, member), amount)
            } else {
                ((member, payer), -amount)
            };
            *owed.entry(key).or_default().entry(size).or_insert(0) += signed;
        }
    }

    for ((lower, higher), by_size) in owed {
        let total: i128 = by_size
            .into_iter()
            .map(|(size, amount)| div_round(amount, size as i128))
            .sum();
        let cell = total.clamp(-i128::from(Cents::MAX), i128::from(Cents::MAX)) as Cents;
        matrix.set_pair(lower, higher, cell);
    }

    matrix
}

/// Names used as payer or split member that are not participants.
pub fn unknown_names<S: AsRef<str>>(
    participants: &[S],
    transactions: &[Transaction],
) -> BTreeSet<String> {
    let members: BTreeSet<&str> = participants.iter().map(AsRef::as_ref).collect();
    transactions
        .iter()
        .flat_map(|t| std::iter::once(&t.payer).chain(t.split_between.iter()))
        .filter(|name| !members.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::parse_split;

    fn tx(id: i64, amount_cents: Cents, payer: &str, split: &str) -> Transaction {
        Transaction {
            id,
            bill_list_id: 1,
            amount_cents,
            whatfor: format!("expense {}", id),
            payer: payer.to_string(),
            split_between: parse_split(split),
            recorded_at: Utc::now(),
        }
    }

    fn assert_antisymmetric(matrix: &BalanceMatrix) {
        for a in matrix.names() {
            for b in matrix.names() {
                if a == b {
                    assert_eq!(matrix.get(a, b), Some(0), "diagonal for {}", a);
                } else {
                    assert_eq!(
                        matrix.get(a, b).map(|v| -v),
                        matrix.get(b, a),
                        "pair {} / {}",
                        a,
                        b
                    );
                }
            }
        }
    }

    fn total(matrix: &BalanceMatrix) -> i128 {
        matrix
            .rows()
            .values()
            .flat_map(|row| row.values())
            .map(|v| i128::from(*v))
            .sum()
    }

    #[test]
    fn test_two_people_even_split() {
        let matrix = compute_balances(&["P1", "P2"], &[tx(1, 10000, "P1", "P1, P2")]);

        assert_eq!(matrix.get("P1", "P2"), Some(5000));
        assert_eq!(matrix.get("P2", "P1"), Some(-5000));
    }

    #[test]
    fn test_no_transactions_all_zero() {
        let matrix = compute_balances(&["a", "b", "c"], &[]);

        assert_eq!(matrix.len(), 3);
        assert!(matrix.is_settled());
        for a in matrix.names() {
            for b in matrix.names() {
                assert_eq!(matrix.get(a, b), Some(0));
            }
        }
    }

    #[test]
    fn test_no_participants() {
        let matrix = compute_balances::<&str>(&[], &[tx(1, 500, "a", "a, b")]);
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_payer_outside_split() {
        let matrix = compute_balances(&["ann", "ben", "cat"], &[tx(1, 9000, "ann", "ben, cat")]);

        assert_eq!(matrix.get("ann", "ben"), Some(4500));
        assert_eq!(matrix.get("ann", "cat"), Some(4500));
        assert_eq!(matrix.get("ben", "cat"), Some(0));
        assert_eq!(matrix.net_position("ann"), Some(9000));
        assert_eq!(matrix.net_position("ben"), Some(-4500));
    }

    #[test]
    fn test_opposite_debts_net_out() {
        let matrix = compute_balances(
            &["ann", "ben"],
            &[tx(1, 6000, "ann", "ann, ben"), tx(2, 2000, "ben", "ann, ben")],
        );

        assert_eq!(matrix.get("ann", "ben"), Some(2000));
        assert_eq!(matrix.get("ben", "ann"), Some(-2000));
    }

    #[test]
    fn test_empty_split_is_noop() {
        let matrix = compute_balances(&["ann", "ben"], &[tx(1, 5000, "ann", " ")]);
        assert!(matrix.is_settled());
    }

    #[test]
    fn test_only_payer_in_split_is_noop() {
        let matrix = compute_balances(&["ann", "ben"], &[tx(1, 5000, "ann", "ann")]);
        assert!(matrix.is_settled());
    }

    #[test]
    fn test_three_way_split_rounds_to_cents() {
        let matrix = compute_balances(&["a", "b", "c"], &[tx(1, 10000, "a", "a, b, c")]);

        assert_eq!(matrix.get("a", "b"), Some(3333));
        assert_eq!(matrix.get("a", "c"), Some(3333));
        assert_eq!(matrix.get("c", "a"), Some(-3333));
        assert_antisymmetric(&matrix);
    }

    #[test]
    fn test_shares_summed_before_rounding() {
        // Three 1.00 expenses split three ways: 3 x 33.33 would drift to 99.99
        let transactions: Vec<_> = (1..=3).map(|i| tx(i, 100, "a", "a, b, c")).collect();
        let matrix = compute_balances(&["a", "b", "c"], &transactions);

        assert_eq!(matrix.get("a", "b"), Some(100));
        assert_eq!(matrix.get("a", "c"), Some(100));
    }

    #[test]
    fn test_half_cent_rounds_away_from_zero() {
        let matrix = compute_balances(&["a", "b"], &[tx(1, 1, "a", "a, b")]);
        assert_eq!(matrix.get("a", "b"), Some(1));
        assert_eq!(matrix.get("b", "a"), Some(-1));

        let matrix = compute_balances(&["a", "b"], &[tx(1, 1, "b", "a, b")]);
        assert_eq!(matrix.get("a", "b"), Some(-1));
    }

    #[test]
    fn test_duplicate_split_name_takes_two_shares() {
        let matrix = compute_balances(&["a", "b"], &[tx(1, 300, "b", "a, a, b")]);
        assert_eq!(matrix.get("b", "a"), Some(200));
    }

    #[test]
    fn test_antisymmetric_and_zero_sum() {
        let transactions = vec![
            tx(1, 12345, "ann", "ann, ben, cat"),
            tx(2, 999, "ben", "cat, dan"),
            tx(3, 7001, "cat", "ann, ben, cat, dan"),
            tx(4, 50, "dan", "ann"),
            tx(5, 100000, "ann", "ben, cat, dan"),
            tx(6, 1, "ben", "ann, ben, cat"),
        ];
        let matrix = compute_balances(&["ann", "ben", "cat", "dan"], &transactions);

        assert_antisymmetric(&matrix);
        assert_eq!(total(&matrix), 0);
    }

    #[test]
    fn test_order_independent_and_repeatable() {
        let participants = ["x", "y", "z"];
        let transactions = vec![
            tx(1, 1000, "x", "x, y, z"),
            tx(2, 250, "y", "x, z"),
            tx(3, 777, "z", "x, y"),
        ];
        let mut reversed = transactions.clone();
        reversed.reverse();

        let first = compute_balances(&participants, &transactions);
        let second = compute_balances(&participants, &transactions);
        let shuffled = compute_balances(&participants, &reversed);

        assert_eq!(first, second);
        assert_eq!(first, shuffled);
    }

    #[test]
    fn test_removing_transaction_removes_its_contribution() {
        let participants = ["a", "b", "c"];
        let kept = vec![tx(1, 4000, "a", "a, b"), tx(2, 600, "c", "a, b, c")];
        let mut all = kept.clone();
        all.push(tx(3, 9900, "b", "a, b, c"));

        let with_extra = compute_balances(&participants, &all);
        let without = compute_balances(&participants, &kept);

        assert_ne!(with_extra, without);
        all.retain(|t| t.id != 3);
        assert_eq!(compute_balances(&participants, &all), without);
    }

    #[test]
    fn test_unknown_names_are_ignored_and_reported() {
        let transactions = vec![
            tx(1, 1000, "ann", "ann, ghost"),
            tx(2, 1000, "stranger", "ann, ben"),
            tx(3, 1000, "ann", "ann, ben"),
        ];
        let matrix = compute_balances(&["ann", "ben"], &transactions);

        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.get("ann", "ben"), Some(500));
        assert_eq!(matrix.get("ann", "ghost"), None);

        let unknown = unknown_names(&["ann", "ben"], &transactions);
        assert_eq!(
            unknown.into_iter().collect::<Vec<_>>(),
            vec!["ghost".to_string(), "stranger".to_string()]
        );
    }

    #[test]
    fn test_to_units() {
        let matrix = compute_balances(&["P1", "P2"], &[tx(1, 10000, "P1", "P1, P2")]);
        let units = matrix.to_units();

        assert_eq!(units["P1"]["P2"], 50.0);
        assert_eq!(units["P2"]["P1"], -50.0);
        assert_eq!(units["P1"]["P1"], 0.0);
    }

    #[test]
    fn test_serializes_as_nested_map() {
        let matrix = compute_balances(&["a", "b"], &[tx(1, 200, "a", "a, b")]);
        let json = serde_json::to_value(&matrix).unwrap();

        assert_eq!(json["a"]["b"], 100);
        assert_eq!(json["b"]["a"], -100);
    }

    #[test]
    fn test_div_round() {
        assert_eq!(div_round(10000, 3), 3333);
        assert_eq!(div_round(20000, 3), 6667);
        assert_eq!(div_round(-20000, 3), -6667);
        assert_eq!(div_round(5, 2), 3);
        assert_eq!(div_round(-5, 2), -3);
        assert_eq!(div_round(4, 2), 2);
    }
}
