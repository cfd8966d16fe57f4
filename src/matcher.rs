//! Fuzzy matching of decoded bank rows against the ledger, and turning the
//! matches into an import plan the caller can preview before committing.
use crate::csv_import::CandidateRow;
use crate::domain::{ImportMode, NewTransaction, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Posting-date drift allowed between the bank row and the ledger entry.
pub const DATE_TOLERANCE_DAYS: i64 = 1;

/// Absolute currency units allowed between the two magnitudes.
pub const AMOUNT_TOLERANCE: Decimal = Decimal::ONE;

pub fn is_match(existing: &Transaction, date: NaiveDate, amount: Decimal) -> bool {
    let days = (existing.date - date).num_days().abs();
    let amount_diff = (existing.amount.abs() - amount.abs()).abs();
    days <= DATE_TOLERANCE_DAYS && amount_diff <= AMOUNT_TOLERANCE
}

/// First ledger entry, in store order, that matches. The description takes no
/// part in matching.
pub fn find_match<'a>(
    existing: &'a [Transaction],
    date: NaiveDate,
    amount: Decimal,
) -> Option<&'a Transaction> {
    existing.iter().find(|tx| is_match(tx, date, amount))
}

#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    /// Rows with no ledger counterpart, to be inserted on confirm.
    pub new: Vec<NewTransaction>,
    /// Existing, currently unreconciled entries to flip to reconciled.
    pub to_reconcile: Vec<i64>,
    /// Rows that matched an entry and are therefore not inserted.
    pub matched_rows: usize,
}

/// Matches every row against `existing` (the account's ledger) without
/// touching the store.
///
/// A matched entry stays in the candidate pool, so several rows may match the
/// same entry; `to_reconcile` is deduplicated and leaves out entries that are
/// already reconciled.
pub fn plan_import(
    existing: &[Transaction],
    rows: &[CandidateRow],
    mode: ImportMode,
    account_id: &str,
) -> ImportPlan {
    let mut plan = ImportPlan::default();

    for row in rows {
        match find_match(existing, row.date, row.amount) {
            Some(tx) => {
                plan.matched_rows += 1;
                if mode == ImportMode::Reconcile
                    && !tx.reconciled
                    && !plan.to_reconcile.contains(&tx.id)
                {
                    plan.to_reconcile.push(tx.id);
                }
            }
            None => plan.new.push(NewTransaction {
                date: row.date,
                description: row.description.clone(),
                category: row.category.clone(),
                amount: row.amount,
                reconciled: false,
                account_id: account_id.to_string(),
            }),
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn tx(id: i64, date: &str, cents: i64, reconciled: bool) -> Transaction {
        Transaction {
            id,
            date: d(date),
            description: format!("tx {id}"),
            category: "Groceries".to_string(),
            amount: Decimal::new(cents, 2),
            reconciled,
            account_id: "default".to_string(),
        }
    }

    fn row(date: &str, cents: i64) -> CandidateRow {
        CandidateRow {
            line: 2,
            date: d(date),
            description: "BANK ROW".to_string(),
            category: "Groceries".to_string(),
            amount: Decimal::new(cents, 2),
        }
    }

    #[test]
    fn tolerance_is_one_day_and_one_unit() {
        let existing = tx(1, "2024-01-10", -5000, false);
        assert!(is_match(&existing, d("2024-01-11"), Decimal::new(-5050, 2)));
        assert!(is_match(&existing, d("2024-01-09"), Decimal::new(-5100, 2)));
        assert!(!is_match(&existing, d("2024-01-11"), Decimal::new(-5200, 2)));
        assert!(!is_match(&existing, d("2024-01-12"), Decimal::new(-5000, 2)));
    }

    #[test]
    fn sign_is_ignored_when_comparing_amounts() {
        let existing = tx(1, "2024-01-10", -5000, false);
        assert!(is_match(&existing, d("2024-01-10"), Decimal::new(5000, 2)));
    }

    #[test]
    fn first_entry_in_store_order_wins() {
        let ledger = vec![tx(7, "2024-01-10", -5000, false), tx(3, "2024-01-10", -5000, false)];
        let found = find_match(&ledger, d("2024-01-10"), Decimal::new(-5000, 2)).expect("match");
        assert_eq!(found.id, 7);
    }

    #[test]
    fn sync_drops_matched_rows() {
        let ledger = vec![tx(1, "2024-01-10", -5000, false)];
        let rows = vec![row("2024-01-11", -5050), row("2024-01-15", -1200)];
        let plan = plan_import(&ledger, &rows, ImportMode::Sync, "default");
        assert_eq!(plan.new.len(), 1);
        assert_eq!(plan.new[0].amount, Decimal::new(-1200, 2));
        assert!(!plan.new[0].reconciled);
        assert!(plan.to_reconcile.is_empty());
        assert_eq!(plan.matched_rows, 1);
    }

    #[test]
    fn reconcile_marks_each_entry_once_and_skips_already_reconciled() {
        let ledger = vec![
            tx(1, "2024-01-10", -5000, false),
            tx(2, "2024-01-20", -900, true),
        ];
        let rows = vec![
            row("2024-01-10", -5000),
            row("2024-01-11", -5020),
            row("2024-01-20", -900),
            row("2024-02-01", -100),
        ];
        let plan = plan_import(&ledger, &rows, ImportMode::Reconcile, "acct");
        assert_eq!(plan.to_reconcile, vec![1]);
        assert_eq!(plan.matched_rows, 3);
        assert_eq!(plan.new.len(), 1);
        assert_eq!(plan.new[0].account_id, "acct");
        assert!(!plan.new[0].reconciled);
    }
}
