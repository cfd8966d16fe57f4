use crate::config::SortOrder;
use crate::domain::Transaction;
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReconciledFilter {
    #[default]
    All,
    Yes,
    No,
}

/// Listing filter. Text filters are case-insensitive substring matches and
/// date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub reconciled: ReconciledFilter,
}

impl TxFilter {
    pub fn accepts(&self, tx: &Transaction) -> bool {
        if self.start.is_some_and(|s| tx.date < s) {
            return false;
        }
        if self.end.is_some_and(|e| tx.date > e) {
            return false;
        }
        if let Some(needle) = &self.description {
            if !contains_ci(&tx.description, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.category {
            if !contains_ci(&tx.category, needle) {
                return false;
            }
        }
        match self.reconciled {
            ReconciledFilter::All => true,
            ReconciledFilter::Yes => tx.reconciled,
            ReconciledFilter::No => !tx.reconciled,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub tx: Transaction,
    pub balance: Decimal,
}

/// Running balance over the filtered set.
///
/// Balances always accumulate in ascending date order (stable, so equal
/// dates keep their input order); `order` only affects the returned display
/// order.
pub fn running_balances(
    transactions: Vec<Transaction>,
    filter: &TxFilter,
    order: SortOrder,
) -> Vec<LedgerRow> {
    let mut filtered: Vec<Transaction> = transactions
        .into_iter()
        .filter(|tx| filter.accepts(tx))
        .collect();
    filtered.sort_by_key(|tx| tx.date);

    let mut balance = Decimal::ZERO;
    let mut rows: Vec<LedgerRow> = filtered
        .into_iter()
        .map(|tx| {
            balance += tx.amount;
            LedgerRow { tx, balance }
        })
        .collect();

    if order == SortOrder::Desc {
        rows.sort_by(|a, b| b.tx.date.cmp(&a.tx.date));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: i64, date: &str, cents: i64, reconciled: bool, desc: &str) -> Transaction {
        Transaction {
            id,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            description: desc.to_string(),
            category: "Food".to_string(),
            amount: Decimal::new(cents, 2),
            reconciled,
            account_id: "default".to_string(),
        }
    }

    #[test]
    fn empty_ledger_yields_no_rows() {
        assert!(running_balances(Vec::new(), &TxFilter::default(), SortOrder::Asc).is_empty());
    }

    #[test]
    fn balance_accumulates_chronologically_regardless_of_display_order() {
        let txs = vec![
            tx(1, "2024-01-03", -2000, false, "gas"),
            tx(2, "2024-01-01", 10000, true, "pay"),
            tx(3, "2024-01-02", -550, false, "coffee"),
        ];

        let asc = running_balances(txs.clone(), &TxFilter::default(), SortOrder::Asc);
        let got: Vec<(i64, Decimal)> = asc.iter().map(|r| (r.tx.id, r.balance)).collect();
        assert_eq!(
            got,
            vec![
                (2, Decimal::new(10000, 2)),
                (3, Decimal::new(9450, 2)),
                (1, Decimal::new(7450, 2)),
            ]
        );

        let desc = running_balances(txs, &TxFilter::default(), SortOrder::Desc);
        let got: Vec<(i64, Decimal)> = desc.iter().map(|r| (r.tx.id, r.balance)).collect();
        assert_eq!(
            got,
            vec![
                (1, Decimal::new(7450, 2)),
                (3, Decimal::new(9450, 2)),
                (2, Decimal::new(10000, 2)),
            ]
        );
    }

    #[test]
    fn each_balance_is_previous_plus_amount() {
        let txs = vec![
            tx(1, "2024-03-01", 1234, false, "a"),
            tx(2, "2024-03-01", -99, false, "b"),
            tx(3, "2024-02-28", -1, false, "c"),
            tx(4, "2024-03-05", 500, false, "d"),
        ];
        let rows = running_balances(txs, &TxFilter::default(), SortOrder::Asc);
        let mut prev = Decimal::ZERO;
        for row in &rows {
            assert_eq!(row.balance, prev + row.tx.amount);
            prev = row.balance;
        }
        // Equal dates keep input order.
        let ids: Vec<i64> = rows.iter().map(|r| r.tx.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
    }

    #[test]
    fn balance_is_computed_over_filtered_set() {
        let txs = vec![
            tx(1, "2024-01-01", 10000, true, "Paycheck"),
            tx(2, "2024-01-02", -2500, false, "Grocer"),
            tx(3, "2024-01-03", -1000, true, "GROCER outlet"),
        ];
        let filter = TxFilter {
            description: Some("grocer".to_string()),
            ..TxFilter::default()
        };
        let rows = running_balances(txs.clone(), &filter, SortOrder::Asc);
        let balances: Vec<Decimal> = rows.iter().map(|r| r.balance).collect();
        assert_eq!(balances, vec![Decimal::new(-2500, 2), Decimal::new(-3500, 2)]);

        let filter = TxFilter {
            reconciled: ReconciledFilter::Yes,
            end: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..TxFilter::default()
        };
        let rows = running_balances(txs, &filter, SortOrder::Asc);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tx.id, 1);
    }
}
