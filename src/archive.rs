//! Purging reconciled history.
//!
//! A purge runs as two separate write scopes. The first freezes a budget
//! snapshot for every past month the purge could affect and commits. Only
//! then does the second scope re-read the account, insert the synthetic
//! opening balance and delete the purged entries. If the first scope fails
//! nothing is deleted; if the second fails the committed snapshots stay.
use crate::budget;
use crate::db::Db;
use crate::domain::{NewTransaction, OPENING_BALANCE, Transaction, first_of_month, month_key};
use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct PurgeReport {
    pub cutoff: NaiveDate,
    pub purged: usize,
    /// Past months holding reconciled expenses through the cutoff, any account.
    pub affected_months: Vec<String>,
    /// How many of those months got a new snapshot in this run.
    pub snapshots_created: usize,
    /// Net of the purged entries; zero means no entry was inserted.
    pub opening_balance: Decimal,
}

/// Months before `open_month` with at least one reconciled expense among
/// `transactions`.
fn months_with_reconciled_expenses(transactions: &[Transaction], open_month: &str) -> Vec<String> {
    let months: BTreeSet<String> = transactions
        .iter()
        .filter(|tx| tx.reconciled && tx.amount < Decimal::ZERO)
        .map(|tx| month_key(tx.date))
        .filter(|m| m.as_str() < open_month)
        .collect();
    months.into_iter().collect()
}

/// A purge may only reach back to the day before the open month starts.
pub fn check_cutoff(cutoff: NaiveDate, today: NaiveDate) -> LedgerResult<()> {
    let month_start = first_of_month(today);
    if cutoff >= month_start {
        return Err(LedgerError::CurrentMonthPurge {
            cutoff,
            month_start,
        });
    }
    Ok(())
}

/// Removes `account_id`'s reconciled transactions dated on or before
/// `cutoff`, replacing their net with one opening-balance entry dated the day
/// after the cutoff.
pub fn purge(
    db: &mut Db,
    account_id: &str,
    cutoff: NaiveDate,
    today: NaiveDate,
) -> LedgerResult<PurgeReport> {
    check_cutoff(cutoff, today)?;
    let opening_date = cutoff
        .succ_opt()
        .ok_or_else(|| LedgerError::InvalidInput(format!("no day follows {cutoff}")))?;
    if db.read().get_account(account_id)?.is_none() {
        return Err(LedgerError::AccountNotFound(account_id.to_string()));
    }

    let open_month = month_key(today);
    let mut scanned: Vec<String> = Vec::new();
    let snapshots_created = db
        .write(|store| -> LedgerResult<usize> {
            scanned = months_with_reconciled_expenses(&store.transactions_through(cutoff)?, &open_month);
            let mut created = 0;
            for month in &scanned {
                let wrote = budget::ensure_snapshot(store, month).map_err(|source| {
                    LedgerError::SnapshotPersistence {
                        month: month.clone(),
                        source: Box::new(source),
                    }
                })?;
                if wrote {
                    created += 1;
                }
            }
            Ok(created)
        })
        .map_err(|err| match err {
            err @ LedgerError::SnapshotPersistence { .. } => err,
            other => LedgerError::SnapshotPersistence {
                month: scanned.join(", "),
                source: Box::new(other),
            },
        })?;
    tracing::debug!(
        months = scanned.len(),
        created = snapshots_created,
        "budget snapshots committed before purge"
    );

    let (purged, opening_balance) = db.write(|store| -> LedgerResult<(usize, Decimal)> {
        let doomed: Vec<Transaction> = store
            .transactions_for_account(account_id)?
            .into_iter()
            .filter(|tx| tx.reconciled && tx.date <= cutoff)
            .collect();
        let opening: Decimal = doomed.iter().map(|tx| tx.amount).sum();

        if !opening.is_zero() {
            store.insert_transaction(&NewTransaction {
                date: opening_date,
                description: OPENING_BALANCE.to_string(),
                category: OPENING_BALANCE.to_string(),
                amount: opening,
                reconciled: true,
                account_id: account_id.to_string(),
            })?;
            budget::on_ledger_change(store, today, &[opening_date])?;
        }
        for tx in &doomed {
            store.delete_transaction(tx.id)?;
        }
        Ok((doomed.len(), opening))
    })?;

    tracing::info!(
        account = account_id,
        %cutoff,
        purged,
        %opening_balance,
        "purged reconciled history"
    );

    Ok(PurgeReport {
        cutoff,
        purged,
        affected_months: scanned,
        snapshots_created,
        opening_balance,
    })
}
