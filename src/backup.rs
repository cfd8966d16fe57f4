use crate::db::{Db, Store};
use crate::domain::Backup;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::fallback_account;
use csv::{QuoteStyle, WriterBuilder};

pub fn export_json(store: &Store<'_>) -> LedgerResult<Backup> {
    Ok(Backup {
        accounts: store.list_accounts()?,
        transactions: store.all_transactions()?,
        budget: store.budget_template()?,
        budget_history: store.list_snapshots()?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub accounts: usize,
    pub transactions: usize,
    pub budget: usize,
    pub snapshots: usize,
    /// Account the session should use after the restore.
    pub current_account: String,
}

/// Replaces all four collections with the contents of a JSON export.
///
/// The text is parsed completely before anything is cleared; a malformed
/// file leaves the store as it was. Collections missing from older exports
/// restore as empty, and the default account is always recreated.
pub fn restore_json(db: &mut Db, text: &str, current_account: &str) -> LedgerResult<RestoreReport> {
    let backup: Backup = serde_json::from_str(text)?;

    let report = db.write(|store| -> LedgerResult<RestoreReport> {
        store.clear_all()?;
        for account in &backup.accounts {
            store.put_account(account)?;
        }
        store.ensure_default_account()?;
        for tx in &backup.transactions {
            store.put_transaction(tx)?;
        }
        for entry in &backup.budget {
            store.upsert_budget_entry(entry)?;
        }
        for snapshot in &backup.budget_history {
            store.put_snapshot(snapshot)?;
        }

        let accounts = store.list_accounts()?;
        Ok(RestoreReport {
            accounts: accounts.len(),
            transactions: backup.transactions.len(),
            budget: backup.budget.len(),
            snapshots: backup.budget_history.len(),
            current_account: fallback_account(&accounts, current_account),
        })
    })?;

    tracing::info!(
        accounts = report.accounts,
        transactions = report.transactions,
        snapshots = report.snapshots,
        "restored backup"
    );
    Ok(report)
}

const CSV_HEADERS: [&str; 5] = ["Date", "Description", "Category", "Amount", "Reconciled"];

/// One account's ledger as CSV, oldest first. The header is bare; in the rows
/// every non-numeric field is quoted and the amount is not.
pub fn export_csv(store: &Store<'_>, account_id: &str) -> LedgerResult<String> {
    let mut transactions = store.transactions_for_account(account_id)?;
    transactions.sort_by_key(|tx| tx.date);

    let mut header = WriterBuilder::new().from_writer(Vec::new());
    header.write_record(CSV_HEADERS)?;
    let buf = header
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(buf);
    for tx in &transactions {
        writer.write_record([
            tx.date.format("%Y-%m-%d").to_string(),
            tx.description.clone(),
            tx.category.clone(),
            tx.amount.to_string(),
            tx.reconciled.to_string(),
        ])?;
    }
    let buf = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    String::from_utf8(buf).map_err(|err| LedgerError::Corrupt(err.to_string()))
}
