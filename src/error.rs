//! Errors surfaced by the ledger core.
//!
//! Whole-operation preconditions fail with one of these before anything is
//! written. Row-level CSV problems are not errors; they are collected as
//! [`RowWarning`](crate::csv_import::RowWarning)s instead.
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Could not recognize this CSV format; the header matches no known bank profile: {header}")]
    UnrecognizedFormat { header: String },
    #[error("CSV file is empty or has no data rows")]
    EmptyCsv,
    #[error(
        "Cannot purge through {cutoff}: the cutoff must fall before the current month (which starts {month_start})"
    )]
    CurrentMonthPurge {
        cutoff: NaiveDate,
        month_start: NaiveDate,
    },
    #[error("Failed to persist budget snapshot for {month}; nothing was purged")]
    SnapshotPersistence {
        month: String,
        #[source]
        source: Box<LedgerError>,
    },
    #[error("Backup file is not a valid export: {0}")]
    ImportParse(#[from] serde_json::Error),
    #[error("The default account cannot be deleted")]
    DefaultAccountDeletion,
    #[error("No such account: '{0}'")]
    AccountNotFound(String),
    #[error("No such transaction: {0}")]
    TransactionNotFound(i64),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Corrupt record in store: {0}")]
    Corrupt(String),
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
