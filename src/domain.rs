use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ACCOUNT_ID: &str = "default";
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const OPENING_BALANCE: &str = "Opening Balance";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub label: String,
}

impl Account {
    pub fn default_account() -> Self {
        Self {
            id: DEFAULT_ACCOUNT_ID.to_string(),
            name: "Checking".to_string(),
            label: "Checking".to_string(),
        }
    }
}

/// A ledger entry as stored. `amount` is signed: negative is an expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

fn default_account_id() -> String {
    DEFAULT_ACCOUNT_ID.to_string()
}

/// A transaction that has not been written yet (no id assigned).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount: Decimal,
    pub reconciled: bool,
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEntry {
    pub category: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub amount: Decimal,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision")]
    pub spent: Decimal,
}

impl BudgetEntry {
    pub fn remaining(&self) -> Decimal {
        self.amount - self.spent
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub month: String,
    pub budgets: Vec<BudgetEntry>,
}

impl BudgetSnapshot {
    pub fn entry_mut(&mut self, category: &str) -> Option<&mut BudgetEntry> {
        self.budgets.iter_mut().find(|b| b.category == category)
    }
}

/// Full-store JSON backup. Field names follow the export format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub budget: Vec<BudgetEntry>,
    #[serde(default)]
    pub budget_history: Vec<BudgetSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Sync,
    Reconcile,
}

/// "YYYY-MM" key of the month containing `date`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Inclusive first/last day of a "YYYY-MM" month key.
pub fn month_bounds(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (y, m) = month.split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
        return None;
    }
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)? - Duration::days(1);
    Some((start, end))
}

pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
