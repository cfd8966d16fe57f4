use crate::config::AppPaths;
use crate::domain::{Account, BudgetEntry, BudgetSnapshot, NewTransaction, Transaction};
use crate::error::{LedgerError, LedgerResult};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Params, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::PathBuf;

const DATE_FMT: &str = "%Y-%m-%d";

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths) -> Result<(Self, PathBuf)> {
        fs::create_dir_all(&paths.data_dir)
            .with_context(|| format!("Failed to create data dir {}", paths.data_dir.display()))?;

        let db_path = paths.data_dir.join("checkbook.sqlite3");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;

        let db = Self { conn };
        db.migrate()?;
        Ok((db, db_path))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> LedgerResult<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.migrate()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> LedgerResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                label TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                amount TEXT NOT NULL,
                reconciled INTEGER NOT NULL DEFAULT 0,
                account_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_reconciled ON transactions(reconciled);
            CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category);

            CREATE TABLE IF NOT EXISTS budget (
                category TEXT PRIMARY KEY,
                amount TEXT NOT NULL,
                spent TEXT NOT NULL,
                position INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS budget_history (
                month TEXT PRIMARY KEY,
                budgets_json TEXT NOT NULL
            );
            "#,
        )?;
        self.read().ensure_default_account()?;
        Ok(())
    }

    /// Store over the connection without a write scope; each statement
    /// commits on its own.
    pub fn read(&self) -> Store<'_> {
        Store { conn: &self.conn }
    }

    /// Runs `f` inside one SQLite transaction. Nothing is visible to later
    /// scopes unless `f` returns `Ok` and the commit succeeds.
    pub fn write<T, E>(&mut self, f: impl FnOnce(&Store<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.transaction()?;
        let out = f(&Store { conn: &*tx })?;
        tx.commit()?;
        Ok(out)
    }
}

/// Query surface of the record store, usable both outside and inside a
/// write scope.
pub struct Store<'a> {
    conn: &'a Connection,
}

type RawTx = (i64, String, String, String, String, bool, String);

impl Store<'_> {
    pub fn ensure_default_account(&self) -> LedgerResult<()> {
        let def = Account::default_account();
        self.conn.execute(
            "INSERT OR IGNORE INTO accounts (id, name, label) VALUES (?1, ?2, ?3)",
            params![def.id, def.name, def.label],
        )?;
        Ok(())
    }

    pub fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, label FROM accounts ORDER BY rowid ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                label: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_account(&self, id: &str) -> LedgerResult<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT id, name, label FROM accounts WHERE id = ?1",
                [id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        label: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    pub fn put_account(&self, account: &Account) -> LedgerResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO accounts (id, name, label) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, label = excluded.label
            "#,
            params![account.id, account.name, account.label],
        )?;
        Ok(())
    }

    /// Removes the account row and every transaction it owns. Returns the
    /// number of transactions removed.
    pub fn delete_account_cascade(&self, id: &str) -> LedgerResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM transactions WHERE account_id = ?1", [id])?;
        self.conn.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
        Ok(removed)
    }

    pub fn insert_transaction(&self, tx: &NewTransaction) -> LedgerResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO transactions (date, description, category, amount, reconciled, account_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                tx.date.format(DATE_FMT).to_string(),
                tx.description,
                tx.category,
                tx.amount.to_string(),
                tx.reconciled,
                tx.account_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert-or-replace keeping the caller's id (used by restore and edits).
    pub fn put_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO transactions (id, date, description, category, amount, reconciled, account_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                description = excluded.description,
                category = excluded.category,
                amount = excluded.amount,
                reconciled = excluded.reconciled,
                account_id = excluded.account_id
            "#,
            params![
                tx.id,
                tx.date.format(DATE_FMT).to_string(),
                tx.description,
                tx.category,
                tx.amount.to_string(),
                tx.reconciled,
                tx.account_id,
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, id: i64) -> LedgerResult<Option<Transaction>> {
        let mut found = self.query_transactions(
            "SELECT id, date, description, category, amount, reconciled, account_id FROM transactions WHERE id = ?1",
            [id],
        )?;
        Ok(found.pop())
    }

    pub fn delete_transaction(&self, id: i64) -> LedgerResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1", [id])?)
    }

    pub fn set_reconciled(&self, id: i64, reconciled: bool) -> LedgerResult<usize> {
        Ok(self.conn.execute(
            "UPDATE transactions SET reconciled = ?1 WHERE id = ?2",
            params![reconciled, id],
        )?)
    }

    /// All transactions of one account in store iteration order (by id).
    pub fn transactions_for_account(&self, account_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.query_transactions(
            r#"
            SELECT id, date, description, category, amount, reconciled, account_id
            FROM transactions
            WHERE account_id = ?1
            ORDER BY id ASC
            "#,
            [account_id],
        )
    }

    /// Ascending date-index scan over every account, bounds inclusive.
    pub fn transactions_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<Vec<Transaction>> {
        self.query_transactions(
            r#"
            SELECT id, date, description, category, amount, reconciled, account_id
            FROM transactions
            WHERE date >= ?1 AND date <= ?2
            ORDER BY date ASC, id ASC
            "#,
            params![
                start.format(DATE_FMT).to_string(),
                end.format(DATE_FMT).to_string()
            ],
        )
    }

    /// Ascending date-index scan over every account up to `cutoff` inclusive.
    pub fn transactions_through(&self, cutoff: NaiveDate) -> LedgerResult<Vec<Transaction>> {
        self.query_transactions(
            r#"
            SELECT id, date, description, category, amount, reconciled, account_id
            FROM transactions
            WHERE date <= ?1
            ORDER BY date ASC, id ASC
            "#,
            [cutoff.format(DATE_FMT).to_string()],
        )
    }

    pub fn all_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        self.query_transactions(
            "SELECT id, date, description, category, amount, reconciled, account_id FROM transactions ORDER BY id ASC",
            [],
        )
    }

    pub fn budget_template(&self) -> LedgerResult<Vec<BudgetEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, amount, spent FROM budget ORDER BY position ASC, category ASC")?;
        let rows = stmt.query_map([], |row| {
            let category: String = row.get(0)?;
            let amount: String = row.get(1)?;
            let spent: String = row.get(2)?;
            Ok((category, amount, spent))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (category, amount, spent) = row?;
            out.push(BudgetEntry {
                amount: parse_decimal_column(&amount, "budget.amount")?,
                spent: parse_decimal_column(&spent, "budget.spent")?,
                category,
            });
        }
        Ok(out)
    }

    /// Inserts a template entry at the end, or updates it in place. Returns
    /// `true` when the category was new.
    pub fn upsert_budget_entry(&self, entry: &BudgetEntry) -> LedgerResult<bool> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT position FROM budget WHERE category = ?1",
                [&entry.category],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(_) => {
                self.conn.execute(
                    "UPDATE budget SET amount = ?1, spent = ?2 WHERE category = ?3",
                    params![entry.amount.to_string(), entry.spent.to_string(), entry.category],
                )?;
                Ok(false)
            }
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO budget (category, amount, spent, position)
                    VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), -1) + 1 FROM budget))
                    "#,
                    params![entry.category, entry.amount.to_string(), entry.spent.to_string()],
                )?;
                Ok(true)
            }
        }
    }

    pub fn delete_budget_entry(&self, category: &str) -> LedgerResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM budget WHERE category = ?1", [category])?)
    }

    pub fn get_snapshot(&self, month: &str) -> LedgerResult<Option<BudgetSnapshot>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT budgets_json FROM budget_history WHERE month = ?1",
                [month],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| decode_snapshot(month.to_string(), &json))
            .transpose()
    }

    pub fn put_snapshot(&self, snapshot: &BudgetSnapshot) -> LedgerResult<()> {
        let json = serde_json::to_string(&snapshot.budgets)
            .map_err(|e| LedgerError::Corrupt(format!("budget snapshot {}: {e}", snapshot.month)))?;
        self.conn.execute(
            r#"
            INSERT INTO budget_history (month, budgets_json) VALUES (?1, ?2)
            ON CONFLICT(month) DO UPDATE SET budgets_json = excluded.budgets_json
            "#,
            params![snapshot.month, json],
        )?;
        Ok(())
    }

    pub fn list_snapshots(&self) -> LedgerResult<Vec<BudgetSnapshot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT month, budgets_json FROM budget_history ORDER BY month ASC")?;
        let rows = stmt.query_map([], |row| {
            let month: String = row.get(0)?;
            let json: String = row.get(1)?;
            Ok((month, json))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (month, json) = row?;
            out.push(decode_snapshot(month, &json)?);
        }
        Ok(out)
    }

    /// Empties all four collections.
    pub fn clear_all(&self) -> LedgerResult<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM transactions;
            DELETE FROM accounts;
            DELETE FROM budget;
            DELETE FROM budget_history;
            "#,
        )?;
        Ok(())
    }

    fn query_transactions<P: Params>(&self, sql: &str, params: P) -> LedgerResult<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| -> rusqlite::Result<RawTx> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, date, description, category, amount, reconciled, account_id) = row?;
            let date = NaiveDate::parse_from_str(&date, DATE_FMT)
                .map_err(|e| LedgerError::Corrupt(format!("transaction {id} date '{date}': {e}")))?;
            out.push(Transaction {
                id,
                date,
                description,
                category,
                amount: parse_decimal_column(&amount, "transactions.amount")?,
                reconciled,
                account_id,
            });
        }
        Ok(out)
    }
}

fn parse_decimal_column(raw: &str, column: &str) -> LedgerResult<Decimal> {
    raw.parse::<Decimal>()
        .map_err(|e| LedgerError::Corrupt(format!("{column} '{raw}': {e}")))
}

fn decode_snapshot(month: String, json: &str) -> LedgerResult<BudgetSnapshot> {
    let budgets: Vec<BudgetEntry> = serde_json::from_str(json)
        .map_err(|e| LedgerError::Corrupt(format!("budget snapshot {month}: {e}")))?;
    Ok(BudgetSnapshot { month, budgets })
}
