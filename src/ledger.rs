//! Account and transaction mutations.
//!
//! Every function here runs against a [`Store`] and is meant to be called
//! from inside one `Db::write` scope. Each transaction mutation reports the
//! dates it touched to the budget manager so the open month stays current.
use crate::budget;
use crate::db::Store;
use crate::domain::{
    Account, DEFAULT_ACCOUNT_ID, NewTransaction, Transaction, UNCATEGORIZED,
};
use crate::error::{LedgerError, LedgerResult};
use crate::matcher::ImportPlan;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Entry direction chosen at manual entry; forces the sign of the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Direction::Credit => amount.abs(),
            Direction::Debit => -amount.abs(),
        }
    }
}

pub fn require_account(store: &Store<'_>, id: &str) -> LedgerResult<Account> {
    store
        .get_account(id)?
        .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
}

pub fn add_account(store: &Store<'_>, name: &str, label: Option<&str>) -> LedgerResult<Account> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidInput(
            "account name must not be empty".to_string(),
        ));
    }
    let label = label
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(name);

    let account = Account {
        id: format!("account_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        label: label.to_string(),
    };
    store.put_account(&account)?;
    Ok(account)
}

/// Deletes an account and all of its transactions. Returns how many
/// transactions went with it.
pub fn delete_account(store: &Store<'_>, id: &str, today: NaiveDate) -> LedgerResult<usize> {
    if id == DEFAULT_ACCOUNT_ID {
        return Err(LedgerError::DefaultAccountDeletion);
    }
    require_account(store, id)?;

    let dates: Vec<NaiveDate> = store
        .transactions_for_account(id)?
        .iter()
        .map(|tx| tx.date)
        .collect();
    let removed = store.delete_account_cascade(id)?;
    budget::on_ledger_change(store, today, &dates)?;
    tracing::info!(account = id, removed, "deleted account");
    Ok(removed)
}

/// The account a session should fall back to when `current` is gone:
/// `current` itself if it still exists, else `default`, else the first one.
pub fn fallback_account(accounts: &[Account], current: &str) -> String {
    if accounts.iter().any(|a| a.id == current) {
        return current.to_string();
    }
    if accounts.iter().any(|a| a.id == DEFAULT_ACCOUNT_ID) {
        return DEFAULT_ACCOUNT_ID.to_string();
    }
    accounts
        .first()
        .map(|a| a.id.clone())
        .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string())
}

fn get_existing(store: &Store<'_>, id: i64) -> LedgerResult<Transaction> {
    store
        .get_transaction(id)?
        .ok_or(LedgerError::TransactionNotFound(id))
}

pub fn add_transaction(
    store: &Store<'_>,
    today: NaiveDate,
    mut tx: NewTransaction,
) -> LedgerResult<i64> {
    require_account(store, &tx.account_id)?;
    tx.description = tx.description.trim().to_string();
    if tx.description.is_empty() {
        return Err(LedgerError::InvalidInput(
            "description must not be empty".to_string(),
        ));
    }
    if tx.category.trim().is_empty() {
        tx.category = UNCATEGORIZED.to_string();
    }

    let id = store.insert_transaction(&tx)?;
    budget::on_ledger_change(store, today, &[tx.date])?;
    Ok(id)
}

pub fn delete_transaction(store: &Store<'_>, today: NaiveDate, id: i64) -> LedgerResult<Transaction> {
    let tx = get_existing(store, id)?;
    store.delete_transaction(id)?;
    budget::on_ledger_change(store, today, &[tx.date])?;
    Ok(tx)
}

pub fn set_category(
    store: &Store<'_>,
    today: NaiveDate,
    id: i64,
    category: &str,
) -> LedgerResult<Transaction> {
    let category = category.trim();
    if category.is_empty() {
        return Err(LedgerError::InvalidInput(
            "category must not be empty".to_string(),
        ));
    }
    let mut tx = get_existing(store, id)?;
    tx.category = category.to_string();
    store.put_transaction(&tx)?;
    budget::on_ledger_change(store, today, &[tx.date])?;
    Ok(tx)
}

pub fn set_amount(
    store: &Store<'_>,
    today: NaiveDate,
    id: i64,
    amount: Decimal,
) -> LedgerResult<Transaction> {
    let mut tx = get_existing(store, id)?;
    tx.amount = amount;
    store.put_transaction(&tx)?;
    budget::on_ledger_change(store, today, &[tx.date])?;
    Ok(tx)
}

pub fn set_reconciled(
    store: &Store<'_>,
    today: NaiveDate,
    id: i64,
    reconciled: bool,
) -> LedgerResult<Transaction> {
    let mut tx = get_existing(store, id)?;
    store.set_reconciled(id, reconciled)?;
    tx.reconciled = reconciled;
    budget::on_ledger_change(store, today, &[tx.date])?;
    Ok(tx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOutcome {
    pub inserted: usize,
    pub reconciled: usize,
}

/// Writes a previewed import plan. With `mark_reconciled` the new rows are
/// stored already reconciled.
pub fn commit_import(
    store: &Store<'_>,
    today: NaiveDate,
    plan: &ImportPlan,
    mark_reconciled: bool,
) -> LedgerResult<ImportOutcome> {
    let mut touched = Vec::with_capacity(plan.new.len() + plan.to_reconcile.len());
    let mut outcome = ImportOutcome::default();

    for row in &plan.new {
        let tx = NewTransaction {
            reconciled: row.reconciled || mark_reconciled,
            ..row.clone()
        };
        store.insert_transaction(&tx)?;
        touched.push(tx.date);
        outcome.inserted += 1;
    }

    for &id in &plan.to_reconcile {
        let tx = get_existing(store, id)?;
        if tx.reconciled {
            continue;
        }
        store.set_reconciled(id, true)?;
        touched.push(tx.date);
        outcome.reconciled += 1;
    }

    budget::on_ledger_change(store, today, &touched)?;
    tracing::info!(
        inserted = outcome.inserted,
        reconciled = outcome.reconciled,
        "import committed"
    );
    Ok(outcome)
}

/// Known categories: the budget template's plus those used by the account's
/// transactions, sorted and without blanks.
pub fn category_suggestions(store: &Store<'_>, account_id: &str) -> LedgerResult<Vec<String>> {
    let mut names: BTreeSet<String> = store
        .budget_template()?
        .into_iter()
        .map(|b| b.category)
        .collect();
    names.extend(
        store
            .transactions_for_account(account_id)?
            .into_iter()
            .map(|tx| tx.category),
    );
    Ok(names
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

/// Distinct descriptions already used in the account, for autocompletion.
pub fn description_suggestions(store: &Store<'_>, account_id: &str) -> LedgerResult<Vec<String>> {
    let names: BTreeSet<String> = store
        .transactions_for_account(account_id)?
        .into_iter()
        .map(|tx| tx.description)
        .collect();
    Ok(names.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::set_template_category;
    use crate::db::Db;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn entry(date: &str, cents: i64, category: &str, account: &str) -> NewTransaction {
        NewTransaction {
            date: d(date),
            description: "Entry".to_string(),
            category: category.to_string(),
            amount: Decimal::new(cents, 2),
            reconciled: false,
            account_id: account.to_string(),
        }
    }

    fn open_spent(db: &Db, month: &str, category: &str) -> Decimal {
        db.read()
            .get_snapshot(month)
            .expect("get")
            .expect("snapshot")
            .budgets
            .into_iter()
            .find(|b| b.category == category)
            .map(|b| b.spent)
            .expect("category")
    }

    #[test]
    fn direction_forces_sign() {
        assert_eq!(Direction::Debit.signed(Decimal::from(12)), Decimal::from(-12));
        assert_eq!(Direction::Credit.signed(Decimal::from(-12)), Decimal::from(12));
    }

    #[test]
    fn default_account_cannot_be_deleted() {
        let mut db = Db::open_in_memory().expect("db");
        let err = db
            .write(|store| delete_account(store, DEFAULT_ACCOUNT_ID, d("2024-01-01")))
            .expect_err("default");
        assert!(matches!(err, LedgerError::DefaultAccountDeletion));
        assert_eq!(db.read().list_accounts().expect("list").len(), 1);
    }

    #[test]
    fn deleting_account_cascades_and_refreshes_open_month() {
        let mut db = Db::open_in_memory().expect("db");
        let today = d("2024-04-10");
        let account = db
            .write(|store| -> LedgerResult<Account> {
                set_template_category(store, "Food", Decimal::from(200), today)?;
                let account = add_account(store, "Visa", Some("Card"))?;
                add_transaction(store, today, entry("2024-04-02", -4000, "Food", &account.id))?;
                add_transaction(store, today, entry("2024-04-03", -1000, "Food", DEFAULT_ACCOUNT_ID))?;
                Ok(account)
            })
            .expect("seed");
        assert!(account.id.starts_with("account_"));
        assert_eq!(open_spent(&db, "2024-04", "Food"), Decimal::from(50));

        let removed = db
            .write(|store| delete_account(store, &account.id, today))
            .expect("delete");
        assert_eq!(removed, 1);
        assert!(db.read().transactions_for_account(&account.id).expect("read").is_empty());
        assert_eq!(open_spent(&db, "2024-04", "Food"), Decimal::from(10));
    }

    #[test]
    fn fallback_prefers_current_then_default_then_first() {
        let a = Account {
            id: "a".to_string(),
            name: "A".to_string(),
            label: "A".to_string(),
        };
        let accounts = vec![a.clone(), Account::default_account()];
        assert_eq!(fallback_account(&accounts, "a"), "a");
        assert_eq!(fallback_account(&accounts, "gone"), DEFAULT_ACCOUNT_ID);
        assert_eq!(fallback_account(&[a], "gone"), "a");
    }

    #[test]
    fn edits_reject_unknown_ids_and_blank_categories() {
        let mut db = Db::open_in_memory().expect("db");
        let today = d("2024-04-10");
        let err = db
            .write(|store| set_amount(store, today, 42, Decimal::ONE))
            .expect_err("missing");
        assert!(matches!(err, LedgerError::TransactionNotFound(42)));

        let id = db
            .write(|store| add_transaction(store, today, entry("2024-04-01", -100, "", DEFAULT_ACCOUNT_ID)))
            .expect("add");
        let stored = db.read().get_transaction(id).expect("get").expect("tx");
        assert_eq!(stored.category, UNCATEGORIZED);

        let err = db
            .write(|store| set_category(store, today, id, "   "))
            .expect_err("blank");
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn recategorizing_moves_open_month_spend() {
        let mut db = Db::open_in_memory().expect("db");
        let today = d("2024-04-10");
        let id = db
            .write(|store| -> LedgerResult<i64> {
                set_template_category(store, "Food", Decimal::from(200), today)?;
                set_template_category(store, "Fuel", Decimal::from(100), today)?;
                add_transaction(store, today, entry("2024-04-02", -3000, "Food", DEFAULT_ACCOUNT_ID))
            })
            .expect("seed");
        assert_eq!(open_spent(&db, "2024-04", "Food"), Decimal::from(30));

        db.write(|store| set_category(store, today, id, "Fuel"))
            .expect("recategorize");
        assert_eq!(open_spent(&db, "2024-04", "Food"), Decimal::ZERO);
        assert_eq!(open_spent(&db, "2024-04", "Fuel"), Decimal::from(30));
    }

    #[test]
    fn commit_import_counts_only_newly_reconciled() {
        let mut db = Db::open_in_memory().expect("db");
        let today = d("2024-04-10");
        let (a, b) = db
            .write(|store| -> LedgerResult<(i64, i64)> {
                let a = add_transaction(store, today, entry("2024-04-01", -500, "Food", DEFAULT_ACCOUNT_ID))?;
                let b = add_transaction(store, today, entry("2024-04-02", -700, "Food", DEFAULT_ACCOUNT_ID))?;
                set_reconciled(store, today, b, true)?;
                Ok((a, b))
            })
            .expect("seed");

        let plan = ImportPlan {
            new: vec![entry("2024-04-05", -900, "Fuel", DEFAULT_ACCOUNT_ID)],
            to_reconcile: vec![a, b],
            matched_rows: 2,
        };
        let outcome = db
            .write(|store| commit_import(store, today, &plan, true))
            .expect("commit");
        assert_eq!(outcome, ImportOutcome { inserted: 1, reconciled: 1 });

        let all = db.read().transactions_for_account(DEFAULT_ACCOUNT_ID).expect("read");
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|tx| tx.reconciled));
    }

    #[test]
    fn suggestions_merge_template_and_account_categories() {
        let mut db = Db::open_in_memory().expect("db");
        let today = d("2024-04-10");
        db.write(|store| -> LedgerResult<()> {
            set_template_category(store, "Rent", Decimal::from(900), today)?;
            add_transaction(store, today, entry("2024-04-01", -500, "Food", DEFAULT_ACCOUNT_ID))?;
            add_transaction(store, today, entry("2024-04-02", -500, "Rent", DEFAULT_ACCOUNT_ID))?;
            store.insert_transaction(&entry("2024-04-02", -500, "Other", "elsewhere"))?;
            Ok(())
        })
        .expect("seed");

        let names = category_suggestions(&db.read(), DEFAULT_ACCOUNT_ID).expect("suggest");
        assert_eq!(names, vec!["Food".to_string(), "Rent".to_string()]);
    }

    #[test]
    fn description_suggestions_stay_in_the_account() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let mut tx = entry("2024-04-01", -500, "Food", DEFAULT_ACCOUNT_ID);
        for desc in ["Grocer", "Cafe", "Grocer"] {
            tx.description = desc.to_string();
            store.insert_transaction(&tx).expect("insert");
        }
        tx.description = "Elsewhere".to_string();
        tx.account_id = "other".to_string();
        store.insert_transaction(&tx).expect("insert");

        let names = description_suggestions(&store, DEFAULT_ACCOUNT_ID).expect("suggest");
        assert_eq!(names, vec!["Cafe".to_string(), "Grocer".to_string()]);
    }
}
