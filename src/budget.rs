//! Monthly budget snapshots.
//!
//! The template is the recurring plan. A month gets its own copy (a
//! snapshot) the first time its spend is computed: while the month is open
//! the copy's `spent` figures follow the ledger; once the month has closed
//! only explicit, single-category edits may change it.
use crate::db::Store;
use crate::domain::{BudgetEntry, BudgetSnapshot, UNCATEGORIZED, month_bounds, month_key};
use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Expense totals per category for `month`, across every account. Only
/// negative amounts count, summed by magnitude.
pub fn month_spend(store: &Store<'_>, month: &str) -> LedgerResult<BTreeMap<String, Decimal>> {
    let (start, end) = month_bounds(month)
        .ok_or_else(|| LedgerError::InvalidInput(format!("invalid month '{month}', expected YYYY-MM")))?;

    let mut spend: BTreeMap<String, Decimal> = BTreeMap::new();
    for tx in store.transactions_between(start, end)? {
        if tx.amount >= Decimal::ZERO {
            continue;
        }
        let category = if tx.category.trim().is_empty() {
            UNCATEGORIZED.to_string()
        } else {
            tx.category
        };
        *spend.entry(category).or_insert(Decimal::ZERO) += tx.amount.abs();
    }
    Ok(spend)
}

pub fn materialize(
    month: &str,
    template: &[BudgetEntry],
    spend: &BTreeMap<String, Decimal>,
) -> BudgetSnapshot {
    BudgetSnapshot {
        month: month.to_string(),
        budgets: template
            .iter()
            .map(|entry| BudgetEntry {
                category: entry.category.clone(),
                amount: entry.amount,
                spent: spend.get(&entry.category).copied().unwrap_or(Decimal::ZERO),
            })
            .collect(),
    }
}

/// Creates the snapshot for `month` from the template and the current ledger
/// unless one already exists. An existing snapshot is never modified.
/// Returns whether a snapshot was written.
pub fn ensure_snapshot(store: &Store<'_>, month: &str) -> LedgerResult<bool> {
    if store.get_snapshot(month)?.is_some() {
        return Ok(false);
    }
    let template = store.budget_template()?;
    let spend = month_spend(store, month)?;
    store.put_snapshot(&materialize(month, &template, &spend))?;
    tracing::debug!(month, "materialized budget snapshot");
    Ok(true)
}

/// Recomputes `spent` for the open month (the month containing `today`).
///
/// An existing snapshot keeps its category list; spend under categories it
/// does not hold is ignored. Without a snapshot one is materialized.
pub fn refresh_open_month(store: &Store<'_>, today: NaiveDate) -> LedgerResult<BudgetSnapshot> {
    let month = month_key(today);
    let spend = month_spend(store, &month)?;

    let template = store.budget_template()?;
    for entry in &template {
        let scratch = BudgetEntry {
            spent: spend.get(&entry.category).copied().unwrap_or(Decimal::ZERO),
            ..entry.clone()
        };
        store.upsert_budget_entry(&scratch)?;
    }

    let snapshot = match store.get_snapshot(&month)? {
        Some(mut snapshot) => {
            for entry in &mut snapshot.budgets {
                entry.spent = spend.get(&entry.category).copied().unwrap_or(Decimal::ZERO);
            }
            snapshot
        }
        None => materialize(&month, &template, &spend),
    };
    store.put_snapshot(&snapshot)?;
    Ok(snapshot)
}

/// Hook for every ledger mutation: refreshes the open month when any of the
/// touched dates falls inside it. Closed months are never recomputed.
pub fn on_ledger_change(
    store: &Store<'_>,
    today: NaiveDate,
    touched: &[NaiveDate],
) -> LedgerResult<bool> {
    let open = month_key(today);
    if !touched.iter().any(|d| month_key(*d) == open) {
        return Ok(false);
    }
    refresh_open_month(store, today)?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthBudget {
    pub month: String,
    pub entries: Vec<BudgetEntry>,
    /// `false` when no snapshot exists and the template is shown instead.
    pub materialized: bool,
}

/// Budget for display. The open month is refreshed (and materialized if
/// needed); a closed month shows its snapshot, or the bare template with no
/// spend when it never got one.
pub fn month_view(store: &Store<'_>, month: &str, today: NaiveDate) -> LedgerResult<MonthBudget> {
    if month_bounds(month).is_none() {
        return Err(LedgerError::InvalidInput(format!(
            "invalid month '{month}', expected YYYY-MM"
        )));
    }

    if month == month_key(today) {
        let snapshot = refresh_open_month(store, today)?;
        return Ok(MonthBudget {
            month: snapshot.month,
            entries: snapshot.budgets,
            materialized: true,
        });
    }

    if let Some(snapshot) = store.get_snapshot(month)? {
        return Ok(MonthBudget {
            month: snapshot.month,
            entries: snapshot.budgets,
            materialized: true,
        });
    }

    let entries = store
        .budget_template()?
        .into_iter()
        .map(|entry| BudgetEntry {
            spent: Decimal::ZERO,
            ..entry
        })
        .collect();
    Ok(MonthBudget {
        month: month.to_string(),
        entries,
        materialized: false,
    })
}

fn validate_category(category: &str) -> LedgerResult<String> {
    let category = category.trim();
    if category.is_empty() {
        return Err(LedgerError::InvalidInput(
            "budget category must not be empty".to_string(),
        ));
    }
    Ok(category.to_string())
}

fn validate_amount(amount: Decimal) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput(format!(
            "budget amount must be > 0, got {amount}"
        )));
    }
    Ok(amount)
}

/// Adds or updates a template category. A new category is also appended
/// (with nothing spent) to the open month's snapshot when one exists; closed
/// months are left alone. Returns whether the category was new.
pub fn set_template_category(
    store: &Store<'_>,
    category: &str,
    amount: Decimal,
    today: NaiveDate,
) -> LedgerResult<bool> {
    let category = validate_category(category)?;
    let amount = validate_amount(amount)?;

    let is_new = store.upsert_budget_entry(&BudgetEntry {
        category: category.clone(),
        amount,
        spent: Decimal::ZERO,
    })?;

    if is_new {
        if let Some(mut snapshot) = store.get_snapshot(&month_key(today))? {
            if snapshot.entry_mut(&category).is_none() {
                snapshot.budgets.push(BudgetEntry {
                    category,
                    amount,
                    spent: Decimal::ZERO,
                });
                store.put_snapshot(&snapshot)?;
            }
        }
    }
    Ok(is_new)
}

/// Removes a template category. Snapshots keep their own copies.
pub fn delete_template_category(store: &Store<'_>, category: &str) -> LedgerResult<bool> {
    Ok(store.delete_budget_entry(category.trim())? > 0)
}

/// Explicit edit of one category's allowed amount in one month. A month
/// without a snapshot is materialized first.
pub fn set_month_amount(
    store: &Store<'_>,
    month: &str,
    category: &str,
    amount: Decimal,
) -> LedgerResult<BudgetSnapshot> {
    let amount = validate_amount(amount)?;
    ensure_snapshot(store, month)?;
    let mut snapshot = store
        .get_snapshot(month)?
        .ok_or_else(|| LedgerError::Corrupt(format!("budget snapshot {month} vanished")))?;

    let entry = snapshot.entry_mut(category.trim()).ok_or_else(|| {
        LedgerError::InvalidInput(format!("'{category}' is not budgeted in {month}"))
    })?;
    entry.amount = amount;
    store.put_snapshot(&snapshot)?;
    Ok(snapshot)
}

/// Explicit removal of one category from one month's snapshot.
pub fn remove_month_category(
    store: &Store<'_>,
    month: &str,
    category: &str,
) -> LedgerResult<BudgetSnapshot> {
    let mut snapshot = store.get_snapshot(month)?.ok_or_else(|| {
        LedgerError::InvalidInput(format!("no budget snapshot exists for {month}"))
    })?;
    let before = snapshot.budgets.len();
    snapshot.budgets.retain(|b| b.category != category.trim());
    if snapshot.budgets.len() == before {
        return Err(LedgerError::InvalidInput(format!(
            "'{category}' is not budgeted in {month}"
        )));
    }
    store.put_snapshot(&snapshot)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::domain::{DEFAULT_ACCOUNT_ID, NewTransaction};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn spend(store: &Store<'_>, date: &str, category: &str, amount: i64) -> i64 {
        store
            .insert_transaction(&NewTransaction {
                date: d(date),
                description: "spend".to_string(),
                category: category.to_string(),
                amount: Decimal::from(amount),
                reconciled: false,
                account_id: DEFAULT_ACCOUNT_ID.to_string(),
            })
            .expect("insert")
    }

    fn spent_of(snapshot: &BudgetSnapshot, category: &str) -> Option<Decimal> {
        snapshot
            .budgets
            .iter()
            .find(|b| b.category == category)
            .map(|b| b.spent)
    }

    #[test]
    fn spend_counts_only_expenses_by_magnitude_across_accounts() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        spend(&store, "2024-01-03", "Groceries", -40);
        spend(&store, "2024-01-09", "Groceries", -60);
        spend(&store, "2024-01-10", "Groceries", 15);
        spend(&store, "2024-01-10", "", -5);
        spend(&store, "2024-02-01", "Groceries", -999);
        store
            .insert_transaction(&NewTransaction {
                date: d("2024-01-20"),
                description: "other account".to_string(),
                category: "Groceries".to_string(),
                amount: Decimal::from(-1),
                reconciled: true,
                account_id: "account_x".to_string(),
            })
            .expect("insert");

        let totals = month_spend(&store, "2024-01").expect("spend");
        assert_eq!(totals.get("Groceries"), Some(&Decimal::from(101)));
        assert_eq!(totals.get(UNCATEGORIZED), Some(&Decimal::from(5)));
    }

    #[test]
    fn closed_month_snapshot_does_not_move() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let january = d("2024-01-15");
        set_template_category(&store, "Groceries", Decimal::from(300), january).expect("tmpl");
        let id = spend(&store, "2024-01-05", "Groceries", -100);
        on_ledger_change(&store, january, &[d("2024-01-05")]).expect("refresh");

        let snap = store.get_snapshot("2024-01").expect("get").expect("snapshot");
        assert_eq!(spent_of(&snap, "Groceries"), Some(Decimal::from(100)));

        // The month closes; edits to January entries no longer recompute it.
        let february = d("2024-02-02");
        let mut tx = store.get_transaction(id).expect("get").expect("tx");
        tx.amount = Decimal::from(-250);
        store.put_transaction(&tx).expect("put");
        assert!(!on_ledger_change(&store, february, &[tx.date]).expect("noop"));
        spend(&store, "2024-01-20", "Groceries", -30);
        month_view(&store, "2024-01", february).expect("view");

        let snap = store.get_snapshot("2024-01").expect("get").expect("snapshot");
        assert_eq!(spent_of(&snap, "Groceries"), Some(Decimal::from(100)));
    }

    #[test]
    fn open_month_recompute_ignores_categories_outside_snapshot() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let today = d("2024-03-10");
        set_template_category(&store, "Rent", Decimal::from(1000), today).expect("tmpl");
        refresh_open_month(&store, today).expect("materialize");

        // Fun is appended to the open snapshot, then removed from it; later
        // spend under Fun must not bring it back.
        set_template_category(&store, "Fun", Decimal::from(50), today).expect("tmpl");
        remove_month_category(&store, "2024-03", "Fun").expect("remove");
        spend(&store, "2024-03-09", "Fun", -20);
        spend(&store, "2024-03-09", "Rent", -1000);
        let snap = refresh_open_month(&store, today).expect("refresh");

        assert_eq!(spent_of(&snap, "Rent"), Some(Decimal::from(1000)));
        assert_eq!(spent_of(&snap, "Fun"), None);
    }

    #[test]
    fn new_template_category_only_reaches_open_month() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let jan = d("2024-01-20");
        set_template_category(&store, "Rent", Decimal::from(1000), jan).expect("tmpl");
        refresh_open_month(&store, jan).expect("jan");

        let feb = d("2024-02-03");
        refresh_open_month(&store, feb).expect("feb");
        spend(&store, "2024-02-02", "Gas", -12);
        set_template_category(&store, "Gas", Decimal::from(80), feb).expect("tmpl");

        let jan_snap = store.get_snapshot("2024-01").expect("get").expect("jan");
        let feb_snap = store.get_snapshot("2024-02").expect("get").expect("feb");
        assert_eq!(spent_of(&jan_snap, "Gas"), None);
        assert_eq!(spent_of(&feb_snap, "Gas"), Some(Decimal::ZERO));
    }

    #[test]
    fn deleting_template_category_keeps_snapshots() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let today = d("2024-05-01");
        set_template_category(&store, "Rent", Decimal::from(1000), today).expect("tmpl");
        refresh_open_month(&store, today).expect("materialize");
        assert!(delete_template_category(&store, "Rent").expect("delete"));

        let snap = store.get_snapshot("2024-05").expect("get").expect("snapshot");
        assert_eq!(snap.budgets.len(), 1);
        assert!(store.budget_template().expect("template").is_empty());
    }

    #[test]
    fn explicit_edit_changes_only_the_named_category_of_a_closed_month() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let jan = d("2024-01-10");
        set_template_category(&store, "Rent", Decimal::from(1000), jan).expect("tmpl");
        set_template_category(&store, "Food", Decimal::from(300), jan).expect("tmpl");
        spend(&store, "2024-01-02", "Food", -120);
        refresh_open_month(&store, jan).expect("materialize");

        let snap = set_month_amount(&store, "2024-01", "Food", Decimal::from(350)).expect("edit");
        let food = snap.budgets.iter().find(|b| b.category == "Food").expect("food");
        assert_eq!(food.amount, Decimal::from(350));
        assert_eq!(food.spent, Decimal::from(120));
        let rent = snap.budgets.iter().find(|b| b.category == "Rent").expect("rent");
        assert_eq!(rent.amount, Decimal::from(1000));

        let err = set_month_amount(&store, "2024-01", "Travel", Decimal::from(5));
        assert!(matches!(err, Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn closed_month_without_snapshot_shows_template_without_spend() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let today = d("2024-06-01");
        set_template_category(&store, "Food", Decimal::from(300), today).expect("tmpl");
        spend(&store, "2024-04-02", "Food", -120);

        let view = month_view(&store, "2024-04", today).expect("view");
        assert!(!view.materialized);
        assert_eq!(view.entries[0].spent, Decimal::ZERO);
        assert!(store.get_snapshot("2024-04").expect("get").is_none());
    }

    #[test]
    fn template_rejects_blank_category_and_non_positive_amount() {
        let db = Db::open_in_memory().expect("db");
        let store = db.read();
        let today = d("2024-06-01");
        assert!(set_template_category(&store, "  ", Decimal::from(3), today).is_err());
        assert!(set_template_category(&store, "Food", Decimal::ZERO, today).is_err());
    }
}
