mod archive;
mod backup;
mod balance;
mod budget;
mod cli;
mod config;
mod csv_import;
mod db;
mod domain;
mod error;
mod ledger;
mod matcher;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::Parser;
use rust_decimal::Decimal;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::balance::{TxFilter, running_balances};
use crate::cli::{AccountCmd, BudgetCmd, Cli, Command, ExportCmd, ImportArgs, ListArgs};
use crate::config::{AppConfig, app_paths, load_or_init_config, resolve_today, write_config};
use crate::db::Db;
use crate::domain::{DEFAULT_ACCOUNT_ID, NewTransaction, month_key, parse_iso_date};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &AppConfig) {
    let filter = std::env::var("CHECKBOOK_LOG")
        .unwrap_or_else(|_| format!("checkbook={}", cfg.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;
    init_tracing(&cfg);

    let today = resolve_today(cli.today.as_deref())?;
    let (mut db, db_path) = Db::open(&paths)?;
    tracing::debug!(db = %db_path.display(), %today, "opened ledger");

    // The account is captured once and passed to everything below.
    let account_id = match cli.account {
        Some(id) => id,
        None => {
            let accounts = db.read().list_accounts()?;
            let id = ledger::fallback_account(&accounts, &cfg.current_account);
            if id != cfg.current_account {
                eprintln!(
                    "Current account '{}' no longer exists; using '{id}'.",
                    cfg.current_account
                );
                cfg.current_account = id.clone();
                write_config(&cfg_path, &cfg)?;
            }
            id
        }
    };

    match cli.command {
        Command::Account(args) => handle_account(&mut db, args.cmd, &mut cfg, &cfg_path, today)?,
        Command::Add(args) => {
            let date = parse_date(&args.date, "date")?;
            let amount = parse_decimal(args.amount, "amount")?;
            let tx = NewTransaction {
                date,
                description: args.description,
                category: args.category.unwrap_or_default(),
                amount: args.direction.signed(amount),
                reconciled: args.reconciled,
                account_id: account_id.clone(),
            };
            let id = db.write(|store| ledger::add_transaction(store, today, tx))?;
            println!("Added transaction {id}.");
        }
        Command::List(args) => print_ledger(&db, &account_id, args, &mut cfg, &cfg_path)?,
        Command::Delete { id } => {
            let tx = db.write(|store| ledger::delete_transaction(store, today, id))?;
            println!("Deleted transaction {id} ({} {}).", tx.date, tx.description);
        }
        Command::Categorize { id, category } => {
            let tx = db.write(|store| ledger::set_category(store, today, id, &category))?;
            println!("Transaction {id} is now in '{}'.", tx.category);
        }
        Command::Amount { id, amount } => {
            let amount = parse_decimal(amount, "amount")?;
            let tx = db.write(|store| ledger::set_amount(store, today, id, amount))?;
            println!("Transaction {id} amount set to {}.", tx.amount);
        }
        Command::Reconcile { ids } => {
            set_reconciled(&mut db, &ids, true, today)?;
            println!("Marked {} transaction(s) reconciled.", ids.len());
        }
        Command::Unreconcile { ids } => {
            set_reconciled(&mut db, &ids, false, today)?;
            println!("Marked {} transaction(s) unreconciled.", ids.len());
        }
        Command::Categories => {
            for name in ledger::category_suggestions(&db.read(), &account_id)? {
                println!("{name}");
            }
        }
        Command::Descriptions => {
            for name in ledger::description_suggestions(&db.read(), &account_id)? {
                println!("{name}");
            }
        }
        Command::Budget(args) => handle_budget(&mut db, args.cmd, today)?,
        Command::Import(args) => handle_import(&mut db, &account_id, args, today)?,
        Command::Purge(args) => {
            let cutoff = parse_date(&args.through, "--through")?;
            archive::check_cutoff(cutoff, today)?;
            let account = ledger::require_account(&db.read(), &account_id)?;

            if !args.yes
                && !prompt_yes_no(&format!(
                    "This will permanently delete all RECONCILED transactions on or before {cutoff} in '{}'. Continue? [y/N] ",
                    account.name
                ), false)?
            {
                println!("Purge cancelled.");
                return Ok(());
            }

            let report = archive::purge(&mut db, &account_id, cutoff, today)?;
            println!(
                "Purged {} reconciled transaction(s) through {}.",
                report.purged, report.cutoff
            );
            println!(
                "Budget history frozen for {} month(s) ({} new).",
                report.affected_months.len(),
                report.snapshots_created
            );
            if report.opening_balance.is_zero() {
                println!("Purged entries net to zero; no opening balance added.");
            } else {
                println!("Opening balance: {}", report.opening_balance);
            }
        }
        Command::Export(args) => match args.cmd {
            ExportCmd::Json { out } => {
                let backup = backup::export_json(&db.read())?;
                let json = serde_json::to_string_pretty(&backup)?;
                write_output(out.as_deref(), &json)?;
            }
            ExportCmd::Csv { out } => {
                ledger::require_account(&db.read(), &account_id)?;
                let csv = backup::export_csv(&db.read(), &account_id)?;
                write_output(out.as_deref(), &csv)?;
            }
        },
        Command::Restore(args) => {
            let text = fs::read_to_string(&args.file)
                .with_context(|| format!("Failed to read {}", args.file.display()))?;
            if !args.yes
                && !prompt_yes_no(
                    "Restoring replaces ALL accounts, transactions and budgets. Continue? [y/N] ",
                    false,
                )?
            {
                println!("Restore cancelled.");
                return Ok(());
            }

            let report = backup::restore_json(&mut db, &text, &cfg.current_account)?;
            if report.current_account != cfg.current_account {
                cfg.current_account = report.current_account.clone();
                write_config(&cfg_path, &cfg)?;
            }
            println!(
                "Restored {} account(s), {} transaction(s), {} budget categories, {} budget month(s).",
                report.accounts, report.transactions, report.budget, report.snapshots
            );
        }
    }

    Ok(())
}

fn handle_account(
    db: &mut Db,
    cmd: AccountCmd,
    cfg: &mut AppConfig,
    cfg_path: &Path,
    today: NaiveDate,
) -> Result<()> {
    match cmd {
        AccountCmd::List => {
            let rows: Vec<Vec<String>> = db
                .read()
                .list_accounts()?
                .into_iter()
                .map(|a| {
                    let marker = if a.id == cfg.current_account { "*" } else { "" };
                    vec![marker.to_string(), a.id, a.name, a.label]
                })
                .collect();
            print_table(&["", "id", "name", "label"], &rows);
        }
        AccountCmd::Add { name, label } => {
            let account = db.write(|store| ledger::add_account(store, &name, label.as_deref()))?;
            println!("Added account {} ({}).", account.id, account.name);
        }
        AccountCmd::Delete { id, yes } => {
            if id == DEFAULT_ACCOUNT_ID {
                return Err(error::LedgerError::DefaultAccountDeletion.into());
            }
            let account = ledger::require_account(&db.read(), &id)?;
            if !yes
                && !prompt_yes_no(
                    &format!(
                        "Delete account '{}' and all of its transactions? [y/N] ",
                        account.name
                    ),
                    false,
                )?
            {
                println!("Delete cancelled.");
                return Ok(());
            }

            let removed = db.write(|store| ledger::delete_account(store, &id, today))?;
            println!(
                "Deleted account {} and {removed} transaction(s).",
                account.name
            );
            if cfg.current_account == id {
                cfg.current_account = DEFAULT_ACCOUNT_ID.to_string();
                write_config(cfg_path, cfg)?;
                println!("Switched to account: {DEFAULT_ACCOUNT_ID}");
            }
        }
        AccountCmd::Use { id } => {
            let account = ledger::require_account(&db.read(), &id)?;
            cfg.current_account = account.id.clone();
            write_config(cfg_path, cfg)?;
            println!("Switched to account: {} ({})", account.name, account.id);
        }
    }
    Ok(())
}

fn print_ledger(
    db: &Db,
    account_id: &str,
    args: ListArgs,
    cfg: &mut AppConfig,
    cfg_path: &Path,
) -> Result<()> {
    ledger::require_account(&db.read(), account_id)?;

    let order = match args.order {
        Some(order) => {
            if order != cfg.sort_order {
                cfg.sort_order = order;
                write_config(cfg_path, cfg)?;
            }
            order
        }
        None => cfg.sort_order,
    };

    let filter = TxFilter {
        start: args.from.as_deref().map(|s| parse_date(s, "--from")).transpose()?,
        end: args.to.as_deref().map(|s| parse_date(s, "--to")).transpose()?,
        description: args.description,
        category: args.category,
        reconciled: args.reconciled,
    };

    let rows = running_balances(db.read().transactions_for_account(account_id)?, &filter, order);
    if rows.is_empty() {
        println!("(no transactions)");
        return Ok(());
    }

    println!("id\tdate\tdescription\tcategory\tamount\treconciled\tbalance");
    for row in rows {
        let tx = row.tx;
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            tx.id,
            tx.date,
            tx.description,
            tx.category,
            tx.amount,
            if tx.reconciled { "yes" } else { "no" },
            row.balance
        );
    }
    Ok(())
}

fn set_reconciled(db: &mut Db, ids: &[i64], reconciled: bool, today: NaiveDate) -> Result<()> {
    db.write(|store| -> error::LedgerResult<()> {
        for &id in ids {
            ledger::set_reconciled(store, today, id, reconciled)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn handle_budget(db: &mut Db, cmd: BudgetCmd, today: NaiveDate) -> Result<()> {
    match cmd {
        BudgetCmd::List => {
            let template = db.read().budget_template()?;
            if template.is_empty() {
                println!("(no budget categories)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = template
                .into_iter()
                .map(|b| vec![b.category, b.amount.to_string()])
                .collect();
            print_table(&["category", "amount"], &rows);
        }
        BudgetCmd::Set { category, amount } => {
            let amount = parse_decimal(amount, "amount")?;
            let is_new = db.write(|store| {
                budget::set_template_category(store, &category, amount, today)
            })?;
            let verb = if is_new { "Added" } else { "Updated" };
            println!("{verb} budget category '{}' at {amount}.", category.trim());
        }
        BudgetCmd::Delete { category } => {
            let removed = db.write(|store| budget::delete_template_category(store, &category))?;
            if !removed {
                return Err(anyhow!("No such budget category: '{category}'"));
            }
            println!("Removed budget category '{category}'.");
        }
        BudgetCmd::Show { month } => {
            let month = month.unwrap_or_else(|| month_key(today));
            let view = db.write(|store| budget::month_view(store, &month, today))?;
            if !view.materialized {
                eprintln!("No budget was recorded for {month}; showing the current template.");
            }
            if view.entries.is_empty() {
                println!("(no budget categories)");
                return Ok(());
            }

            println!("month\tcategory\tallowed\tspent\tremaining");
            let mut totals = (Decimal::ZERO, Decimal::ZERO);
            for entry in &view.entries {
                totals.0 += entry.amount;
                totals.1 += entry.spent;
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    view.month,
                    entry.category,
                    entry.amount,
                    entry.spent,
                    entry.remaining()
                );
            }
            println!(
                "{}\tTOTAL\t{}\t{}\t{}",
                view.month,
                totals.0,
                totals.1,
                totals.0 - totals.1
            );
        }
        BudgetCmd::MonthSet {
            month,
            category,
            amount,
        } => {
            let amount = parse_decimal(amount, "amount")?;
            db.write(|store| budget::set_month_amount(store, &month, &category, amount))?;
            println!("Set '{category}' to {amount} for {month}.");
        }
        BudgetCmd::MonthRemove { month, category } => {
            db.write(|store| budget::remove_month_category(store, &month, &category))?;
            println!("Removed '{category}' from {month}.");
        }
    }
    Ok(())
}

fn handle_import(db: &mut Db, account_id: &str, args: ImportArgs, today: NaiveDate) -> Result<()> {
    let account = ledger::require_account(&db.read(), account_id)?;
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let decoded = csv_import::decode(&text)?;
    for warning in &decoded.warnings {
        eprintln!("Skipped line {}: {}", warning.line, warning.reason);
    }

    let existing = db.read().transactions_for_account(account_id)?;
    let plan = matcher::plan_import(&existing, &decoded.rows, args.mode, account_id);

    println!(
        "Detected {} format: {} row(s) read, {} matched existing entries.",
        decoded.profile.name(),
        decoded.rows.len(),
        plan.matched_rows
    );
    for tx in &plan.new {
        println!(
            "new\t{}\t{}\t{}\t{}",
            tx.date, tx.description, tx.category, tx.amount
        );
    }
    if !plan.to_reconcile.is_empty() {
        println!(
            "{} existing transaction(s) will be marked reconciled.",
            plan.to_reconcile.len()
        );
    }
    if plan.new.is_empty() && plan.to_reconcile.is_empty() {
        println!("Nothing to import.");
        return Ok(());
    }

    if !args.yes
        && !prompt_yes_no(
            &format!("Import into '{}'? [Y/n] ", account.name),
            true,
        )?
    {
        println!("Import cancelled.");
        return Ok(());
    }

    let outcome = db.write(|store| {
        ledger::commit_import(store, today, &plan, args.mark_reconciled)
    })?;
    println!(
        "Imported {} new transaction(s); reconciled {} existing.",
        outcome.inserted, outcome.reconciled
    );
    Ok(())
}

fn write_output(out: Option<&Path>, body: &str) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(body.as_bytes())?;
            if !body.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

/// Pipe-delimited table padded to the widest cell of each column; cells
/// beyond the header count are dropped.
fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    fn render(cells: &[&str], widths: &[usize]) -> String {
        let mut line = String::from("|");
        for (i, &width) in widths.iter().enumerate() {
            let cell = cells.get(i).copied().unwrap_or("");
            line.push_str(&format!(" {cell:<width$} |"));
        }
        line
    }

    println!("{}", render(headers, &widths));
    let rule: String = widths.iter().map(|w| format!("{}|", "-".repeat(w + 2))).collect();
    println!("|{rule}");
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", render(&cells, &widths));
    }
}

fn parse_decimal(raw: String, field: &'static str) -> Result<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal for {field}: {raw}"))
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate> {
    parse_iso_date(raw).ok_or_else(|| anyhow!("Invalid {field} (expected YYYY-MM-DD): {raw}"))
}

/// Reads one answer from stdin; an empty answer (or closed stdin) picks
/// `default`.
fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
    eprint!("{prompt}");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let s = line.trim();
    if s.is_empty() {
        return Ok(default);
    }
    Ok(matches!(s.to_ascii_lowercase().as_str(), "y" | "yes"))
}
