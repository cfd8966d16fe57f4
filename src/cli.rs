use crate::balance::ReconciledFilter;
use crate::config::SortOrder;
use crate::domain::ImportMode;
use crate::ledger::Direction;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "checkbook")]
#[command(about = "Local-first checkbook with bank CSV reconciliation and monthly budgets", long_about = None)]
pub struct Cli {
    /// Override Checkbook home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "CHECKBOOK_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Pin today's date (YYYY-MM-DD). Decides which budget month is open.
    #[arg(long, env = "CHECKBOOK_TODAY", global = true)]
    pub today: Option<String>,

    /// Work on this account instead of the current one.
    #[arg(long, global = true)]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Account(AccountArgs),

    /// Record a transaction by hand.
    Add(AddArgs),
    /// Show the ledger with running balances.
    List(ListArgs),
    Delete {
        id: i64,
    },
    Categorize {
        id: i64,
        category: String,
    },
    /// Replace a transaction's signed amount.
    Amount {
        id: i64,
        #[arg(allow_negative_numbers = true)]
        amount: String,
    },
    Reconcile {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    Unreconcile {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Known category names for the current account.
    Categories,
    /// Descriptions already used in the current account.
    Descriptions,

    Budget(BudgetArgs),

    /// Import a bank CSV export into the current account.
    Import(ImportArgs),
    /// Collapse reconciled history into an opening balance.
    Purge(PurgeArgs),

    Export(ExportArgs),
    /// Replace everything with the contents of a JSON export.
    Restore(RestoreArgs),
}

#[derive(Debug, Subcommand)]
pub enum AccountCmd {
    List,
    Add {
        name: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Delete an account and all of its transactions.
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Make an account the current one.
    Use {
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub cmd: AccountCmd,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Transaction date (YYYY-MM-DD).
    pub date: String,
    pub description: String,
    /// Magnitude; the sign comes from --type.
    pub amount: String,

    #[arg(long = "type", value_enum, default_value_t = Direction::Debit)]
    pub direction: Direction,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub reconciled: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Earliest date to show (YYYY-MM-DD, inclusive).
    #[arg(long)]
    pub from: Option<String>,

    /// Latest date to show (YYYY-MM-DD, inclusive).
    #[arg(long)]
    pub to: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, value_enum, default_value_t = ReconciledFilter::All)]
    pub reconciled: ReconciledFilter,

    /// Display order; remembered for later listings.
    #[arg(long, value_enum)]
    pub order: Option<SortOrder>,
}

#[derive(Debug, Subcommand)]
pub enum BudgetCmd {
    /// Show the recurring budget template.
    List,
    /// Add or update a template category.
    Set { category: String, amount: String },
    /// Remove a template category (existing months keep theirs).
    Delete { category: String },
    /// Allowed, spent and remaining per category for one month.
    Show {
        /// YYYY-MM; defaults to the open month.
        #[arg(long)]
        month: Option<String>,
    },
    /// Change one category's allowed amount for one month only.
    MonthSet {
        month: String,
        category: String,
        amount: String,
    },
    /// Drop one category from one month only.
    MonthRemove { month: String, category: String },
}

#[derive(Debug, Args)]
pub struct BudgetArgs {
    #[command(subcommand)]
    pub cmd: BudgetCmd,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub file: PathBuf,

    #[arg(long, value_enum, default_value_t = ImportMode::Sync)]
    pub mode: ImportMode,

    /// Store the new rows as already reconciled.
    #[arg(long)]
    pub mark_reconciled: bool,

    /// Commit without asking.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Last date to purge (YYYY-MM-DD); must be before the current month.
    #[arg(long)]
    pub through: String,

    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Subcommand)]
pub enum ExportCmd {
    /// Every account, transaction, budget and budget month.
    Json {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// The current account's ledger.
    Csv {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub cmd: ExportCmd,
}

#[derive(Debug, Args)]
pub struct RestoreArgs {
    pub file: PathBuf,

    #[arg(long)]
    pub yes: bool,
}
