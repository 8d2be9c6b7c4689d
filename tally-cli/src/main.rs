//! Tally CLI - a small banking ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tally_core::ErrorKind;

mod commands;
mod output;

use commands::{account, doctor, history, interest, ledger, logs, transaction, user, Actor};

/// Tally - a small banking ledger in your terminal
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register users and check credentials
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Open and inspect accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Move money between two accounts
    Transfer {
        /// Source account ID
        from: i64,
        /// Destination account ID
        to: i64,
        /// Amount, up to four decimal places
        amount: String,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take money out of an account
    Withdraw {
        account_id: i64,
        amount: String,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Put money into an account
    Deposit {
        account_id: i64,
        amount: String,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List transactions for an account, newest first
    History {
        account_id: i64,
        /// Page size (default 10)
        #[arg(long)]
        limit: Option<String>,
        /// Entries to skip (default 0)
        #[arg(long)]
        offset: Option<String>,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up single transactions
    Transaction {
        #[command(subcommand)]
        command: transaction::TransactionCommands,
    },

    /// Run or schedule the yearly interest batch
    Interest {
        #[command(subcommand)]
        command: interest::InterestCommands,
    },

    /// Check ledger health
    Doctor {
        /// Show details for each finding
        #[arg(short, long)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("Error: {:#}", e));
            exit_code_for(&e)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::User { command } => user::run(command),
        Commands::Account { command } => account::run(command),
        Commands::Transfer { from, to, amount, actor, json } => {
            ledger::transfer(from, to, &amount, actor, json)
        }
        Commands::Withdraw { account_id, amount, actor, json } => {
            ledger::withdraw(account_id, &amount, actor, json)
        }
        Commands::Deposit { account_id, amount, actor, json } => {
            ledger::deposit(account_id, &amount, actor, json)
        }
        Commands::History { account_id, limit, offset, actor, json } => {
            history::run(account_id, limit, offset, actor, json)
        }
        Commands::Transaction { command } => transaction::run(command),
        Commands::Interest { command } => interest::run(command),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}

/// Map a failure to a process exit code by its error kind
fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    let Some(kind) = error.downcast_ref::<tally_core::Error>().map(|e| e.kind()) else {
        return ExitCode::FAILURE;
    };
    match kind {
        ErrorKind::BadRequest => ExitCode::from(2),
        ErrorKind::Unauthorized => ExitCode::from(3),
        ErrorKind::Forbidden => ExitCode::from(4),
        ErrorKind::NotFound => ExitCode::from(5),
        ErrorKind::InsufficientFunds => ExitCode::from(6),
        ErrorKind::Internal => ExitCode::FAILURE,
    }
}
