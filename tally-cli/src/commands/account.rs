//! Account commands

use std::str::FromStr;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use rust_decimal::Decimal;
use tally_core::Error;

use super::{get_context, log_outcome, Actor};
use crate::output;

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Account type (savings, checking, ...)
        account_type: String,
        /// ISO currency code (defaults to app.defaultCurrency)
        #[arg(long)]
        currency: Option<String>,
        /// Opening balance
        #[arg(long)]
        opening_balance: Option<String>,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your accounts
    List {
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one of your accounts
    Show {
        account_id: i64,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        AccountCommands::Open { account_type, currency, opening_balance, actor, json } => {
            let user = actor.resolve(&ctx)?;
            let opening_balance = opening_balance
                .as_deref()
                .map(|s| {
                    Decimal::from_str(s.trim())
                        .map_err(|_| Error::validation(format!("invalid opening balance: {}", s)))
                })
                .transpose()?;

            let result = ctx.account_service.open_account(
                user.id,
                &account_type,
                currency.as_deref(),
                opening_balance,
            );
            log_outcome(&ctx.logger, "account_open", result.as_ref().ok().map(|a| a.id), &result);
            let account = result?;

            if json {
                return output::json(&account);
            }
            output::success(&format!(
                "Opened {} account {} with {}",
                account.account_type,
                account.id,
                output::format_money(account.balance, &account.currency)
            ));
        }
        AccountCommands::List { actor, json } => {
            let user = actor.resolve(&ctx)?;
            let accounts = ctx.account_service.list_accounts(user.id)?;
            if json {
                return output::json(&accounts);
            }
            if accounts.is_empty() {
                println!("No accounts yet. Open one with: tally account open savings");
                return Ok(());
            }
            println!("{}", output::accounts_table(&accounts));
        }
        AccountCommands::Show { account_id, actor, json } => {
            let user = actor.resolve(&ctx)?;
            let account = ctx.account_service.get_account(user.id, account_id)?;
            if json {
                return output::json(&account);
            }
            println!("{}", format!("Account {}", account.id).bold());
            println!("{}", output::accounts_table(std::slice::from_ref(&account)));
        }
    }

    Ok(())
}
