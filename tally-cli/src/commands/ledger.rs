//! Money movement commands - transfer, withdraw, deposit

use anyhow::Result;
use tally_core::domain::money::parse_amount;
use tally_core::services::MovementReceipt;

use super::{get_context, log_outcome, Actor};
use crate::output;

pub fn transfer(from: i64, to: i64, amount: &str, actor: Actor, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = actor.resolve(&ctx)?;
    let result = parse_amount(amount)
        .and_then(|amount| ctx.ledger_service.transfer(user.id, from, to, amount));
    log_outcome(&ctx.logger, "transfer", Some(from), &result);
    print_receipt(&result?, json)
}

pub fn withdraw(account_id: i64, amount: &str, actor: Actor, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = actor.resolve(&ctx)?;
    let result = parse_amount(amount)
        .and_then(|amount| ctx.ledger_service.withdraw(user.id, account_id, amount));
    log_outcome(&ctx.logger, "withdraw", Some(account_id), &result);
    print_receipt(&result?, json)
}

pub fn deposit(account_id: i64, amount: &str, actor: Actor, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let user = actor.resolve(&ctx)?;
    let result = parse_amount(amount)
        .and_then(|amount| ctx.ledger_service.deposit(user.id, account_id, amount));
    log_outcome(&ctx.logger, "deposit", Some(account_id), &result);
    print_receipt(&result?, json)
}

fn print_receipt(receipt: &MovementReceipt, json: bool) -> Result<()> {
    if json {
        return output::json(receipt);
    }

    let tx = &receipt.transaction;
    output::success(&format!("{} (transaction {})", tx.description, tx.id));
    for account in receipt.source.iter().chain(receipt.destination.iter()) {
        println!(
            "  Account {}: {}",
            account.id,
            output::format_money(account.balance, &account.currency)
        );
    }
    Ok(())
}
