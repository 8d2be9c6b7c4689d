//! Transaction history for one account

use anyhow::Result;
use tally_core::Page;

use super::{get_context, Actor};
use crate::output;

pub fn run(
    account_id: i64,
    limit: Option<String>,
    offset: Option<String>,
    actor: Actor,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let user = actor.resolve(&ctx)?;
    let page = Page::from_params(limit.as_deref(), offset.as_deref());
    let transactions = ctx
        .history_service
        .list_for_account(user.id, account_id, page)?;

    if json {
        return output::json(&transactions);
    }

    if transactions.is_empty() {
        if page.offset() > 0 {
            println!("No transactions past offset {}.", page.offset());
        } else {
            println!("No transactions for account {}.", account_id);
        }
        return Ok(());
    }

    println!("{}", output::transactions_table(&transactions));
    println!(
        "Showing {} (limit {}, offset {})",
        transactions.len(),
        page.limit(),
        page.offset()
    );
    Ok(())
}
