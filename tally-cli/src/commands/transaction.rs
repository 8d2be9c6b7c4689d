use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_context, Actor};
use crate::output;

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Show one transaction
    Show {
        id: i64,
        #[command(flatten)]
        actor: Actor,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: TransactionCommands) -> Result<()> {
    match command {
        TransactionCommands::Show { id, actor, json } => {
            let ctx = get_context()?;
            let user = actor.resolve(&ctx)?;
            let tx = ctx.history_service.get_transaction(user.id, id)?;

            if json {
                return output::json(&tx);
            }
            let side = |id: Option<i64>| id.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
            println!("{}", format!("Transaction {}", tx.id).bold());
            println!("  Kind:    {}", tx.kind);
            println!("  Amount:  {}", tx.amount);
            println!("  From:    {}", side(tx.from_account_id));
            println!("  To:      {}", side(tx.to_account_id));
            println!("  When:    {}", output::format_time(&tx.created_at));
            println!("  Note:    {}", tx.description);
        }
    }
    Ok(())
}
