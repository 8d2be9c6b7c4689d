//! Output formatting utilities

use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use tally_core::{Account, Transaction};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Print any serializable value as pretty JSON
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Two decimal places for display; storage keeps four
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let shown = if amount.round_dp(2) == amount {
        format!("{:.2}", amount)
    } else {
        amount.normalize().to_string()
    };
    format!("{} {}", shown, currency)
}

pub fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn accounts_table(accounts: &[Account]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Type", "Balance", "Last interest", "Opened"]);
    for account in accounts {
        table.add_row(vec![
            account.id.to_string(),
            account.account_type.clone(),
            format_money(account.balance, &account.currency),
            account
                .last_interest_applied_at
                .as_ref()
                .map(format_time)
                .unwrap_or_else(|| "-".to_string()),
            format_time(&account.created_at),
        ]);
    }
    table
}

pub fn transactions_table(transactions: &[Transaction]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Time", "Kind", "From", "To", "Amount", "Description"]);
    let side = |id: Option<i64>| id.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    for tx in transactions {
        table.add_row(vec![
            tx.id.to_string(),
            format_time(&tx.created_at),
            tx.kind.to_string(),
            side(tx.from_account_id),
            side(tx.to_account_id),
            format!("{:.2}", tx.amount),
            tx.description.clone(),
        ]);
    }
    table
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Decimal::new(15000, 2), "INR"), "150.00 INR");
        assert_eq!(format_money(Decimal::new(2505, 3), "USD"), "2.505 USD");
        assert_eq!(format_money(Decimal::ZERO, "EUR"), "0.00 EUR");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
