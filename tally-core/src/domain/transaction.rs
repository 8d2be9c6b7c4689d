//! Ledger entry domain model
//!
//! A `Transaction` is one immutable row of the append-only ledger. Entries are
//! never updated; corrections are new entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::validate_amount;
use super::result::{Error, Result};

/// What kind of funds movement an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Withdraw,
    Deposit,
    Interest,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Interest => "interest",
        }
    }

    /// Whether a source/destination reference pair is well-formed for this kind
    pub fn accepts_references(&self, from: Option<i64>, to: Option<i64>) -> bool {
        match self {
            TransactionKind::Transfer => from.is_some() && to.is_some() && from != to,
            TransactionKind::Withdraw => from.is_some() && to.is_none(),
            TransactionKind::Deposit | TransactionKind::Interest => {
                from.is_none() && to.is_some()
            }
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transfer" => Ok(TransactionKind::Transfer),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "deposit" => Ok(TransactionKind::Deposit),
            "interest" => Ok(TransactionKind::Interest),
            other => Err(Error::validation(format!("unknown transaction kind: {}", other))),
        }
    }
}

/// A persisted ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub from_account_id: Option<i64>,
    pub to_account_id: Option<i64>,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// True if either side of the entry is `account_id`
    pub fn references(&self, account_id: i64) -> bool {
        self.from_account_id == Some(account_id) || self.to_account_id == Some(account_id)
    }
}

/// A ledger entry that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub from_account_id: Option<i64>,
    pub to_account_id: Option<i64>,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
}

impl NewTransaction {
    pub fn transfer(from: i64, to: i64, amount: Decimal) -> Self {
        Self {
            from_account_id: Some(from),
            to_account_id: Some(to),
            amount,
            kind: TransactionKind::Transfer,
            description: format!("Transfer from account {} to account {}", from, to),
        }
    }

    pub fn withdraw(from: i64, amount: Decimal) -> Self {
        Self {
            from_account_id: Some(from),
            to_account_id: None,
            amount,
            kind: TransactionKind::Withdraw,
            description: "Withdrawal from account".to_string(),
        }
    }

    pub fn deposit(to: i64, amount: Decimal) -> Self {
        Self {
            from_account_id: None,
            to_account_id: Some(to),
            amount,
            kind: TransactionKind::Deposit,
            description: "Deposit into account".to_string(),
        }
    }

    pub fn opening_balance(to: i64, amount: Decimal) -> Self {
        Self {
            description: "Opening balance".to_string(),
            ..Self::deposit(to, amount)
        }
    }

    pub fn interest(to: i64, amount: Decimal) -> Self {
        Self {
            from_account_id: None,
            to_account_id: Some(to),
            amount,
            kind: TransactionKind::Interest,
            description: format!("Interest for account ID {}", to),
        }
    }

    /// Check the entry invariants before it is appended
    pub fn validate(&self) -> Result<()> {
        validate_amount(self.amount)?;
        if !self.kind.accepts_references(self.from_account_id, self.to_account_id) {
            return Err(Error::validation(format!(
                "{} entry has invalid account references (from: {:?}, to: {:?})",
                self.kind, self.from_account_id, self.to_account_id
            )));
        }
        Ok(())
    }
}
