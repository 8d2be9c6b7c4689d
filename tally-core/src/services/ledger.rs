//! Ledger service - transfer, withdraw and deposit
//!
//! Every operation is one unit of work: the ownership and existence checks,
//! the balance writes and the ledger append commit together or not at all.
//! Input validation happens before the unit is opened.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::money::{max_money, validate_amount};
use crate::domain::result::{Error, Result};
use crate::domain::{Account, NewTransaction, Transaction};
use crate::ports::{Repository, UnitOfWork};
use crate::services::ownership::{any_account, owned_account};

/// Outcome of a successful movement: the appended entry and the accounts
/// it touched, as committed.
#[derive(Debug, Clone, Serialize)]
pub struct MovementReceipt {
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Account>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Account>,
}

/// Ledger service
pub struct LedgerService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
}

impl<R: Repository> LedgerService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Move `amount` from one of the user's accounts to any account.
    ///
    /// Checks run in order: source ownership, destination existence,
    /// currency match, funds, destination headroom. A failure after the
    /// debit rolls the whole unit back.
    pub fn transfer(
        &self,
        user_id: i64,
        from_account_id: i64,
        to_account_id: i64,
        amount: Decimal,
    ) -> Result<MovementReceipt> {
        if from_account_id == to_account_id {
            return Err(Error::validation("cannot transfer to the same account"));
        }
        let amount = validate_amount(amount)?;
        let entry = NewTransaction::transfer(from_account_id, to_account_id, amount);
        entry.validate()?;

        self.repository.atomically(|uow| {
            let now = Utc::now();
            let source = owned_account(uow, from_account_id, user_id, "source")?;
            let destination = any_account(uow, to_account_id, "destination")?;

            if source.currency != destination.currency {
                return Err(Error::validation(format!(
                    "currency mismatch: source is {}, destination is {}",
                    source.currency, destination.currency
                )));
            }

            debit(uow, &source, amount, now)?;
            check_credit_headroom(&destination, amount)?;
            if !uow.credit(destination.id, amount, now)? {
                return Err(Error::not_found(format!("destination account {}", destination.id)));
            }
            let transaction = uow.append_transaction(&entry, now)?;

            Ok(MovementReceipt {
                transaction,
                source: Some(reload(uow, source.id)?),
                destination: Some(reload(uow, destination.id)?),
            })
        })
    }

    /// Take `amount` out of one of the user's accounts
    pub fn withdraw(&self, user_id: i64, account_id: i64, amount: Decimal) -> Result<MovementReceipt> {
        let amount = validate_amount(amount)?;
        let entry = NewTransaction::withdraw(account_id, amount);
        entry.validate()?;

        self.repository.atomically(|uow| {
            let now = Utc::now();
            let account = owned_account(uow, account_id, user_id, "source")?;
            debit(uow, &account, amount, now)?;
            let transaction = uow.append_transaction(&entry, now)?;

            Ok(MovementReceipt {
                transaction,
                source: Some(reload(uow, account.id)?),
                destination: None,
            })
        })
    }

    /// Put `amount` into one of the user's accounts
    pub fn deposit(&self, user_id: i64, account_id: i64, amount: Decimal) -> Result<MovementReceipt> {
        let amount = validate_amount(amount)?;
        let entry = NewTransaction::deposit(account_id, amount);
        entry.validate()?;

        self.repository.atomically(|uow| {
            let now = Utc::now();
            let account = owned_account(uow, account_id, user_id, "destination")?;
            check_credit_headroom(&account, amount)?;
            if !uow.credit(account.id, amount, now)? {
                return Err(Error::not_found(format!("destination account {}", account.id)));
            }
            let transaction = uow.append_transaction(&entry, now)?;

            Ok(MovementReceipt {
                transaction,
                source: None,
                destination: Some(reload(uow, account.id)?),
            })
        })
    }
}

/// Conditional debit; a short balance becomes `InsufficientFunds`
fn debit(uow: &dyn UnitOfWork, account: &Account, amount: Decimal, now: DateTime<Utc>) -> Result<()> {
    if uow.debit_if_sufficient(account.id, amount, now)? {
        return Ok(());
    }
    Err(Error::InsufficientFunds {
        account_id: account.id,
        available: account.balance,
        requested: amount,
    })
}

fn check_credit_headroom(account: &Account, amount: Decimal) -> Result<()> {
    match account.balance.checked_add(amount) {
        Some(total) if total <= max_money() => Ok(()),
        _ => Err(Error::validation(format!(
            "account {} cannot hold a balance that large",
            account.id
        ))),
    }
}

fn reload(uow: &dyn UnitOfWork, account_id: i64) -> Result<Account> {
    any_account(uow, account_id, "account")
}
