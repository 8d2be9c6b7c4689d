//! Account service - opening and listing accounts

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{Account, NewAccount, NewTransaction, DEFAULT_CURRENCY};
use crate::ports::Repository;
use crate::services::ownership::owned_account;

/// Account service
pub struct AccountService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
    default_currency: String,
}

impl<R: Repository> AccountService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Currency used when `open_account` is not given one
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    /// Open an account for `user_id`
    ///
    /// A positive opening balance is booked as a deposit entry in the same
    /// unit, so the balance always reconciles with the ledger.
    pub fn open_account(
        &self,
        user_id: i64,
        account_type: &str,
        currency: Option<&str>,
        opening_balance: Option<Decimal>,
    ) -> Result<Account> {
        let request = NewAccount::new(user_id, account_type)
            .with_currency(currency.unwrap_or(&self.default_currency))
            .with_opening_balance(opening_balance.unwrap_or(Decimal::ZERO))
            .validate()?;

        self.repository.atomically(|uow| {
            if uow.find_user(user_id)?.is_none() {
                return Err(Error::not_found(format!("user {}", user_id)));
            }
            let now = Utc::now();
            let account = uow.insert_account(&request, now)?;
            if account.balance > Decimal::ZERO {
                uow.append_transaction(
                    &NewTransaction::opening_balance(account.id, account.balance),
                    now,
                )?;
            }
            Ok(account)
        })
    }

    /// The user's accounts, ordered by ID
    pub fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        self.repository.read(|uow| uow.accounts_for_user(user_id))
    }

    /// One of the user's accounts
    pub fn get_account(&self, user_id: i64, account_id: i64) -> Result<Account> {
        self.repository
            .read(|uow| owned_account(uow, account_id, user_id, "account"))
    }
}
