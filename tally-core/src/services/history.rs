//! History service - read-only ledger queries

use std::sync::Arc;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{Page, Transaction};
use crate::ports::Repository;
use crate::services::ownership::owned_account;

/// History service
pub struct HistoryService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
}

impl<R: Repository> HistoryService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Entries touching one of the user's accounts, newest first
    pub fn list_for_account(
        &self,
        user_id: i64,
        account_id: i64,
        page: Page,
    ) -> Result<Vec<Transaction>> {
        self.repository.read(|uow| {
            owned_account(uow, account_id, user_id, "account")?;
            uow.transactions_for_account(account_id, page)
        })
    }

    /// One entry, visible to the owner of either side
    pub fn get_transaction(&self, user_id: i64, transaction_id: i64) -> Result<Transaction> {
        self.repository.read(|uow| {
            let transaction = uow
                .find_transaction(transaction_id)?
                .ok_or_else(|| Error::not_found(format!("transaction {}", transaction_id)))?;

            for side in [transaction.from_account_id, transaction.to_account_id]
                .into_iter()
                .flatten()
            {
                if uow.account_belongs_to(side, user_id)? {
                    return Ok(transaction);
                }
            }
            Err(Error::forbidden(format!(
                "transaction {} does not involve any of your accounts",
                transaction_id
            )))
        })
    }
}
