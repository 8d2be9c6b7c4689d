//! Repository port - database abstraction

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{Account, NewAccount, NewTransaction, Page, Registration, Transaction, User};

/// Storage operations available inside one atomic scope
///
/// Every method runs against the same underlying database transaction.
/// Nothing written through a `UnitOfWork` is visible to other units until
/// the scope that created it commits.
pub trait UnitOfWork {
    // === Users ===

    /// Insert a user with an already-hashed password
    fn insert_user(
        &self,
        registration: &Registration,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User>;

    fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// True if either the username or the email is already registered
    fn user_exists(&self, username: &str, email: &str) -> Result<bool>;

    // === Accounts ===

    /// Insert an account carrying its opening balance
    fn insert_account(&self, account: &NewAccount, now: DateTime<Utc>) -> Result<Account>;

    fn find_account(&self, account_id: i64) -> Result<Option<Account>>;

    /// The ownership predicate every authorization check goes through
    fn account_belongs_to(&self, account_id: i64, user_id: i64) -> Result<bool>;

    fn accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>>;

    /// Atomically subtract `amount` if the balance covers it.
    ///
    /// Returns `false` (and changes nothing) when the balance is short.
    fn debit_if_sufficient(&self, account_id: i64, amount: Decimal, now: DateTime<Utc>)
        -> Result<bool>;

    /// Add `amount` to the balance. Returns `false` if the account is missing.
    fn credit(&self, account_id: i64, amount: Decimal, now: DateTime<Utc>) -> Result<bool>;

    /// Accounts still owed interest for the year starting at `year_start`,
    /// with IDs above `after_id`, in ID order.
    fn interest_candidates(
        &self,
        year_start: DateTime<Utc>,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Account>>;

    /// Credit interest and stamp the account, only if it is still eligible.
    ///
    /// Returns `false` when another run already stamped it this year.
    fn apply_interest_if_eligible(
        &self,
        account_id: i64,
        interest: Decimal,
        year_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    // === Ledger ===

    /// Append an entry to the ledger. Entries are never updated afterwards.
    fn append_transaction(&self, entry: &NewTransaction, now: DateTime<Utc>)
        -> Result<Transaction>;

    fn find_transaction(&self, transaction_id: i64) -> Result<Option<Transaction>>;

    /// Entries referencing `account_id` on either side, newest first
    fn transactions_for_account(&self, account_id: i64, page: Page) -> Result<Vec<Transaction>>;

    // === Health checks ===

    /// Accounts whose stored balance differs from credits minus debits
    fn balance_mismatches(&self) -> Result<Vec<BalanceMismatch>>;

    /// IDs of entries that reference an account that does not exist
    fn orphaned_transactions(&self) -> Result<Vec<i64>>;

    /// IDs of entries whose references do not match their kind
    fn malformed_transactions(&self) -> Result<Vec<i64>>;
}

/// Scoped access to storage
///
/// `atomically` commits when the closure returns `Ok` and rolls back on
/// `Err`, on early return, and on panic. `read` opens a scope for queries
/// only and is not bounded by the unit timeout.
pub trait Repository: Send + Sync {
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T>;

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T>;
}

/// One account failing ledger reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceMismatch {
    pub account_id: i64,
    pub stored_balance: Decimal,
    pub ledger_balance: Decimal,
}
