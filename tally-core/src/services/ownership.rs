//! Ownership check shared by every account-scoped operation

use crate::domain::result::{Error, Result};
use crate::domain::Account;
use crate::ports::UnitOfWork;

/// Load `account_id` if, and only if, it belongs to `user_id`.
///
/// A foreign account and a missing one both surface as `NotFound`, so
/// callers cannot discover other users' account IDs. `label` names the
/// account's role in error messages ("source", "destination", ...).
pub(crate) fn owned_account(
    uow: &dyn UnitOfWork,
    account_id: i64,
    user_id: i64,
    label: &str,
) -> Result<Account> {
    if !uow.account_belongs_to(account_id, user_id)? {
        return Err(Error::not_found(format!("{} account {}", label, account_id)));
    }
    uow.find_account(account_id)?
        .ok_or_else(|| Error::not_found(format!("{} account {}", label, account_id)))
}

/// Load `account_id` regardless of owner
pub(crate) fn any_account(uow: &dyn UnitOfWork, account_id: i64, label: &str) -> Result<Account> {
    uow.find_account(account_id)?
        .ok_or_else(|| Error::not_found(format!("{} account {}", label, account_id)))
}
