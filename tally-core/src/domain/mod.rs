//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod interest;
pub mod money;
pub mod page;
pub mod result;
mod transaction;
mod user;

pub use account::{start_of_year, Account, NewAccount, DEFAULT_CURRENCY};
pub use interest::{BatchFailurePolicy, InterestRateTable, InterestSchedule};
pub use page::Page;
pub use transaction::{NewTransaction, Transaction, TransactionKind};
pub use user::{Registration, User};
