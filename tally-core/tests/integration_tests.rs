//! Integration tests for tally-core services
//!
//! These tests exercise the ledger end to end against a real DuckDB file.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::domain::{Page, Registration};
use tally_core::ports::Repository;
use tally_core::services::{
    AccountService, DoctorService, EntryPoint, HistoryService, InterestService, LedgerService,
    LoggingService, UserService,
};
use tally_core::{BatchFailurePolicy, Error, ErrorKind, InterestRateTable, TallyContext, TransactionKind};

// ============================================================================
// Test Helpers
// ============================================================================

/// Create a test repository with schema initialized
fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let db_path = temp_dir.path().join("test.duckdb");
    let repo = DuckDbRepository::new(&db_path).expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

struct Bank {
    repo: Arc<DuckDbRepository>,
    users: UserService,
    accounts: AccountService,
    ledger: LedgerService,
    history: HistoryService,
}

impl Bank {
    fn new(temp_dir: &TempDir) -> Self {
        let repo = create_test_repo(temp_dir);
        Self {
            users: UserService::new(Arc::clone(&repo)),
            accounts: AccountService::new(Arc::clone(&repo)),
            ledger: LedgerService::new(Arc::clone(&repo)),
            history: HistoryService::new(Arc::clone(&repo)),
            repo,
        }
    }

    fn user(&self, name: &str) -> i64 {
        self.users
            .register(Registration::new(name, format!("{}@example.com", name), "password123"))
            .expect("Failed to register user")
            .id
    }

    fn account(&self, user_id: i64, account_type: &str, balance: Decimal) -> i64 {
        self.accounts
            .open_account(user_id, account_type, None, Some(balance))
            .expect("Failed to open account")
            .id
    }

    fn balance(&self, account_id: i64) -> Decimal {
        self.repo
            .read(|uow| uow.find_account(account_id))
            .unwrap()
            .expect("account should exist")
            .balance
    }

    fn entry_count(&self, account_id: i64) -> usize {
        self.repo
            .read(|uow| uow.transactions_for_account(account_id, Page::new(Some(1_000), None)))
            .unwrap()
            .len()
    }
}

// ============================================================================
// Ledger Operations
// ============================================================================

#[test]
fn test_transfer_moves_exact_amount_and_appends_one_entry() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let bob = bank.user("bob");
    let source = bank.account(alice, "savings", dec!(100.00));
    let destination = bank.account(bob, "checking", dec!(0));

    let receipt = bank.ledger.transfer(alice, source, destination, dec!(30.5)).unwrap();

    assert_eq!(bank.balance(source), dec!(69.5));
    assert_eq!(bank.balance(destination), dec!(30.5));
    assert_eq!(receipt.transaction.kind, TransactionKind::Transfer);
    assert_eq!(receipt.transaction.amount, dec!(30.5));
    assert_eq!(receipt.transaction.from_account_id, Some(source));
    assert_eq!(receipt.transaction.to_account_id, Some(destination));

    // Opening balance plus the transfer
    assert_eq!(bank.entry_count(source), 2);
    assert_eq!(bank.entry_count(destination), 1);
}

#[test]
fn test_insufficient_funds_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let bob = bank.user("bob");
    let source = bank.account(alice, "savings", dec!(10));
    let destination = bank.account(bob, "savings", dec!(5));

    let err = bank.ledger.transfer(alice, source, destination, dec!(10.01)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(bank.balance(source), dec!(10));
    assert_eq!(bank.balance(destination), dec!(5));
    assert_eq!(bank.entry_count(source), 1);
    assert_eq!(bank.entry_count(destination), 1);
}

#[test]
fn test_failed_transfer_then_corrected_retry_applies_once() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let bob = bank.user("bob");
    let source = bank.account(alice, "savings", dec!(50));
    let destination = bank.account(bob, "savings", dec!(0));

    assert!(bank.ledger.transfer(alice, source, destination, dec!(80)).is_err());
    assert!(bank.ledger.transfer(alice, source, source, dec!(20)).is_err());
    bank.ledger.transfer(alice, source, destination, dec!(20)).unwrap();

    assert_eq!(bank.balance(source), dec!(30));
    assert_eq!(bank.balance(destination), dec!(20));
    assert_eq!(bank.entry_count(destination), 1);
}

#[test]
fn test_deposit_example() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let account = bank.account(alice, "savings", dec!(50.00));

    let receipt = bank.ledger.deposit(alice, account, dec!(100.00)).unwrap();

    assert_eq!(bank.balance(account), dec!(150.00));
    assert_eq!(receipt.transaction.kind, TransactionKind::Deposit);
    assert_eq!(receipt.transaction.to_account_id, Some(account));
    assert_eq!(receipt.transaction.from_account_id, None);
    assert_eq!(receipt.transaction.amount, dec!(100.00));
    assert_eq!(receipt.transaction.description, "Deposit into account");
}

#[test]
fn test_withdraw_only_from_own_account() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let mallory = bank.user("mallory");
    let account = bank.account(alice, "savings", dec!(20));

    let err = bank.ledger.withdraw(mallory, account, dec!(5)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let receipt = bank.ledger.withdraw(alice, account, dec!(5)).unwrap();
    assert_eq!(receipt.transaction.description, "Withdrawal from account");
    assert_eq!(bank.balance(account), dec!(15));
}

#[test]
fn test_unit_timeout_rolls_back_ledger_operation() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let account = bank.account(alice, "savings", dec!(20));

    let db_path = temp_dir.path().join("test.duckdb");
    drop(bank);
    let strict = Arc::new(
        DuckDbRepository::new(&db_path)
            .unwrap()
            .with_unit_timeout(Duration::ZERO),
    );
    let ledger = LedgerService::new(Arc::clone(&strict));

    let err = ledger.deposit(alice, account, dec!(1)).unwrap_err();
    assert!(matches!(err, Error::Timeout(0)));
    assert_eq!(err.kind(), ErrorKind::Internal);

    let after = strict.read(|uow| uow.find_account(account)).unwrap().unwrap();
    assert_eq!(after.balance, dec!(20));
}

// ============================================================================
// History and Lookup
// ============================================================================

#[test]
fn test_history_paging_newest_first() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let account = bank.account(alice, "savings", dec!(0));

    let mut ids = Vec::new();
    for i in 1..=12 {
        ids.push(bank.ledger.deposit(alice, account, Decimal::from(i)).unwrap().transaction.id);
    }
    ids.reverse();

    let page = bank.history.list_for_account(alice, account, Page::new(Some(3), Some(2))).unwrap();
    let got: Vec<i64> = page.iter().map(|t| t.id).collect();
    assert_eq!(got, ids[2..5].to_vec());

    // Invalid paging falls back to limit 10, offset 0
    let fallback = bank
        .history
        .list_for_account(alice, account, Page::from_params(Some("-4"), Some("abc")))
        .unwrap();
    let got: Vec<i64> = fallback.iter().map(|t| t.id).collect();
    assert_eq!(got, ids[0..10].to_vec());

    let past_end = bank
        .history
        .list_for_account(alice, account, Page::new(Some(10), Some(100)))
        .unwrap();
    assert!(past_end.is_empty());
}

#[test]
fn test_lookup_authorization() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let bob = bank.user("bob");
    let eve = bank.user("eve");
    let a = bank.account(alice, "savings", dec!(10));
    let b = bank.account(bob, "savings", dec!(0));

    let transfer = bank.ledger.transfer(alice, a, b, dec!(1)).unwrap().transaction;
    let withdrawal = bank.ledger.withdraw(alice, a, dec!(1)).unwrap().transaction;

    assert!(bank.history.get_transaction(alice, transfer.id).is_ok());
    assert!(bank.history.get_transaction(bob, transfer.id).is_ok());
    assert_eq!(
        bank.history.get_transaction(eve, transfer.id).unwrap_err().kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        bank.history.get_transaction(bob, withdrawal.id).unwrap_err().kind(),
        ErrorKind::Forbidden
    );
    assert_eq!(
        bank.history.get_transaction(alice, 424_242).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

// ============================================================================
// Interest Accrual
// ============================================================================

#[test]
fn test_interest_applies_once_per_year() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let savings = bank.account(alice, "savings", dec!(1000));
    let checking = bank.account(alice, "checking", dec!(250.50));

    let interest = InterestService::new(Arc::clone(&bank.repo));
    let rates = InterestRateTable::default();
    let jan1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let report = interest.run(&rates, jan1).unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(report.total_interest, dec!(42.505));
    assert_eq!(bank.balance(savings), dec!(1040));
    assert_eq!(bank.balance(checking), dec!(253.005));

    let entries = bank.history.list_for_account(alice, savings, Page::default()).unwrap();
    let credited: Vec<_> = entries.iter().filter(|t| t.kind == TransactionKind::Interest).collect();
    assert_eq!(credited.len(), 1);
    assert_eq!(credited[0].amount, dec!(40));
    assert_eq!(credited[0].to_account_id, Some(savings));
    assert_eq!(credited[0].description, format!("Interest for account ID {}", savings));

    // Next day's sub-run finds nothing left to do
    let jan2 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
    let second = interest.run(&rates, jan2).unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(bank.balance(savings), dec!(1040));

    // A new year makes the accounts eligible again
    let next_year = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let third = interest.run(&rates, next_year).unwrap();
    assert_eq!(third.applied, 2);
    assert_eq!(bank.balance(savings), dec!(1081.6));
}

#[test]
fn test_interest_failure_policies() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let first = bank.account(alice, "savings", dec!(100));
    bank.account(alice, "savings", dec!(100));
    bank.account(alice, "savings", dec!(100));

    let db_path = temp_dir.path().join("test.duckdb");
    drop(bank);
    // Candidate scans are reads and still succeed; every account unit times out
    let strict = Arc::new(
        DuckDbRepository::new(&db_path)
            .unwrap()
            .with_unit_timeout(Duration::ZERO),
    );
    let rates = InterestRateTable::default();
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let halting = InterestService::new(Arc::clone(&strict))
        .with_failure_policy(BatchFailurePolicy::Halt)
        .run(&rates, now)
        .unwrap();
    assert!(halting.halted);
    assert_eq!(halting.scanned, 1);
    assert_eq!(halting.failures.len(), 1);
    assert_eq!(halting.failures[0].account_id, first);

    let continuing = InterestService::new(Arc::clone(&strict))
        .with_failure_policy(BatchFailurePolicy::Continue)
        .run(&rates, now)
        .unwrap();
    assert!(!continuing.halted);
    assert_eq!(continuing.scanned, 3);
    assert_eq!(continuing.failures.len(), 3);
    assert_eq!(continuing.applied, 0);

    let untouched = strict.read(|uow| uow.find_account(first)).unwrap().unwrap();
    assert_eq!(untouched.balance, dec!(100));
    assert!(untouched.last_interest_applied_at.is_none());
}

#[test]
fn test_interest_run_is_logged() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let account = bank.account(alice, "savings", dec!(100));

    let logger = Arc::new(LoggingService::new(temp_dir.path(), EntryPoint::Scheduler, "test").unwrap());
    let interest = InterestService::new(Arc::clone(&bank.repo)).with_logger(Arc::clone(&logger));
    interest
        .run(&InterestRateTable::default(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        .unwrap();

    let entries = logger.get_recent(10).unwrap();
    let applied = entries
        .iter()
        .find(|e| e.event == "interest_applied" && e.account_id == Some(account))
        .expect("applied interest should be logged");
    let amount: Decimal = applied
        .details
        .as_deref()
        .and_then(|d| d.strip_prefix("amount "))
        .and_then(|a| a.parse().ok())
        .expect("applied amount should be logged");
    assert_eq!(amount, dec!(4));
    assert!(entries.iter().any(|e| e.event == "interest_run_completed"));
}

// ============================================================================
// Health and Context
// ============================================================================

#[test]
fn test_doctor_clean_after_mixed_operations() {
    let temp_dir = TempDir::new().unwrap();
    let bank = Bank::new(&temp_dir);
    let alice = bank.user("alice");
    let bob = bank.user("bob");
    let a = bank.account(alice, "savings", dec!(500));
    let b = bank.account(bob, "checking", dec!(25));

    bank.ledger.transfer(alice, a, b, dec!(125.25)).unwrap();
    bank.ledger.withdraw(bob, b, dec!(50)).unwrap();
    bank.ledger.deposit(alice, a, dec!(0.0001)).unwrap();
    let _ = bank.ledger.withdraw(alice, a, dec!(10_000));
    InterestService::new(Arc::clone(&bank.repo))
        .run(&InterestRateTable::default(), Utc::now())
        .unwrap();

    let result = DoctorService::new(Arc::clone(&bank.repo)).run_checks().unwrap();
    assert!(result.is_healthy(), "doctor found problems: {:?}", result.checks);
}

#[test]
fn test_context_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (alice, account) = {
        let ctx = TallyContext::new(temp_dir.path(), None).unwrap();
        let alice = ctx
            .user_service
            .register(Registration::new("alice", "alice@example.com", "password123"))
            .unwrap();
        let account = ctx
            .account_service
            .open_account(alice.id, "savings", None, Some(dec!(12.5)))
            .unwrap();
        (alice.id, account.id)
    };

    let ctx = TallyContext::new(temp_dir.path(), None).unwrap();
    assert_eq!(ctx.user_service.login("alice", "password123").unwrap().id, alice);
    assert_eq!(ctx.account_service.get_account(alice, account).unwrap().balance, dec!(12.5));
    assert!(temp_dir.path().join(tally_core::DB_FILENAME).exists());
}
