//! Concurrent ledger access tests
//!
//! Threads share one repository and race on the same accounts. The
//! conditional debit plus the per-unit transaction must keep every balance
//! non-negative and the total amount of money constant.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::domain::Registration;
use tally_core::ports::Repository;
use tally_core::services::{AccountService, DoctorService, LedgerService, UserService};
use tally_core::ErrorKind;

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 6;

/// Number of iterations per thread
const ITERATIONS_PER_THREAD: usize = 10;

fn create_test_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let repo = DuckDbRepository::new(&temp_dir.path().join("test_concurrent.duckdb"))
        .expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    Arc::new(repo)
}

fn register(repo: &Arc<DuckDbRepository>, name: &str) -> i64 {
    UserService::new(Arc::clone(repo))
        .register(Registration::new(name, format!("{}@example.com", name), "password123"))
        .unwrap()
        .id
}

/// Two withdrawals of the full balance race; exactly one may win.
#[test]
fn test_concurrent_withdrawals_of_full_balance() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let alice = register(&repo, "alice");
    let account = AccountService::new(Arc::clone(&repo))
        .open_account(alice, "savings", None, Some(dec!(100)))
        .unwrap()
        .id;

    let barrier = Arc::new(Barrier::new(2));
    let successes = Arc::new(AtomicUsize::new(0));
    let insufficient = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let successes = Arc::clone(&successes);
            let insufficient = Arc::clone(&insufficient);
            let ledger = LedgerService::new(Arc::clone(&repo));

            thread::spawn(move || {
                barrier.wait();
                match ledger.withdraw(alice, account, dec!(100)) {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) if e.kind() == ErrorKind::InsufficientFunds => {
                        insufficient.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(insufficient.load(Ordering::SeqCst), 1);
    let balance = repo
        .read(|uow| uow.find_account(account))
        .unwrap()
        .unwrap()
        .balance;
    assert_eq!(balance, Decimal::ZERO);
}

/// Threads shuffle money around a ring of accounts. Some transfers fail for
/// lack of funds; none may create or destroy money.
#[test]
fn test_concurrent_transfers_conserve_total() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let accounts = AccountService::new(Arc::clone(&repo));

    let mut ring = Vec::new();
    for i in 0..THREAD_COUNT {
        let user = register(&repo, &format!("user{}", i));
        let account = accounts
            .open_account(user, "checking", None, Some(dec!(50)))
            .unwrap();
        ring.push((user, account.id));
    }
    let ring = Arc::new(ring);
    let expected_total = dec!(50) * Decimal::from(THREAD_COUNT);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let unexpected_errors = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let ring = Arc::clone(&ring);
            let unexpected_errors = Arc::clone(&unexpected_errors);
            let ledger = LedgerService::new(Arc::clone(&repo));

            thread::spawn(move || {
                barrier.wait();
                let start = Instant::now();
                let (user, from) = ring[thread_id];
                let (_, to) = ring[(thread_id + 1) % ring.len()];

                for i in 0..ITERATIONS_PER_THREAD {
                    let amount = Decimal::from(7 + i as i64);
                    match ledger.transfer(user, from, to, amount) {
                        Ok(_) => {}
                        Err(e) if e.kind() == ErrorKind::InsufficientFunds => {}
                        Err(e) => {
                            eprintln!("Thread {}: transfer error at iteration {}: {}", thread_id, i, e);
                            unexpected_errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
                println!(
                    "Thread {}: Completed {} transfers in {:?}",
                    thread_id,
                    ITERATIONS_PER_THREAD,
                    start.elapsed()
                );
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(unexpected_errors.load(Ordering::SeqCst), 0);

    let balances: Vec<Decimal> = ring
        .iter()
        .map(|(_, id)| {
            repo.read(|uow| uow.find_account(*id))
                .unwrap()
                .unwrap()
                .balance
        })
        .collect();
    assert!(balances.iter().all(|b| *b >= Decimal::ZERO));
    assert_eq!(balances.iter().copied().sum::<Decimal>(), expected_total);

    let doctor = DoctorService::new(Arc::clone(&repo)).run_checks().unwrap();
    assert!(doctor.is_healthy(), "doctor found problems: {:?}", doctor.checks);
}

/// Readers keep working while writers hold units open.
#[test]
fn test_concurrent_reads_during_deposits() {
    let temp_dir = TempDir::new().unwrap();
    let repo = create_test_repo(&temp_dir);
    let alice = register(&repo, "alice");
    let account = AccountService::new(Arc::clone(&repo))
        .open_account(alice, "savings", None, None)
        .unwrap()
        .id;

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let read_errors = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let barrier = Arc::clone(&barrier);
            let read_errors = Arc::clone(&read_errors);
            let repo = Arc::clone(&repo);

            thread::spawn(move || {
                barrier.wait();
                let ledger = LedgerService::new(Arc::clone(&repo));
                for _ in 0..ITERATIONS_PER_THREAD {
                    if thread_id % 2 == 0 {
                        ledger.deposit(alice, account, dec!(1)).unwrap();
                    } else if repo.read(|uow| uow.accounts_for_user(alice)).is_err() {
                        read_errors.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(read_errors.load(Ordering::SeqCst), 0);
    let writers = (0..THREAD_COUNT).filter(|t| t % 2 == 0).count();
    let balance = repo
        .read(|uow| uow.find_account(account))
        .unwrap()
        .unwrap()
        .balance;
    assert_eq!(balance, Decimal::from(writers * ITERATIONS_PER_THREAD));
}
