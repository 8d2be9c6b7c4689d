//! Interest service - yearly interest accrual batch
//!
//! A run (one daily sub-run of the window) takes at most `batch_size` of the
//! accounts still owed interest this year, lowest IDs first. Each account is
//! credited in its own unit of work, and the eligibility condition is checked
//! again by the statement that stamps the account. Credited accounts leave
//! the eligible set, so the next sub-run picks up where this one stopped and
//! overlapping sub-runs never credit an account twice. Accounts that failed
//! stay eligible and are retried by the next sub-run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::money::{compute_interest, max_money};
use crate::domain::result::{Error, Result};
use crate::domain::{
    start_of_year, BatchFailurePolicy, InterestRateTable, InterestSchedule, NewTransaction,
};
use crate::ports::Repository;
use crate::services::{LogEvent, LoggingService};

/// Default number of accounts one sub-run may credit
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// One account whose unit failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountFailure {
    pub account_id: i64,
    pub message: String,
}

/// Summary of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct InterestRunReport {
    pub run_id: Uuid,
    pub year_start: DateTime<Utc>,
    /// Day offset inside the configured window, `None` when run outside it
    pub sub_run_index: Option<u32>,
    pub scanned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub total_interest: Decimal,
    pub failures: Vec<AccountFailure>,
    pub halted: bool,
}

enum Outcome {
    Applied(Decimal),
    Skipped,
}

/// Interest batch service
pub struct InterestService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
    batch_size: i64,
    failure_policy: BatchFailurePolicy,
    schedule: InterestSchedule,
    logger: Option<Arc<LoggingService>>,
}

impl<R: Repository> InterestService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            batch_size: DEFAULT_BATCH_SIZE,
            failure_policy: BatchFailurePolicy::default(),
            schedule: InterestSchedule::default(),
            logger: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_schedule(mut self, schedule: InterestSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn schedule(&self) -> &InterestSchedule {
        &self.schedule
    }

    pub fn failure_policy(&self) -> BatchFailurePolicy {
        self.failure_policy
    }

    /// Apply this year's interest to the next batch of eligible accounts
    ///
    /// Only failures to scan for candidates abort the run with an error.
    /// Per-account failures are collected in the report and handled per
    /// the configured failure policy.
    pub fn run(&self, rates: &InterestRateTable, now: DateTime<Utc>) -> Result<InterestRunReport> {
        let year_start = start_of_year(now);
        let mut report = InterestRunReport {
            run_id: Uuid::new_v4(),
            year_start,
            sub_run_index: self.schedule.sub_run_index(now),
            scanned: 0,
            applied: 0,
            skipped: 0,
            total_interest: Decimal::ZERO,
            failures: Vec::new(),
            halted: false,
        };
        // Accounts credited by earlier sub-runs drop out of the eligible set,
        // so each sub-run takes the next `batch_size` from the front.
        let batch_size = self.batch_size;
        let candidates = self
            .repository
            .read(|uow| uow.interest_candidates(year_start, 0, batch_size))?;

        for account in candidates {
            report.scanned += 1;
            let rate = rates.rate_for(&account.account_type);

            match self.apply_one(account.id, rate, year_start, now) {
                Ok(Outcome::Applied(interest)) => {
                    report.applied += 1;
                    report.total_interest += interest;
                    self.log(
                        LogEvent::new("interest_applied")
                            .with_operation("interest_run")
                            .with_account(account.id)
                            .with_details(format!("amount {}", interest)),
                    );
                }
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    self.log(
                        LogEvent::new("interest_account_failed")
                            .with_operation("interest_run")
                            .with_account(account.id)
                            .with_error(err.to_string())
                            .with_error_details(format!("run {}", report.run_id)),
                    );
                    report.failures.push(AccountFailure {
                        account_id: account.id,
                        message: err.to_string(),
                    });
                    if self.failure_policy == BatchFailurePolicy::Halt {
                        report.halted = true;
                        break;
                    }
                }
            }
        }

        let event = if report.halted {
            "interest_run_halted"
        } else {
            "interest_run_completed"
        };
        self.log(LogEvent::new(event).with_operation("interest_run"));

        Ok(report)
    }

    /// Credit one account inside its own unit of work
    fn apply_one(
        &self,
        account_id: i64,
        rate: Decimal,
        year_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        self.repository.atomically(|uow| {
            let Some(account) = uow.find_account(account_id)? else {
                return Ok(Outcome::Skipped);
            };
            if !account.is_interest_eligible(now) {
                return Ok(Outcome::Skipped);
            }

            let interest = compute_interest(account.balance, rate)
                .filter(|i| account.balance.checked_add(*i).is_some_and(|b| b <= max_money()))
                .ok_or_else(|| {
                    Error::validation(format!("interest for account {} overflows", account.id))
                })?;

            if !uow.apply_interest_if_eligible(account.id, interest, year_start, now)? {
                return Ok(Outcome::Skipped);
            }
            // Ledger amounts are strictly positive; a zero credit only stamps
            if interest > Decimal::ZERO {
                uow.append_transaction(&NewTransaction::interest(account.id, interest), now)?;
            }
            Ok(Outcome::Applied(interest))
        })
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            let _ = logger.log(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewAccount, Page, TransactionKind};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn repo() -> Arc<DuckDbRepository> {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        Arc::new(repo)
    }

    fn open(repo: &DuckDbRepository, account_type: &str, balance: Decimal) -> i64 {
        repo.atomically(|uow| {
            let account = uow.insert_account(
                &NewAccount::new(1, account_type).with_opening_balance(balance),
                Utc::now(),
            )?;
            if balance > Decimal::ZERO {
                uow.append_transaction(&NewTransaction::opening_balance(account.id, balance), Utc::now())?;
            }
            Ok(account.id)
        })
        .unwrap()
    }

    #[test]
    fn test_empty_run_is_not_an_error() {
        let service = InterestService::new(repo());
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let report = service.run(&InterestRateTable::default(), now).unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.applied, 0);
        assert_eq!(report.sub_run_index, Some(0));
        assert!(!report.halted);
    }

    #[test]
    fn test_batch_size_caps_each_sub_run() {
        let repo = repo();
        let ids: Vec<i64> = (0..5).map(|_| open(&repo, "savings", dec!(100))).collect();
        let service = InterestService::new(Arc::clone(&repo)).with_batch_size(2);
        let rates = InterestRateTable::default();
        let balance = |id| repo.read(|uow| uow.find_account(id)).unwrap().unwrap().balance;

        let first = service
            .run(&rates, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(first.sub_run_index, Some(0));
        assert_eq!(first.scanned, 2);
        assert_eq!(first.applied, 2);
        assert_eq!(first.total_interest, dec!(8));
        assert_eq!(balance(ids[0]), dec!(104));
        assert_eq!(balance(ids[1]), dec!(104));
        assert_eq!(balance(ids[2]), dec!(100));

        let second = service
            .run(&rates, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(second.sub_run_index, Some(1));
        assert_eq!(second.applied, 2);
        assert_eq!(balance(ids[3]), dec!(104));
        assert_eq!(balance(ids[4]), dec!(100));

        let third = service
            .run(&rates, Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(third.scanned, 1);
        assert_eq!(third.applied, 1);

        for id in &ids {
            assert_eq!(balance(*id), dec!(104));
        }

        let fourth = service
            .run(&rates, Utc.with_ymd_and_hms(2025, 1, 4, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(fourth.scanned, 0);
    }

    #[test]
    fn test_zero_interest_stamps_without_entry() {
        let repo = repo();
        let id = open(&repo, "brokerage", dec!(100));
        let service = InterestService::new(Arc::clone(&repo));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let report = service.run(&InterestRateTable::default(), now).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.total_interest, Decimal::ZERO);

        let account = repo.read(|uow| uow.find_account(id)).unwrap().unwrap();
        assert_eq!(account.balance, dec!(100));
        assert!(account.last_interest_applied_at.is_some());
        let entries = repo
            .read(|uow| uow.transactions_for_account(id, Page::default()))
            .unwrap();
        assert!(entries.iter().all(|t| t.kind != TransactionKind::Interest));
    }

    #[test]
    fn test_rounding_is_half_even() {
        let repo = repo();
        let down = open(&repo, "savings", dec!(0.0001));
        let up = open(&repo, "savings", dec!(0.0003));
        let rates = InterestRateTable::new(HashMap::from([("savings".to_string(), dec!(0.5))]))
            .unwrap();
        let service = InterestService::new(Arc::clone(&repo));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        service.run(&rates, now).unwrap();
        // 0.00005 rounds to 0.0000 and 0.00015 to 0.0002
        let balance = |id| repo.read(|uow| uow.find_account(id)).unwrap().unwrap().balance;
        assert_eq!(balance(down), dec!(0.0001));
        assert_eq!(balance(up), dec!(0.0005));
    }
}
