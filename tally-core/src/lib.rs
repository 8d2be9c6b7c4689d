//! Tally Core - business logic for a small banking ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (User, Account, Transaction, ...)
//! - **ports**: Trait definitions for storage (Repository, UnitOfWork)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult};
pub use domain::{
    Account, BatchFailurePolicy, InterestRateTable, InterestSchedule, Page, Transaction,
    TransactionKind, User,
};

/// Ledger database file inside the tally directory
pub const DB_FILENAME: &str = "tally.duckdb";

/// Main context for Tally operations
///
/// Holds the configuration, the repository and every service built on it.
pub struct TallyContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub user_service: UserService,
    pub account_service: AccountService,
    pub ledger_service: LedgerService,
    pub history_service: HistoryService,
    pub interest_service: InterestService,
    pub doctor_service: DoctorService,
    /// Event log shared with the services, if one was supplied
    pub logger: Option<Arc<LoggingService>>,
}

impl TallyContext {
    /// Open the tally directory: load settings, open and migrate the
    /// database, wire up services.
    pub fn new(tally_dir: &Path, logger: Option<Arc<LoggingService>>) -> Result<Self> {
        std::fs::create_dir_all(tally_dir)
            .with_context(|| format!("Failed to create {}", tally_dir.display()))?;
        let config = Config::load(tally_dir).context("Failed to load settings.json")?;

        let db_path = tally_dir.join(DB_FILENAME);
        let repository = Arc::new(
            DuckDbRepository::new(&db_path)
                .with_context(|| format!("Failed to open {}", db_path.display()))?
                .with_unit_timeout(config.unit_timeout()),
        );
        repository.ensure_schema()?;

        let user_service = UserService::new(Arc::clone(&repository));
        let account_service = AccountService::new(Arc::clone(&repository))
            .with_default_currency(config.default_currency.clone());
        let ledger_service = LedgerService::new(Arc::clone(&repository));
        let history_service = HistoryService::new(Arc::clone(&repository));
        let mut interest_service = InterestService::new(Arc::clone(&repository))
            .with_batch_size(config.interest.batch_size)
            .with_failure_policy(config.interest.failure_policy)
            .with_schedule(config.interest.schedule);
        if let Some(logger) = &logger {
            interest_service = interest_service.with_logger(Arc::clone(logger));
        }
        let doctor_service = DoctorService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            user_service,
            account_service,
            ledger_service,
            history_service,
            interest_service,
            doctor_service,
            logger,
        })
    }
}
