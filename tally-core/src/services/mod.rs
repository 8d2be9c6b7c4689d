//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod account;
mod doctor;
mod history;
pub mod interest;
mod ledger;
pub mod logging;
pub mod migration;
mod ownership;
mod user;

pub use account::AccountService;
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use history::HistoryService;
pub use interest::{AccountFailure, InterestRunReport, InterestService};
pub use ledger::{LedgerService, MovementReceipt};
pub use logging::{now_ms, EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use user::UserService;
