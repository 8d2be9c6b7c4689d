//! CLI command implementations

pub mod account;
pub mod doctor;
pub mod history;
pub mod interest;
pub mod ledger;
pub mod logs;
pub mod transaction;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::{TallyContext, User};

/// The user a command acts as
///
/// Identity is trusted as given; authentication happens in front of the CLI.
#[derive(Args, Debug, Clone)]
pub struct Actor {
    /// Username to act as
    #[arg(long, env = "TALLY_USER")]
    pub user: String,
}

impl Actor {
    pub fn resolve(&self, ctx: &TallyContext) -> Result<User> {
        Ok(ctx.user_service.find_by_username(&self.user)?)
    }
}

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    logger_for(EntryPoint::Cli)
}

pub fn logger_for(entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    let tally_dir = get_tally_dir().ok()?;
    std::fs::create_dir_all(&tally_dir).ok()?;
    LoggingService::new(&tally_dir, entry_point, env!("CARGO_PKG_VERSION"))
        .ok()
        .map(Arc::new)
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Log the outcome of an operation
pub fn log_outcome<T>(
    logger: &Option<Arc<LoggingService>>,
    operation: &str,
    account_id: Option<i64>,
    result: &tally_core::domain::result::Result<T>,
) {
    let mut event = match result {
        Ok(_) => LogEvent::new("operation_completed"),
        Err(e) => LogEvent::new("operation_failed")
            .with_error(e.to_string())
            .with_error_details(format!("{:?}", e.kind())),
    }
    .with_operation(operation);
    if let Some(id) = account_id {
        event = event.with_account(id);
    }
    log_event(logger, event);
}

/// Get the tally directory from environment or default
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .ok_or_else(|| anyhow!("Could not find home directory; set TALLY_DIR"))
}

/// Open the tally context, logging as the CLI
pub fn get_context() -> Result<TallyContext> {
    context_with_logger(get_logger())
}

pub fn context_with_logger(logger: Option<Arc<LoggingService>>) -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;
    TallyContext::new(&tally_dir, logger).context("Failed to initialize tally context")
}
