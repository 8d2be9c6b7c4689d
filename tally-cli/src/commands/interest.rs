//! Interest batch commands - run once, inspect the schedule, or wait for triggers

use std::future::Future;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use tally_core::services::{EntryPoint, InterestRunReport};
use tally_core::InterestSchedule;

use super::{context_with_logger, get_context, logger_for};
use crate::output;

#[derive(Subcommand)]
pub enum InterestCommands {
    /// Run the interest batch now
    Run {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the trigger window, failure policy and rates
    Schedule {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stay in the foreground and run the batch at every trigger
    Daemon,
}

pub fn run(command: InterestCommands) -> Result<()> {
    match command {
        InterestCommands::Run { json } => {
            let ctx = get_context()?;
            let rates = ctx.config.rate_table()?;
            let report = ctx.interest_service.run(&rates, Utc::now())?;
            print_report(&report, json)
        }
        InterestCommands::Schedule { json } => show_schedule(json),
        InterestCommands::Daemon => run_daemon(),
    }
}

fn show_schedule(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let schedule = *ctx.interest_service.schedule();
    let next = schedule.next_trigger_after(Utc::now());
    let rates = ctx.config.rate_table()?;

    if json {
        return output::json(&serde_json::json!({
            "schedule": schedule,
            "nextTrigger": next,
            "failurePolicy": ctx.interest_service.failure_policy(),
            "batchSize": ctx.config.interest.batch_size,
            "rates": rates.rates(),
        }));
    }

    println!("{}", "Interest schedule".bold());
    println!(
        "  Window:          month {}, days {}-{} (midnight UTC)",
        schedule.month, schedule.first_day, schedule.last_day
    );
    match next {
        Some(at) => println!("  Next trigger:    {}", output::format_time(&at)),
        None => println!("  Next trigger:    {}", "none".dimmed()),
    }
    println!("  Failure policy:  {}", ctx.interest_service.failure_policy());
    println!("  Batch size:      {}", ctx.config.interest.batch_size);

    let mut table = output::create_table();
    table.set_header(vec!["Account type", "Yearly rate"]);
    let mut entries: Vec<_> = rates.rates().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    for (account_type, rate) in entries {
        table.add_row(vec![account_type.clone(), rate.to_string()]);
    }
    println!("{}", table);
    Ok(())
}

fn run_daemon() -> Result<()> {
    // Read the schedule once; the database is reopened per run so other
    // commands can use it between triggers.
    let schedule = *get_context()?.interest_service.schedule();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    output::info(&format!(
        "Waiting for interest triggers (month {}, days {}-{}). Ctrl-C to stop.",
        schedule.month, schedule.first_day, schedule.last_day
    ));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let runs = runtime.block_on(daemon_loop(
        schedule,
        Utc::now,
        |at| {
            let ctx = context_with_logger(logger_for(EntryPoint::Scheduler))?;
            let rates = ctx.config.rate_table()?;
            let report = ctx.interest_service.run(&rates, at)?;
            print_report(&report, false)
        },
        shutdown,
        None,
    ));

    output::info(&format!("Stopped after {} run(s)", runs));
    Ok(())
}

/// Sleep until each trigger of `schedule` and call `run_once` with the
/// trigger time. Returns the number of triggers fired.
///
/// A failing run is reported and the loop keeps going. Stops when
/// `shutdown` resolves, the schedule has no further trigger, or
/// `max_runs` is reached.
async fn daemon_loop<C, F, S>(
    schedule: InterestSchedule,
    clock: C,
    mut run_once: F,
    shutdown: S,
    max_runs: Option<usize>,
) -> usize
where
    C: Fn() -> DateTime<Utc>,
    F: FnMut(DateTime<Utc>) -> Result<()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut after = clock();
    let mut runs = 0;

    while max_runs.map_or(true, |max| runs < max) {
        let Some(next) = schedule.next_trigger_after(after) else {
            break;
        };
        let wait = (next - clock()).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => break,
        }

        if let Err(e) = run_once(next) {
            output::error(&format!("Interest run at {} failed: {:#}", next, e));
        }
        runs += 1;
        after = next;
    }
    runs
}

fn print_report(report: &InterestRunReport, json: bool) -> Result<()> {
    if json {
        return output::json(report);
    }

    let headline = format!(
        "Interest run {}: {} applied, {} skipped of {} scanned (total {})",
        report.run_id, report.applied, report.skipped, report.scanned, report.total_interest
    );
    if report.halted {
        output::warning(&format!("{} - halted after a failure", headline));
    } else if report.failures.is_empty() {
        output::success(&headline);
    } else {
        output::warning(&headline);
    }

    if let Some(index) = report.sub_run_index {
        println!("  Sub-run {} of the window", index + 1);
    }
    for failure in &report.failures {
        println!("  {} account {}: {}", "x".red(), failure.account_id, failure.message);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use tokio::time::Instant;

    fn paused_clock(base: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> {
        let started = Instant::now();
        move || base + chrono::Duration::from_std(started.elapsed()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_fires_on_each_window_day() {
        let base = Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap();
        let fired = RefCell::new(Vec::new());

        let runs = daemon_loop(
            InterestSchedule::default(),
            paused_clock(base),
            |at| {
                fired.borrow_mut().push(at);
                Ok(())
            },
            std::future::pending(),
            Some(3),
        )
        .await;

        assert_eq!(runs, 3);
        let days: Vec<_> = fired
            .borrow()
            .iter()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .collect();
        assert_eq!(days, vec!["2027-01-01 00:00", "2027-01-02 00:00", "2027-01-03 00:00"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_survives_failed_run() {
        let base = Utc.with_ymd_and_hms(2027, 1, 5, 12, 0, 0).unwrap();
        let mut calls = 0;

        let runs = daemon_loop(
            InterestSchedule::default(),
            paused_clock(base),
            |_| {
                calls += 1;
                anyhow::bail!("database busy")
            },
            std::future::pending(),
            Some(2),
        )
        .await;

        assert_eq!(runs, 2);
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daemon_stops_on_shutdown() {
        let base = Utc.with_ymd_and_hms(2027, 3, 1, 0, 0, 0).unwrap();

        let runs = daemon_loop(
            InterestSchedule::default(),
            paused_clock(base),
            |_| Ok(()),
            tokio::time::sleep(std::time::Duration::from_secs(60)),
            None,
        )
        .await;

        assert_eq!(runs, 0);
    }
}
