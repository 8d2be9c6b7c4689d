//! Interest configuration values: rate table and trigger window

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::result::{Error, Result};

/// Yearly interest rate per account type
///
/// Read-only once built. Types without an entry earn nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRateTable {
    rates: HashMap<String, Decimal>,
}

impl Default for InterestRateTable {
    fn default() -> Self {
        let rates = HashMap::from([
            ("savings".to_string(), Decimal::new(4, 2)),
            ("checking".to_string(), Decimal::new(1, 2)),
        ]);
        Self { rates }
    }
}

impl InterestRateTable {
    /// Build a table, rejecting rates outside 0..=1
    pub fn new(rates: HashMap<String, Decimal>) -> Result<Self> {
        let mut normalized = HashMap::with_capacity(rates.len());
        for (account_type, rate) in rates {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(Error::config(format!(
                    "interest rate for '{}' must be between 0 and 1, got {}",
                    account_type, rate
                )));
            }
            normalized.insert(Account::normalize_type(&account_type), rate);
        }
        Ok(Self { rates: normalized })
    }

    pub fn rate_for(&self, account_type: &str) -> Decimal {
        self.rates
            .get(&Account::normalize_type(account_type))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn rates(&self) -> &HashMap<String, Decimal> {
        &self.rates
    }
}

/// Days of the year on which the interest batch runs
///
/// One sub-run per day, at midnight UTC, from `first_day` to `last_day` of
/// `month`. The default is the first week of January.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestSchedule {
    pub month: u32,
    pub first_day: u32,
    pub last_day: u32,
}

impl Default for InterestSchedule {
    fn default() -> Self {
        Self {
            month: 1,
            first_day: 1,
            last_day: 7,
        }
    }
}

impl InterestSchedule {
    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.month) {
            return Err(Error::config(format!("invalid interest month: {}", self.month)));
        }
        if self.first_day < 1 || self.first_day > self.last_day || self.last_day > 31 {
            return Err(Error::config(format!(
                "invalid interest window: days {}..={}",
                self.first_day, self.last_day
            )));
        }
        // 2024 is a leap year, so any day that exists at all exists there
        if NaiveDate::from_ymd_opt(2024, self.month, self.first_day).is_none() {
            return Err(Error::config(format!(
                "interest window never starts: month {} has no day {}",
                self.month, self.first_day
            )));
        }
        Ok(())
    }

    /// Zero-based index of the sub-run for `now`, or `None` outside the window
    pub fn sub_run_index(&self, now: DateTime<Utc>) -> Option<u32> {
        if now.month() == self.month && (self.first_day..=self.last_day).contains(&now.day()) {
            Some(now.day() - self.first_day)
        } else {
            None
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.sub_run_index(now).is_some()
    }

    /// Next midnight (UTC) strictly after `now` that falls inside the window
    pub fn next_trigger_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Feb 29 windows can skip up to eight years around century boundaries
        for year in now.year()..=now.year() + 9 {
            for day in self.first_day..=self.last_day {
                let Some(date) = NaiveDate::from_ymd_opt(year, self.month, day) else {
                    continue;
                };
                let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
                    continue;
                };
                let trigger = Utc.from_utc_datetime(&midnight);
                if trigger > now {
                    return Some(trigger);
                }
            }
        }
        None
    }
}

/// What the batch does after one account's unit fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFailurePolicy {
    /// Stop the run at the first failure
    #[default]
    Halt,
    /// Record the failure and move on to the next account
    Continue,
}

impl BatchFailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchFailurePolicy::Halt => "halt",
            BatchFailurePolicy::Continue => "continue",
        }
    }
}

impl std::fmt::Display for BatchFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "halt" => Ok(BatchFailurePolicy::Halt),
            "continue" => Ok(BatchFailurePolicy::Continue),
            other => Err(Error::config(format!(
                "unknown failure policy '{}', expected 'halt' or 'continue'",
                other
            ))),
        }
    }
}
