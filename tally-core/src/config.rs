//! Configuration management
//!
//! Settings live in `settings.json` inside the tally directory:
//! ```json
//! {
//!   "app": { "defaultCurrency": "INR" },
//!   "storage": { "unitTimeoutMs": 5000 },
//!   "interest": {
//!     "batchSize": 1000,
//!     "failurePolicy": "halt",
//!     "window": { "month": 1, "firstDay": 1, "lastDay": 7 },
//!     "rates": { "savings": "0.04", "checking": "0.01" }
//!   }
//! }
//! ```
//! Fields this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{BatchFailurePolicy, InterestRateTable, InterestSchedule, DEFAULT_CURRENCY};
use crate::services::interest::DEFAULT_BATCH_SIZE;

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_UNIT_TIMEOUT_MS: u64 = 5_000;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    storage: StorageSettings,
    #[serde(default)]
    interest: InterestSettingsFile,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default = "default_currency")]
    default_currency: String,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            other: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageSettings {
    #[serde(default = "default_unit_timeout_ms")]
    unit_timeout_ms: u64,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            unit_timeout_ms: DEFAULT_UNIT_TIMEOUT_MS,
            other: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterestSettingsFile {
    #[serde(default = "default_batch_size")]
    batch_size: i64,
    #[serde(default)]
    failure_policy: BatchFailurePolicy,
    #[serde(default)]
    window: InterestSchedule,
    #[serde(default = "default_rates")]
    rates: HashMap<String, Decimal>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for InterestSettingsFile {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            failure_policy: BatchFailurePolicy::default(),
            window: InterestSchedule::default(),
            rates: default_rates(),
            other: HashMap::new(),
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_unit_timeout_ms() -> u64 {
    DEFAULT_UNIT_TIMEOUT_MS
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

fn default_rates() -> HashMap<String, Decimal> {
    InterestRateTable::default().rates().clone()
}

/// Interest batch settings
#[derive(Debug, Clone, PartialEq)]
pub struct InterestSettings {
    pub batch_size: i64,
    pub failure_policy: BatchFailurePolicy,
    pub schedule: InterestSchedule,
    pub rates: HashMap<String, Decimal>,
}

/// Tally configuration (validated view of settings.json)
#[derive(Debug, Clone)]
pub struct Config {
    pub default_currency: String,
    pub unit_timeout_ms: u64,
    pub interest: InterestSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(&SettingsFile::default())
    }
}

impl Config {
    /// Load config from the tally directory
    ///
    /// Environment overrides:
    /// - `TALLY_INTEREST_FAILURE_POLICY` (`halt` | `continue`)
    /// - `TALLY_UNIT_TIMEOUT_MS`
    pub fn load(tally_dir: &Path) -> Result<Self> {
        Self::load_with_env(tally_dir, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with_env(tally_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(tally_dir)?;
        let mut config = Self::from_raw(&raw);

        if let Some(policy) = env("TALLY_INTEREST_FAILURE_POLICY") {
            config.interest.failure_policy = policy.parse()?;
        }
        if let Some(timeout) = env("TALLY_UNIT_TIMEOUT_MS") {
            config.unit_timeout_ms = timeout.trim().parse().map_err(|_| {
                Error::config(format!("TALLY_UNIT_TIMEOUT_MS must be milliseconds, got '{}'", timeout))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: &SettingsFile) -> Self {
        Self {
            default_currency: raw.app.default_currency.trim().to_uppercase(),
            unit_timeout_ms: raw.storage.unit_timeout_ms,
            interest: InterestSettings {
                batch_size: raw.interest.batch_size,
                failure_policy: raw.interest.failure_policy,
                schedule: raw.interest.window,
                rates: raw.interest.rates.clone(),
            },
        }
    }

    /// Check every value that can be set from outside
    pub fn validate(&self) -> Result<()> {
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(Error::config(format!(
                "defaultCurrency must be a 3-letter ISO code, got '{}'",
                self.default_currency
            )));
        }
        if self.interest.batch_size <= 0 {
            return Err(Error::config(format!(
                "interest batchSize must be positive, got {}",
                self.interest.batch_size
            )));
        }
        self.interest.schedule.validate()?;
        self.rate_table()?;
        Ok(())
    }

    /// The interest rate table handed to the batch
    pub fn rate_table(&self) -> Result<InterestRateTable> {
        InterestRateTable::new(self.interest.rates.clone())
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_millis(self.unit_timeout_ms)
    }

    /// Save config to the tally directory
    ///
    /// Preserves settings this crate does not manage.
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let mut settings = read_settings(tally_dir)?;

        settings.app.default_currency = self.default_currency.clone();
        settings.storage.unit_timeout_ms = self.unit_timeout_ms;
        settings.interest.batch_size = self.interest.batch_size;
        settings.interest.failure_policy = self.interest.failure_policy;
        settings.interest.window = self.interest.schedule;
        settings.interest.rates = self.interest.rates.clone();

        std::fs::create_dir_all(tally_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(tally_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }
}

fn read_settings(tally_dir: &Path) -> Result<SettingsFile> {
    let settings_path = tally_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("{}: {}", settings_path.display(), e)))
}
