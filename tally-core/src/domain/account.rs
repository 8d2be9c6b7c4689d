//! Account domain model

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::validate_opening_balance;
use super::result::{Error, Result};

/// Default ISO 4217 currency for new accounts
pub const DEFAULT_CURRENCY: &str = "INR";

/// A bank account owned by a single user
///
/// `account_type` is a free-form, lower-cased label ("savings", "checking",
/// ...) used to look up the yearly interest rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub account_type: String,
    /// ISO 4217 currency code, normalized to uppercase
    pub currency: String,
    pub balance: Decimal,
    pub last_interest_applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Normalize currency code to uppercase
    pub fn normalize_currency(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    /// Normalize account type to a trimmed lowercase label
    pub fn normalize_type(account_type: &str) -> String {
        account_type.trim().to_lowercase()
    }

    /// True when interest has not yet been applied in the calendar year of `now`
    pub fn is_interest_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.last_interest_applied_at {
            None => true,
            Some(applied) => applied < start_of_year(now),
        }
    }
}

/// Midnight UTC on January 1st of the year containing `now`
pub fn start_of_year(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Request to open a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub user_id: i64,
    pub account_type: String,
    pub currency: String,
    pub opening_balance: Decimal,
}

impl NewAccount {
    pub fn new(user_id: i64, account_type: impl Into<String>) -> Self {
        Self {
            user_id,
            account_type: account_type.into(),
            currency: DEFAULT_CURRENCY.to_string(),
            opening_balance: Decimal::ZERO,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_opening_balance(mut self, balance: Decimal) -> Self {
        self.opening_balance = balance;
        self
    }

    /// Validate and normalize the request
    pub fn validate(mut self) -> Result<Self> {
        self.account_type = Account::normalize_type(&self.account_type);
        if self.account_type.is_empty() {
            return Err(Error::validation("account type cannot be empty"));
        }
        self.currency = Account::normalize_currency(&self.currency);
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::validation(format!(
                "currency must be a 3-letter ISO code, got '{}'",
                self.currency
            )));
        }
        self.opening_balance = validate_opening_balance(self.opening_balance)?;
        Ok(self)
    }
}
