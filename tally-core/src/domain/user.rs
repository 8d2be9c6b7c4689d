//! User domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

pub const MIN_PASSWORD_LEN: usize = 8;

/// A registered user
///
/// The password hash never leaves the storage adapter in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate and normalize: trimmed username, lowercase email
    pub fn validate(mut self) -> Result<Self> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();

        if self.username.is_empty() {
            return Err(Error::validation("username cannot be empty"));
        }
        if self.email.is_empty() || !self.email.contains('@') {
            return Err(Error::validation("a valid email address is required"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(self)
    }
}
