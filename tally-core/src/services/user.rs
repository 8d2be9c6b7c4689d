//! User service - registration and credential checks

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::domain::{Registration, User};
use crate::ports::Repository;

const BAD_CREDENTIALS: &str = "invalid username or password";

/// User service
pub struct UserService<R: Repository = DuckDbRepository> {
    repository: Arc<R>,
}

impl<R: Repository> UserService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Register a new user
    ///
    /// Username and email must both be unused.
    pub fn register(&self, registration: Registration) -> Result<User> {
        let registration = registration.validate()?;
        let password_hash = hash_password(&registration.password)?;

        self.repository.atomically(|uow| {
            if uow.user_exists(&registration.username, &registration.email)? {
                return Err(Error::validation("username or email is already registered"));
            }
            uow.insert_user(&registration, &password_hash, Utc::now())
        })
    }

    /// Check credentials and return the user
    pub fn login(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .repository
            .read(|uow| uow.find_user_by_username(username.trim()))?
            .ok_or_else(|| Error::Unauthorized(BAD_CREDENTIALS.to_string()))?;

        if !verify_password(password, &user.password_hash) {
            return Err(Error::Unauthorized(BAD_CREDENTIALS.to_string()));
        }
        Ok(user)
    }

    pub fn get(&self, user_id: i64) -> Result<User> {
        self.repository
            .read(|uow| uow.find_user(user_id))?
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }

    pub fn find_by_username(&self, username: &str) -> Result<User> {
        self.repository
            .read(|uow| uow.find_user_by_username(username.trim()))?
            .ok_or_else(|| Error::not_found(format!("user '{}'", username.trim())))
    }
}

/// Argon2id PHC string with a random 16-byte salt
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Other(format!("password hashing failed: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
