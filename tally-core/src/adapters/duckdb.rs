//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use duckdb::{params, Connection, ToSql};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, NewAccount, NewTransaction, Page, Registration, Transaction, TransactionKind, User,
};
use crate::ports::{BalanceMismatch, Repository, UnitOfWork};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Default bound on a single unit of work
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_millis(5_000);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const USER_COLUMNS: &str = "user_id, username, email, password_hash, role,
    strftime(created_at, '%Y-%m-%d %H:%M:%S.%f'),
    strftime(updated_at, '%Y-%m-%d %H:%M:%S.%f')";

const ACCOUNT_COLUMNS: &str = "account_id, user_id, account_type, currency,
    CAST(balance AS VARCHAR),
    strftime(last_interest_applied_at, '%Y-%m-%d %H:%M:%S.%f'),
    strftime(created_at, '%Y-%m-%d %H:%M:%S.%f'),
    strftime(updated_at, '%Y-%m-%d %H:%M:%S.%f')";

const TRANSACTION_COLUMNS: &str = "transaction_id, from_account_id, to_account_id,
    CAST(amount AS VARCHAR), kind, description,
    strftime(created_at, '%Y-%m-%d %H:%M:%S.%f')";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
}

/// Check if an error message reports a UNIQUE/PRIMARY KEY violation
fn is_unique_violation(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("duplicate key") || lower.contains("violates unique constraint")
}

/// DuckDB repository implementation
///
/// One connection behind a mutex. A unit of work holds the lock for its whole
/// lifetime, so units never interleave.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    unit_timeout: Duration,
}

impl DuckDbRepository {
    /// Open (or create) the ledger database at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        unit_timeout: DEFAULT_UNIT_TIMEOUT,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[tally] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// In-memory database, mostly for tests and dry runs
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Bound every unit of work by `timeout`
    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn unit_timeout(&self) -> Duration {
        self.unit_timeout
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.lock();
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Acquire the connection.
    ///
    /// A poisoned lock is recovered: the unit that panicked rolled back its
    /// transaction while unwinding, so the connection is consistent.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for DuckDbRepository {
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T>,
    {
        let mut conn = self.lock();
        let uow = DuckDbUnitOfWork::begin(&mut conn, Some(self.unit_timeout))?;
        match f(&uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(err) => {
                uow.rollback();
                Err(err)
            }
        }
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn UnitOfWork) -> Result<T>,
    {
        let mut conn = self.lock();
        let uow = DuckDbUnitOfWork::begin(&mut conn, None)?;
        // Read scopes never write; dropping the unit rolls it back
        f(&uow)
    }
}

/// One open DuckDB transaction plus its deadline
pub struct DuckDbUnitOfWork<'conn> {
    tx: duckdb::Transaction<'conn>,
    started: Instant,
    timeout: Option<Duration>,
}

impl<'conn> DuckDbUnitOfWork<'conn> {
    fn begin(conn: &'conn mut Connection, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            tx: conn.transaction()?,
            started: Instant::now(),
            timeout,
        })
    }

    fn check_deadline(&self) -> Result<()> {
        match self.timeout {
            Some(limit) if self.started.elapsed() >= limit => {
                Err(Error::Timeout(limit.as_millis() as u64))
            }
            _ => Ok(()),
        }
    }

    fn commit(self) -> Result<()> {
        // An elapsed unit is dropped here, which rolls it back
        self.check_deadline()?;
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) {
        if let Err(e) = self.tx.rollback() {
            eprintln!("[tally] Rollback failed: {}", e);
        }
    }

    fn next_id(&self, sequence: &str) -> Result<i64> {
        let id = self
            .tx
            .query_row(&format!("SELECT nextval('{}')", sequence), [], |row| row.get(0))?;
        Ok(id)
    }

    fn query_users(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<User>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    password_hash: row.get(3)?,
                    role: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(User::try_from).collect()
    }

    fn query_accounts(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Account>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(AccountRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    account_type: row.get(2)?,
                    currency: row.get(3)?,
                    balance: row.get(4)?,
                    last_interest_applied_at: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(Account::try_from).collect()
    }

    fn query_transactions(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Transaction>> {
        let mut stmt = self.tx.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(TransactionRow {
                    id: row.get(0)?,
                    from_account_id: row.get(1)?,
                    to_account_id: row.get(2)?,
                    amount: row.get(3)?,
                    kind: row.get(4)?,
                    description: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    fn query_ids(&self, sql: &str) -> Result<Vec<i64>> {
        let mut stmt = self.tx.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

impl UnitOfWork for DuckDbUnitOfWork<'_> {
    // === Users ===

    fn insert_user(
        &self,
        registration: &Registration,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        self.check_deadline()?;
        let now = now.trunc_subsecs(6);
        let id = self.next_id("seq_users")?;
        let ts = format_timestamp(&now);
        self.tx
            .execute(
                "INSERT INTO sys_users (user_id, username, email, password_hash, role, created_at, updated_at)
                 VALUES (?, ?, ?, ?, 'user', CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![id, registration.username, registration.email, password_hash, ts, ts],
            )
            .map_err(|e| {
                // A concurrent registration can win between the existence check and here
                if is_unique_violation(&e.to_string()) {
                    Error::validation("username or email is already registered")
                } else {
                    Error::from(e)
                }
            })?;
        Ok(User {
            id,
            username: registration.username.clone(),
            email: registration.email.clone(),
            password_hash: password_hash.to_string(),
            role: "user".to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        self.check_deadline()?;
        let sql = format!("SELECT {} FROM sys_users WHERE user_id = ?", USER_COLUMNS);
        Ok(self.query_users(&sql, params![user_id])?.into_iter().next())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.check_deadline()?;
        let sql = format!("SELECT {} FROM sys_users WHERE username = ?", USER_COLUMNS);
        Ok(self.query_users(&sql, params![username])?.into_iter().next())
    }

    fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        self.check_deadline()?;
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM sys_users WHERE username = ? OR email = ?",
            params![username, email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // === Accounts ===

    fn insert_account(&self, account: &NewAccount, now: DateTime<Utc>) -> Result<Account> {
        self.check_deadline()?;
        let now = now.trunc_subsecs(6);
        let id = self.next_id("seq_accounts")?;
        let ts = format_timestamp(&now);
        self.tx.execute(
            "INSERT INTO sys_accounts (account_id, user_id, account_type, currency, balance,
                                       last_interest_applied_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18, 4)), NULL,
                     CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
            params![
                id,
                account.user_id,
                account.account_type,
                account.currency,
                account.opening_balance.to_string(),
                ts,
                ts,
            ],
        )?;
        Ok(Account {
            id,
            user_id: account.user_id,
            account_type: account.account_type.clone(),
            currency: account.currency.clone(),
            balance: account.opening_balance,
            last_interest_applied_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn find_account(&self, account_id: i64) -> Result<Option<Account>> {
        self.check_deadline()?;
        let sql = format!("SELECT {} FROM sys_accounts WHERE account_id = ?", ACCOUNT_COLUMNS);
        Ok(self.query_accounts(&sql, params![account_id])?.into_iter().next())
    }

    fn account_belongs_to(&self, account_id: i64, user_id: i64) -> Result<bool> {
        self.check_deadline()?;
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM sys_accounts WHERE account_id = ? AND user_id = ?",
            params![account_id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>> {
        self.check_deadline()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts WHERE user_id = ? ORDER BY account_id",
            ACCOUNT_COLUMNS
        );
        self.query_accounts(&sql, params![user_id])
    }

    fn debit_if_sufficient(
        &self,
        account_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_deadline()?;
        let amount = amount.to_string();
        // The balance is re-checked by the same statement that writes it
        let changed = self.tx.execute(
            "UPDATE sys_accounts
             SET balance = balance - CAST(? AS DECIMAL(18, 4)),
                 updated_at = CAST(? AS TIMESTAMP)
             WHERE account_id = ? AND balance >= CAST(? AS DECIMAL(18, 4))",
            params![amount, format_timestamp(&now), account_id, amount],
        )?;
        Ok(changed == 1)
    }

    fn credit(&self, account_id: i64, amount: Decimal, now: DateTime<Utc>) -> Result<bool> {
        self.check_deadline()?;
        let changed = self.tx.execute(
            "UPDATE sys_accounts
             SET balance = balance + CAST(? AS DECIMAL(18, 4)),
                 updated_at = CAST(? AS TIMESTAMP)
             WHERE account_id = ?",
            params![amount.to_string(), format_timestamp(&now), account_id],
        )?;
        Ok(changed == 1)
    }

    fn interest_candidates(
        &self,
        year_start: DateTime<Utc>,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Account>> {
        self.check_deadline()?;
        let sql = format!(
            "SELECT {} FROM sys_accounts
             WHERE (last_interest_applied_at IS NULL
                    OR last_interest_applied_at < CAST(? AS TIMESTAMP))
               AND account_id > ?
             ORDER BY account_id
             LIMIT ?",
            ACCOUNT_COLUMNS
        );
        self.query_accounts(&sql, params![format_timestamp(&year_start), after_id, limit])
    }

    fn apply_interest_if_eligible(
        &self,
        account_id: i64,
        interest: Decimal,
        year_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_deadline()?;
        let ts = format_timestamp(&now);
        let changed = self.tx.execute(
            "UPDATE sys_accounts
             SET balance = balance + CAST(? AS DECIMAL(18, 4)),
                 last_interest_applied_at = CAST(? AS TIMESTAMP),
                 updated_at = CAST(? AS TIMESTAMP)
             WHERE account_id = ?
               AND (last_interest_applied_at IS NULL
                    OR last_interest_applied_at < CAST(? AS TIMESTAMP))",
            params![
                interest.to_string(),
                ts,
                ts,
                account_id,
                format_timestamp(&year_start),
            ],
        )?;
        Ok(changed == 1)
    }

    // === Ledger ===

    fn append_transaction(
        &self,
        entry: &NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.check_deadline()?;
        let now = now.trunc_subsecs(6);
        let id = self.next_id("seq_transactions")?;
        self.tx.execute(
            "INSERT INTO sys_transactions (transaction_id, from_account_id, to_account_id,
                                           amount, kind, description, created_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18, 4)), ?, ?, CAST(? AS TIMESTAMP))",
            params![
                id,
                entry.from_account_id,
                entry.to_account_id,
                entry.amount.to_string(),
                entry.kind.as_str(),
                entry.description,
                format_timestamp(&now),
            ],
        )?;
        Ok(Transaction {
            id,
            from_account_id: entry.from_account_id,
            to_account_id: entry.to_account_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description.clone(),
            created_at: now,
        })
    }

    fn find_transaction(&self, transaction_id: i64) -> Result<Option<Transaction>> {
        self.check_deadline()?;
        let sql = format!(
            "SELECT {} FROM sys_transactions WHERE transaction_id = ?",
            TRANSACTION_COLUMNS
        );
        Ok(self.query_transactions(&sql, params![transaction_id])?.into_iter().next())
    }

    fn transactions_for_account(&self, account_id: i64, page: Page) -> Result<Vec<Transaction>> {
        self.check_deadline()?;
        let sql = format!(
            "SELECT {} FROM sys_transactions
             WHERE from_account_id = ? OR to_account_id = ?
             ORDER BY created_at DESC, transaction_id DESC
             LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        );
        self.query_transactions(
            &sql,
            params![account_id, account_id, page.limit(), page.offset()],
        )
    }

    // === Health checks ===

    fn balance_mismatches(&self) -> Result<Vec<BalanceMismatch>> {
        self.check_deadline()?;
        let mut stmt = self.tx.prepare(
            "WITH credits AS (
                 SELECT to_account_id AS account_id, SUM(amount) AS total
                 FROM sys_transactions WHERE to_account_id IS NOT NULL
                 GROUP BY to_account_id
             ), debits AS (
                 SELECT from_account_id AS account_id, SUM(amount) AS total
                 FROM sys_transactions WHERE from_account_id IS NOT NULL
                 GROUP BY from_account_id
             ), ledger AS (
                 SELECT a.account_id, a.balance,
                        COALESCE(c.total, 0) - COALESCE(d.total, 0) AS ledger_balance
                 FROM sys_accounts a
                 LEFT JOIN credits c ON c.account_id = a.account_id
                 LEFT JOIN debits d ON d.account_id = a.account_id
             )
             SELECT account_id, CAST(balance AS VARCHAR), CAST(ledger_balance AS VARCHAR)
             FROM ledger
             WHERE balance <> ledger_balance
             ORDER BY account_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(account_id, stored, ledger)| {
                Ok(BalanceMismatch {
                    account_id,
                    stored_balance: parse_decimal(&stored)?,
                    ledger_balance: parse_decimal(&ledger)?,
                })
            })
            .collect()
    }

    fn orphaned_transactions(&self) -> Result<Vec<i64>> {
        self.check_deadline()?;
        self.query_ids(
            "SELECT t.transaction_id FROM sys_transactions t
             WHERE (t.from_account_id IS NOT NULL AND NOT EXISTS (
                        SELECT 1 FROM sys_accounts a WHERE a.account_id = t.from_account_id))
                OR (t.to_account_id IS NOT NULL AND NOT EXISTS (
                        SELECT 1 FROM sys_accounts a WHERE a.account_id = t.to_account_id))
             ORDER BY t.transaction_id",
        )
    }

    fn malformed_transactions(&self) -> Result<Vec<i64>> {
        self.check_deadline()?;
        self.query_ids(
            "SELECT transaction_id FROM sys_transactions
             WHERE NOT (
                 (kind = 'transfer' AND from_account_id IS NOT NULL AND to_account_id IS NOT NULL
                      AND from_account_id <> to_account_id)
                 OR (kind = 'withdraw' AND from_account_id IS NOT NULL AND to_account_id IS NULL)
                 OR (kind IN ('deposit', 'interest') AND from_account_id IS NULL
                      AND to_account_id IS NOT NULL)
             )
             ORDER BY transaction_id",
        )
    }
}

// Raw rows as read from DuckDB, before decimal/timestamp parsing

struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

struct AccountRow {
    id: i64,
    user_id: i64,
    account_type: String,
    currency: String,
    balance: String,
    last_interest_applied_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: row.id,
            user_id: row.user_id,
            account_type: row.account_type,
            currency: row.currency,
            balance: parse_decimal(&row.balance)?,
            last_interest_applied_at: row
                .last_interest_applied_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

struct TransactionRow {
    id: i64,
    from_account_id: Option<i64>,
    to_account_id: Option<i64>,
    amount: String,
    kind: String,
    description: String,
    created_at: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: row.id,
            from_account_id: row.from_account_id,
            to_account_id: row.to_account_id,
            amount: parse_decimal(&row.amount)?,
            kind: TransactionKind::from_str(&row.kind)
                .map_err(|_| Error::database(format!("unknown ledger kind '{}'", row.kind)))?,
            description: row.description,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

// Helper functions

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim())
        .map_err(|e| Error::database(format!("invalid decimal '{}': {}", s, e)))
}
