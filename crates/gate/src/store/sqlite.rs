use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tracing::debug,
};

use super::{AccountStore, stamp};
use crate::{
    account::{Account, AccountId, Field},
    clock::{Clock, SystemClock},
    error::StoreError,
};

/// SQLite-backed account store.
///
/// Timestamps are stored as epoch milliseconds; uniqueness of email and both
/// tokens is left to the table's UNIQUE constraints.
pub struct SqliteAccountStore {
    pool: sqlx::SqlitePool,
    clock: Arc<dyn Clock>,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    email: String,
    confirmation_token: Option<String>,
    confirmed_at: Option<i64>,
    confirmation_sent_at: Option<i64>,
    approval_token: Option<String>,
    is_approved: i32,
    approval_sent_at: Option<i64>,
    lock_version: i64,
    created_at: i64,
    updated_at: i64,
}

fn from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn to_ms(at: Option<DateTime<Utc>>) -> Option<i64> {
    at.map(|t| t.timestamp_millis())
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Self {
            id: Some(AccountId(r.id)),
            email: r.email,
            confirmation_token: r.confirmation_token,
            confirmed_at: from_ms(r.confirmed_at),
            confirmation_sent_at: from_ms(r.confirmation_sent_at),
            approval_token: r.approval_token,
            is_approved: r.is_approved != 0,
            approval_sent_at: from_ms(r.approval_sent_at),
            lock_version: r.lock_version as u64,
            created_at: from_ms(Some(r.created_at)),
            updated_at: from_ms(Some(r.updated_at)),
            ..Self::default()
        }
    }
}

/// Map a UNIQUE violation onto the column it hit.
fn translate(e: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        let message = db.message();
        let field = if message.contains("accounts.confirmation_token") {
            Field::ConfirmationToken
        } else if message.contains("accounts.approval_token") {
            Field::ApprovalToken
        } else {
            Field::Email
        };
        return StoreError::DuplicateValue(field).into();
    }
    e.into()
}

impl SqliteAccountStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Stamp `created_at`/`updated_at` from `clock`; pass the gate's clock so
    /// both agree.
    pub fn with_clock(pool: sqlx::SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Create the `accounts` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS accounts (
                id                   INTEGER PRIMARY KEY AUTOINCREMENT,
                email                TEXT NOT NULL UNIQUE,
                confirmation_token   TEXT UNIQUE,
                confirmed_at         INTEGER,
                confirmation_sent_at INTEGER,
                approval_token       TEXT UNIQUE,
                is_approved          INTEGER NOT NULL DEFAULT 0,
                approval_sent_at     INTEGER,
                lock_version         INTEGER NOT NULL DEFAULT 0,
                created_at           INTEGER NOT NULL,
                updated_at           INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, account: &mut Account) -> anyhow::Result<()> {
        let created_at = to_ms(account.created_at).unwrap_or_default();
        let result = sqlx::query(
            r#"INSERT INTO accounts (
                 email, confirmation_token, confirmed_at, confirmation_sent_at,
                 approval_token, is_approved, approval_sent_at, lock_version,
                 created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&account.email)
        .bind(&account.confirmation_token)
        .bind(to_ms(account.confirmed_at))
        .bind(to_ms(account.confirmation_sent_at))
        .bind(&account.approval_token)
        .bind(account.is_approved as i32)
        .bind(to_ms(account.approval_sent_at))
        .bind(account.lock_version as i64)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(translate)?;

        account.id = Some(AccountId(result.last_insert_rowid()));
        debug!(account_id = result.last_insert_rowid(), "accounts.insert");
        Ok(())
    }

    async fn update(&self, id: AccountId, account: &mut Account) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"UPDATE accounts SET
                 email = ?, confirmation_token = ?, confirmed_at = ?,
                 confirmation_sent_at = ?, approval_token = ?, is_approved = ?,
                 approval_sent_at = ?, updated_at = ?,
                 lock_version = lock_version + 1
               WHERE id = ? AND lock_version = ?"#,
        )
        .bind(&account.email)
        .bind(&account.confirmation_token)
        .bind(to_ms(account.confirmed_at))
        .bind(to_ms(account.confirmation_sent_at))
        .bind(&account.approval_token)
        .bind(account.is_approved as i32)
        .bind(to_ms(account.approval_sent_at))
        .bind(to_ms(account.updated_at))
        .bind(id.0)
        .bind(account.lock_version as i64)
        .execute(&self.pool)
        .await
        .map_err(translate)?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM accounts WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::StaleAccount {
                    id,
                    expected: account.lock_version,
                },
                None => StoreError::UnknownAccount(id),
            }
            .into());
        }

        account.lock_version += 1;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find_by_field(&self, field: Field, value: &str) -> anyhow::Result<Option<Account>> {
        let sql = match field {
            Field::Email => "SELECT * FROM accounts WHERE email = ?",
            Field::ConfirmationToken => "SELECT * FROM accounts WHERE confirmation_token = ?",
            Field::ApprovalToken => "SELECT * FROM accounts WHERE approval_token = ?",
        };
        let row = sqlx::query_as::<_, AccountRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn save(&self, account: &mut Account, validate: bool) -> anyhow::Result<bool> {
        if validate && !account.validate() {
            return Ok(false);
        }

        // Millisecond precision, so the instance matches what a reload returns.
        let now = self.clock.now();
        let now = from_ms(Some(now.timestamp_millis())).unwrap_or(now);

        let mut staged = account.clone();
        stamp(&mut staged, now);
        match staged.id {
            Some(id) => self.update(id, &mut staged).await?,
            None => self.insert(&mut staged).await?,
        }
        *account = staged;
        Ok(true)
    }
}
