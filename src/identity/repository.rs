//! User account repositories: Postgres-backed for the server, in-memory for
//! tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::Instrument;

use super::{UserAccount, UserStatus};

/// Fields supplied when creating an account. The id and the bookkeeping
/// timestamps are assigned by the repository.
#[derive(Clone, Debug)]
pub struct NewUserAccount {
    pub email: String,
    pub password_hash: Option<String>,
    pub status: UserStatus,
    pub is_admin: bool,
    pub one_time_password_set_token: Option<String>,
    pub one_time_password_set_token_generated_at: Option<DateTime<Utc>>,
}

/// Outcome of an insert attempt; duplicate emails are a conflict, not an
/// error.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(UserAccount),
    Conflict,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>>;
    async fn list(&self, email: Option<&str>) -> Result<Vec<UserAccount>>;
    async fn insert(&self, account: NewUserAccount) -> Result<InsertOutcome>;
    async fn save(&self, account: &UserAccount) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

/// Postgres-backed repository.
#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "id, email, password_hash, status, is_admin, \
     unsuccessful_login_attempts, one_time_password_set_token, \
     one_time_password_set_token_generated_at, last_logged_in, created, updated";

fn account_from_row(row: &PgRow) -> Result<UserAccount> {
    let status: String = row.get("status");

    Ok(UserAccount {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        status: status.parse()?,
        is_admin: row.get("is_admin"),
        unsuccessful_login_attempts: row
            .get::<Option<i32>, _>("unsuccessful_login_attempts")
            .unwrap_or(0),
        one_time_password_set_token: row.get("one_time_password_set_token"),
        one_time_password_set_token_generated_at: row
            .get("one_time_password_set_token_generated_at"),
        last_logged_in: row.get("last_logged_in"),
        created: row.get("created"),
        updated: row.get("updated"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn list(&self, email: Option<&str>) -> Result<Vec<UserAccount>> {
        let rows = if let Some(email) = email {
            let query =
                format!("SELECT {SELECT_COLUMNS} FROM users WHERE email = $1 ORDER BY id ASC");
            sqlx::query(&query).bind(email).fetch_all(&self.pool).await
        } else {
            let query = format!("SELECT {SELECT_COLUMNS} FROM users ORDER BY id ASC");
            sqlx::query(&query).fetch_all(&self.pool).await
        }
        .context("failed to list users")?;

        rows.iter().map(account_from_row).collect()
    }

    async fn insert(&self, account: NewUserAccount) -> Result<InsertOutcome> {
        let query = format!(
            "INSERT INTO users \
                 (email, password_hash, status, is_admin, \
                  one_time_password_set_token, one_time_password_set_token_generated_at, \
                  created) \
             VALUES ($1, $2, $3, $4, $5, $6, now()) \
             RETURNING {SELECT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let row = sqlx::query(&query)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.status.as_str())
            .bind(account.is_admin)
            .bind(&account.one_time_password_set_token)
            .bind(account.one_time_password_set_token_generated_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Created(account_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn save(&self, account: &UserAccount) -> Result<()> {
        let query = "UPDATE users SET \
                 email = $2, password_hash = $3, status = $4, is_admin = $5, \
                 unsuccessful_login_attempts = $6, one_time_password_set_token = $7, \
                 one_time_password_set_token_generated_at = $8, last_logged_in = $9, \
                 updated = now() \
             WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.status.as_str())
            .bind(account.is_admin)
            .bind(account.unsuccessful_login_attempts)
            .bind(&account.one_time_password_set_token)
            .bind(account.one_time_password_set_token_generated_at)
            .bind(account.last_logged_in)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save user")?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user")?;

        Ok(())
    }
}

/// In-memory repository used by unit tests.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    accounts: RwLock<HashMap<i64, UserAccount>>,
    next_id: AtomicI64,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn list(&self, email: Option<&str>) -> Result<Vec<UserAccount>> {
        let accounts = self.accounts.read().await;
        let mut result: Vec<UserAccount> = accounts
            .values()
            .filter(|a| email.is_none_or(|email| a.email == email))
            .cloned()
            .collect();
        result.sort_by_key(|a| a.id);
        Ok(result)
    }

    async fn insert(&self, account: NewUserAccount) -> Result<InsertOutcome> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Ok(InsertOutcome::Conflict);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = UserAccount {
            id,
            email: account.email,
            password_hash: account.password_hash,
            status: account.status,
            is_admin: account.is_admin,
            unsuccessful_login_attempts: 0,
            one_time_password_set_token: account.one_time_password_set_token,
            one_time_password_set_token_generated_at: account
                .one_time_password_set_token_generated_at,
            last_logged_in: None,
            created: Some(Utc::now()),
            updated: None,
        };
        accounts.insert(id, created.clone());

        Ok(InsertOutcome::Created(created))
    }

    async fn save(&self, account: &UserAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let mut updated = account.clone();
        updated.updated = Some(Utc::now());
        accounts.insert(account.id, updated);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.remove(&id);
        Ok(())
    }
}
