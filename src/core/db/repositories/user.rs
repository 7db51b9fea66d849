//! PostgreSQL-backed account store
//!
//! Reads accounts from the `accounts` table. Passwords are bcrypt hashes; the
//! auth core never sees plain text outside `verify_password`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{Account, AccountRow};
use crate::core::db::store::{BCRYPT_COST, StoreError, UserStore, hash_password};
use crate::core::protocol::Role;

/// Account repository for database operations
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_account(row: AccountRow) -> Result<Account, StoreError> {
        Account::try_from(row).map_err(StoreError::CorruptRecord)
    }

    /// Create an account with a plain text password (will be hashed)
    pub async fn create(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
    ) -> Result<Account, StoreError> {
        if self.find_by_email(email).await?.is_some() {
            return Err(StoreError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password, BCRYPT_COST)?;

        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (email, name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, name, password_hash, role, is_active, created_at
            "#,
        )
        .bind(email)
        .bind(name)
        .bind(&password_hash)
        .bind(role.to_string())
        .fetch_one(&self.pool)
        .await?;

        Self::into_account(row)
    }

    /// Count accounts
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}

impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, created_at
            FROM accounts
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::into_account).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::into_account).transpose()
    }
}
