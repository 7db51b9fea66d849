//! Account lookup seam used by the token issuer
//!
//! `UserStore` is the only way the auth core reaches persistence. The PostgreSQL
//! implementation lives in `repositories::user`; `InMemoryUserStore` backs development
//! servers without a database and the test suites.

use std::future::Future;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::core::db::models::Account;
use crate::core::protocol::Role;

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const BCRYPT_COST: u32 = 12;

/// User store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Corrupt account record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Read access to accounts
pub trait UserStore: Send + Sync + 'static {
    /// Find an account by email
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// Find an account by ID
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// Check a plain text password against the account's hash.
    ///
    /// bcrypt runs on the blocking pool.
    fn verify_password(
        &self,
        account: &Account,
        password: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        let hash = account.password_hash.clone();
        let password = password.to_string();
        async move {
            tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                .await
                .map_err(|e| StoreError::HashingError(e.to_string()))?
        }
    }
}

/// Hash a password using bcrypt with automatic salt generation
pub fn hash_password(password: &str, cost: u32) -> Result<String, StoreError> {
    bcrypt::hash(password, cost).map_err(|e| StoreError::HashingError(e.to_string()))
}

/// Verify a password against a bcrypt hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    bcrypt::verify(password, hash).map_err(|e| StoreError::HashingError(e.to_string()))
}

/// Account store held in process memory
#[derive(Default)]
pub struct InMemoryUserStore {
    accounts: DashMap<Uuid, Account>,
    by_email: DashMap<String, Uuid>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account, enforcing email uniqueness
    pub fn insert(&self, account: Account) -> Result<Account, StoreError> {
        let email = account.email.to_lowercase();
        match self.by_email.entry(email) {
            Entry::Occupied(_) => Err(StoreError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(account.id);
                self.accounts.insert(account.id, account.clone());
                Ok(account)
            }
        }
    }

    /// Hash `password` with `cost` and insert a new active account
    pub fn create(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: Role,
        cost: u32,
    ) -> Result<Account, StoreError> {
        let hash = hash_password(password, cost)?;
        self.insert(Account::new(email, name, hash, role))
    }

    /// Flip the active flag of an existing account
    pub fn set_active(&self, id: Uuid, active: bool) -> bool {
        match self.accounts.get_mut(&id) {
            Some(mut account) => {
                account.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Remove an account entirely
    pub fn remove(&self, id: Uuid) -> Option<Account> {
        let (_, account) = self.accounts.remove(&id)?;
        self.by_email.remove(&account.email.to_lowercase());
        Some(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let Some(id) = self.by_email.get(&email.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }
}
