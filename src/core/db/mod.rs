//! Account persistence
//!
//! The auth core depends only on the `UserStore` trait. PostgreSQL (SQLx) and
//! in-memory implementations are provided.

pub mod models;
pub mod pool;
pub mod repositories;
pub mod store;

pub use models::{Account, AccountRow};
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use repositories::PgUserStore;
pub use store::{BCRYPT_COST, InMemoryUserStore, StoreError, UserStore, hash_password};

pub use sqlx::PgPool;
