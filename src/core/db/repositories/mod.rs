//! Database repositories for CRM persistence
//!
//! Repositories encapsulate SQL access and expose it through the store traits
//! the auth core depends on.

pub mod user;

pub use user::PgUserStore;
