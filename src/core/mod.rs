//! Wire contract shared with the client, plus the server side (`ssr`): token
//! issuing and account persistence

pub mod protocol;

#[cfg(feature = "ssr")]
pub mod auth;
#[cfg(feature = "ssr")]
pub mod config;
#[cfg(feature = "ssr")]
pub mod db;

pub use protocol::*;
