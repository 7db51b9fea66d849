//! CRM session authentication
//!
//! Server side (`ssr` feature): the token issuer behind `/auth/*` and the role
//! guard for protected controllers.
//! Client side: the session gateway, which attaches access tokens to every call
//! and renews the session transparently when the access token is rejected.

pub mod client;
pub mod core;
