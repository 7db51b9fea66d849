//! Session authentication
//!
//! This module provides:
//! - JWT access/refresh token generation and validation
//! - The token issuer (login, renewal, verification)
//! - The authorization guard used by protected controllers
//! - REST API endpoints for auth operations

pub mod api;
pub mod guard;
pub mod jwt;
pub mod service;

pub use api::{AuthApiState, auth_api_router};
pub use guard::{Principal, RoleGuard, extract_bearer_token, require_roles};
pub use jwt::{AccessClaims, JwtConfig, JwtError, JwtService, RenewalClaims, TokenType};
pub use service::{AuthError, TokenIssuer};
