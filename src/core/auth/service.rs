//! Token issuer
//!
//! Turns verified credentials into a session and a valid refresh token into a fresh
//! session. Holds no per-session state: every call is a single verdict computed from
//! the token signature and the account store.
//!
//! Refresh tokens are not revoked on rotation. An older refresh token from the same
//! lineage stays redeemable until it expires naturally.

use std::sync::Arc;

use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService};
use crate::core::db::{Account, StoreError, UserStore};
use crate::core::protocol::{AuthUser, LoginResponse, TokenPair, VerifyResponse};

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRenewalToken,

    #[error("Account unavailable")]
    AccountUnavailable,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient role")]
    Forbidden,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired | JwtError::InvalidToken | JwtError::InvalidTokenType => {
                AuthError::InvalidToken
            }
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Token issuer over an account store
pub struct TokenIssuer<S> {
    store: Arc<S>,
    jwt_service: JwtService,
}

impl<S> Clone for TokenIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            jwt_service: self.jwt_service.clone(),
        }
    }
}

impl<S: UserStore> TokenIssuer<S> {
    /// Create a new token issuer
    pub fn new(store: Arc<S>, jwt_service: JwtService) -> Self {
        Self { store, jwt_service }
    }

    /// JWT codec used by this issuer
    pub fn jwt(&self) -> &JwtService {
        &self.jwt_service
    }

    /// Account store used by this issuer
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Check credentials against an active account
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let account = self
            .store
            .find_by_email(email)
            .await?
            .filter(|account| account.is_active)
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.store.verify_password(&account, password).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Mint an access/refresh pair for an account
    pub fn issue_session(&self, account: &Account) -> Result<TokenPair, AuthError> {
        let tokens = self
            .jwt_service
            .issue_pair(account.id, &account.email, account.role)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;

        Ok(tokens)
    }

    /// Authenticate and open a session
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let account = match self.authenticate(email, password).await {
            Ok(account) => account,
            Err(err) => {
                tracing::info!("Login rejected for {}: {}", email, err);
                return Err(err);
            }
        };

        let tokens = self.issue_session(&account)?;
        tracing::info!("Session issued for account {}", account.id);

        Ok(LoginResponse {
            tokens,
            user: account.into(),
        })
    }

    /// Exchange a refresh token for a new pair
    pub async fn renew(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let account_id = self
            .jwt_service
            .validate_renewal(refresh_token)
            .and_then(|claims| claims.account_id())
            .map_err(|err| {
                tracing::debug!("Refresh token rejected: {}", err);
                AuthError::InvalidRenewalToken
            })?;

        let account = self.active_account(account_id).await?;
        let tokens = self.issue_session(&account)?;

        tracing::debug!("Session rotated for account {}", account.id);
        Ok(tokens)
    }

    /// Best-effort access token check. Never fails.
    pub async fn verify(&self, access_token: &str) -> VerifyResponse {
        let claims = match self.jwt_service.validate_access(access_token) {
            Ok(claims) => claims,
            Err(err) => return VerifyResponse::invalid(err.to_string()),
        };

        let Ok(account_id) = claims.account_id() else {
            return VerifyResponse::invalid(JwtError::InvalidToken.to_string());
        };

        match self.active_account(account_id).await {
            Ok(account) => VerifyResponse::valid(account.into()),
            Err(err) => VerifyResponse::invalid(err.to_string()),
        }
    }

    /// Current account of an authenticated principal
    pub async fn profile(&self, account_id: Uuid) -> Result<AuthUser, AuthError> {
        Ok(self.active_account(account_id).await?.into())
    }

    async fn active_account(&self, account_id: Uuid) -> Result<Account, AuthError> {
        self.store
            .find_by_id(account_id)
            .await?
            .filter(|account| account.is_active)
            .ok_or(AuthError::AccountUnavailable)
    }
}
