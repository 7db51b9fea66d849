//! Signed session tokens
//!
//! Both token kinds are HS256 JWTs sharing one secret. An access token names the
//! principal (id, email, role) and lives for an hour; a refresh token names only
//! the account and lives for a week. Every token gets a fresh `jti`, so two tokens
//! minted in the same second still differ. Nothing is recorded server-side.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::protocol::{BEARER, Role, TokenPair};

const DEFAULT_ACCESS_MINUTES: i64 = 60;
const DEFAULT_REFRESH_DAYS: i64 = 7;
const DEFAULT_ISSUER: &str = "crm";

/// Signing secret and token lifetimes
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Expected `iss` claim
    pub issuer: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_DAYS),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Read JWT_SECRET (required), JWT_ACCESS_EXPIRATION_MINUTES,
    /// JWT_REFRESH_EXPIRATION_DAYS and JWT_ISSUER
    pub fn from_env() -> Result<Self, JwtError> {
        fn number(key: &str) -> Option<i64> {
            std::env::var(key).ok()?.parse().ok()
        }

        let secret = std::env::var("JWT_SECRET").map_err(|_| JwtError::MissingSecret)?;
        let mut config = Self::new(secret);

        if let Some(minutes) = number("JWT_ACCESS_EXPIRATION_MINUTES") {
            config = config.access_token_expiration(minutes);
        }
        if let Some(days) = number("JWT_REFRESH_EXPIRATION_DAYS") {
            config = config.refresh_token_expiration(days);
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            config = config.issuer(issuer);
        }

        Ok(config)
    }

    /// Access token lifetime in minutes. Negative values mint already-expired tokens.
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_ttl = Duration::minutes(minutes);
        self
    }

    /// Refresh token lifetime in days
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_ttl = Duration::days(days);
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token type")]
    InvalidTokenType,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_) => JwtError::InvalidToken,
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// Kind marker carried in the `token_type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    #[display("access")]
    Access,
    #[display("refresh")]
    Refresh,
}

/// Claims common to both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClaims {
    /// Account id
    pub sub: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

impl RegisteredClaims {
    fn account_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// Claims of an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
    pub email: String,
    pub role: Role,
}

impl AccessClaims {
    pub fn account_id(&self) -> Result<Uuid, JwtError> {
        self.registered.account_id()
    }
}

/// Claims of a refresh token. Lacking email and role, it never decodes as an
/// access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalClaims {
    #[serde(flatten)]
    pub registered: RegisteredClaims,
}

impl RenewalClaims {
    pub fn account_id(&self) -> Result<Uuid, JwtError> {
        self.registered.account_id()
    }
}

trait Typed {
    const KIND: TokenType;

    fn registered(&self) -> &RegisteredClaims;
}

impl Typed for AccessClaims {
    const KIND: TokenType = TokenType::Access;

    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}

impl Typed for RenewalClaims {
    const KIND: TokenType = TokenType::Refresh;

    fn registered(&self) -> &RegisteredClaims {
        &self.registered
    }
}

/// Mints and checks session tokens
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let secret = config.secret.as_bytes();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config,
        }
    }

    pub fn from_env() -> Result<Self, JwtError> {
        Ok(Self::new(JwtConfig::from_env()?))
    }

    fn registered(&self, account_id: Uuid, kind: TokenType, ttl: Duration) -> RegisteredClaims {
        let now = Utc::now();

        RegisteredClaims {
            sub: account_id.to_string(),
            token_type: kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    fn check<C: Typed + DeserializeOwned>(&self, token: &str) -> Result<C, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<C>(token, &self.decoding_key, &validation)?.claims;
        if claims.registered().token_type != C::KIND {
            return Err(JwtError::InvalidTokenType);
        }
        Ok(claims)
    }

    /// Mint an access token, returning it with its expiry timestamp
    pub fn issue_access(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<(String, i64), JwtError> {
        let claims = AccessClaims {
            registered: self.registered(account_id, TokenType::Access, self.config.access_ttl),
            email: email.to_string(),
            role,
        };
        Ok((self.sign(&claims)?, claims.registered.exp))
    }

    /// Mint a refresh token, returning it with its expiry timestamp
    pub fn issue_renewal(&self, account_id: Uuid) -> Result<(String, i64), JwtError> {
        let claims = RenewalClaims {
            registered: self.registered(account_id, TokenType::Refresh, self.config.refresh_ttl),
        };
        Ok((self.sign(&claims)?, claims.registered.exp))
    }

    pub fn issue_pair(
        &self,
        account_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<TokenPair, JwtError> {
        let (access_token, access_expires_at) = self.issue_access(account_id, email, role)?;
        let (refresh_token, refresh_expires_at) = self.issue_renewal(account_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: BEARER.to_string(),
        })
    }

    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.check(token)
    }

    pub fn validate_renewal(&self, token: &str) -> Result<RenewalClaims, JwtError> {
        self.check(token)
    }
}
