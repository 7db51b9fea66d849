//! Auth API endpoints
//!
//! Provides REST API endpoints for session authentication:
//! - POST /auth/login - Login and get tokens
//! - POST /auth/refresh - Exchange a refresh token for a new pair
//! - POST /auth/verify - Diagnose an access token
//! - GET /auth/profile - Get current account

use axum::{
    Json, Router,
    extract::{FromRef, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;

use crate::core::auth::guard::Principal;
use crate::core::auth::jwt::JwtService;
use crate::core::auth::service::{AuthError, TokenIssuer};
use crate::core::db::UserStore;
use crate::core::protocol::{
    ApiError, AuthUser, LOGIN_PATH, LoginRequest, LoginResponse, PROFILE_PATH, REFRESH_PATH,
    RefreshRequest, TokenPair, VERIFY_PATH, VerifyRequest, VerifyResponse,
};

/// Auth API state containing the token issuer
pub struct AuthApiState<S> {
    pub issuer: TokenIssuer<S>,
}

impl<S: UserStore> FromRef<Arc<AuthApiState<S>>> for JwtService {
    fn from_ref(state: &Arc<AuthApiState<S>>) -> Self {
        state.issuer.jwt().clone()
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::InvalidRenewalToken => (StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN"),
            AuthError::AccountUnavailable => (StatusCode::UNAUTHORIZED, "ACCOUNT_UNAVAILABLE"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if let AuthError::InternalError(detail) = &self {
            tracing::error!("Auth request failed: {}", detail);
        }

        let body = ApiError::new(self.to_string(), code);

        (status, Json(body)).into_response()
    }
}

/// Create the auth API router
pub fn auth_api_router<S: UserStore>(state: AuthApiState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route(LOGIN_PATH, post(login_handler::<S>))
        .route(REFRESH_PATH, post(refresh_handler::<S>))
        .route(VERIFY_PATH, post(verify_handler::<S>))
        .route(PROFILE_PATH, get(profile_handler::<S>))
        .with_state(state)
}

/// POST /auth/login
/// Login and get access/refresh tokens
async fn login_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    tracing::info!("Login attempt for email: {}", request.email);

    let response = state
        .issuer
        .login(&request.email, &request.password)
        .await?;

    Ok(Json(response))
}

/// POST /auth/refresh
/// Exchange a refresh token for a new pair
async fn refresh_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    tracing::debug!("Token refresh request");

    let tokens = state.issuer.renew(&request.refresh_token).await?;

    Ok(Json(tokens))
}

/// POST /auth/verify
/// Always 200; validity is reported in the body
async fn verify_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    request: Result<Json<VerifyRequest>, JsonRejection>,
) -> Json<VerifyResponse> {
    match request {
        Ok(Json(request)) => Json(state.issuer.verify(&request.token).await),
        Err(rejection) => Json(VerifyResponse::invalid(rejection.body_text())),
    }
}

/// GET /auth/profile
/// Get current account from access token
async fn profile_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    principal: Principal,
) -> Result<Json<AuthUser>, AuthError> {
    let user = state.issuer.profile(principal.id).await?;

    Ok(Json(user))
}
