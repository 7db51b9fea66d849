//! Authorization guard for protected controllers
//!
//! `Principal` is the authenticated caller extracted from a Bearer access token.
//! `require_roles` wraps a router so only principals with an allowed role get through;
//! the principal is then available to handlers via `Extension<Principal>` or by
//! extracting it again.

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::{self, Next},
    response::Response,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::jwt::JwtService;
use crate::core::auth::service::AuthError;
use crate::core::protocol::Role;

/// Authenticated principal attached to the request context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Principal {
    /// Check the principal's role against an allow-list
    pub fn require_any(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    JwtService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the role guard
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let token = extract_bearer_token(&parts.headers)?;
        let claims = JwtService::from_ref(state).validate_access(&token)?;

        Ok(Principal {
            id: claims.account_id()?,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token.to_string())
}

/// State of the role guard middleware
#[derive(Clone)]
pub struct RoleGuard {
    jwt_service: JwtService,
    allowed: Arc<[Role]>,
}

impl RoleGuard {
    pub fn new(jwt_service: JwtService, allowed: &[Role]) -> Self {
        Self {
            jwt_service,
            allowed: allowed.into(),
        }
    }
}

impl FromRef<RoleGuard> for JwtService {
    fn from_ref(guard: &RoleGuard) -> Self {
        guard.jwt_service.clone()
    }
}

async fn enforce_roles(
    State(guard): State<RoleGuard>,
    principal: Principal,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Err(err) = principal.require_any(&guard.allowed) {
        tracing::info!(
            "Account {} with role {} denied {}",
            principal.id,
            principal.role,
            request.uri().path()
        );
        return Err(err);
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Restrict every route of `router` to principals holding one of `allowed`
pub fn require_roles<S>(router: Router<S>, jwt_service: JwtService, allowed: &[Role]) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        RoleGuard::new(jwt_service, allowed),
        enforce_roles,
    ))
}
