//! Session gateway
//!
//! Every outbound API call goes through `SessionGateway::send`, which attaches the
//! current access token. A 401 parks the request in the pending queue; the first
//! parked request starts a single renewal against the refresh endpoint, and once
//! it settles each parked request is either replayed with the new access token or
//! failed with the same error. A replayed request that is rejected again is
//! returned to the caller as-is.
//!
//! The renewal runs as its own task so that a caller dropping its future never
//! leaves the rest of the queue waiting.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, oneshot, watch};

use crate::client::config::GatewayConfig;
use crate::client::error::GatewayError;
use crate::client::renewal::{Admission, PendingRequestQueue};
use crate::client::session::SessionState;
use crate::client::storage::CredentialStore;
use crate::client::transport::{ApiRequest, ApiResponse, Transport};
use crate::core::protocol::{
    AuthUser, LOGIN_PATH, LoginRequest, LoginResponse, PROFILE_PATH, REFRESH_PATH,
    RefreshRequest, TokenPair,
};

/// Authentication status observed by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    /// Renewal was refused; the user has to log in again
    Expired,
}

#[derive(Debug)]
struct GatewayState {
    session: SessionState,
    queue: PendingRequestQueue,
}

impl GatewayState {
    /// Fail every request parked on a renewal of the session being replaced
    fn release_queue(&mut self) {
        for pending in self.queue.settle() {
            pending.resolve(Err(GatewayError::SessionExpired));
        }
    }
}

struct Inner<T, C> {
    transport: T,
    store: C,
    config: GatewayConfig,
    state: Mutex<GatewayState>,
    status: watch::Sender<SessionStatus>,
}

/// Client-side session owner. Clones share one session.
pub struct SessionGateway<T, C> {
    inner: Arc<Inner<T, C>>,
}

impl<T, C> Clone for SessionGateway<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

enum RenewalFailure {
    /// The server refused the refresh token
    Rejected,
    /// The refresh endpoint could not be reached or answered with a server error
    Unreachable(String),
}

enum NextStep {
    Replay(ApiRequest),
    Wait(oneshot::Receiver<Result<ApiResponse, GatewayError>>),
    Expired,
}

impl<T: Transport, C: CredentialStore> SessionGateway<T, C> {
    /// Create a gateway, restoring any session left in `store`
    pub fn new(transport: T, store: C, config: GatewayConfig) -> Self {
        let session = SessionState::restore(&store);
        let initial = if session.is_active() {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        };
        let (status, _) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                config,
                state: Mutex::new(GatewayState {
                    session,
                    queue: PendingRequestQueue::new(),
                }),
                status,
            }),
        }
    }

    pub fn store(&self) -> &C {
        &self.inner.store
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Receive every status change
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Requests currently waiting on a renewal
    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Exchange credentials for a session.
    ///
    /// Goes straight to the transport: a 401 here means bad credentials and
    /// never triggers renewal.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser, GatewayError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        let response = self.dispatch(request).await?;

        if response.is_unauthorized() {
            tracing::info!("Login rejected for {}", email);
            return Err(GatewayError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(GatewayError::InvalidResponse(format!(
                "login returned status {}",
                response.status
            )));
        }

        let login: LoginResponse = response.json()?;
        {
            let mut state = self.inner.state.lock().await;
            state.session.establish(&login.tokens, &self.inner.store)?;
            state.release_queue();
            self.inner.status.send_replace(SessionStatus::Authenticated);
        }

        tracing::info!("Logged in as {} ({})", login.user.email, login.user.role);
        Ok(login.user)
    }

    /// Drop the session locally. Refresh tokens are not revoked server-side.
    pub async fn logout(&self) {
        let mut state = self.inner.state.lock().await;
        self.end_session(&mut state, SessionStatus::Unauthenticated);
        tracing::info!("Logged out");
    }

    /// Current account
    pub async fn profile(&self) -> Result<AuthUser, GatewayError> {
        let response = self.send(ApiRequest::get(PROFILE_PATH)).await?;

        if response.is_unauthorized() {
            return Err(GatewayError::SessionExpired);
        }
        if !response.is_success() {
            return Err(GatewayError::InvalidResponse(format!(
                "profile returned status {}",
                response.status
            )));
        }
        response.json()
    }

    /// Send an API request with the session's access token, renewing the
    /// session once if the token is rejected.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        if request.path == LOGIN_PATH {
            return self.dispatch(request).await;
        }

        let (token, expired) = {
            let state = self.inner.state.lock().await;
            let now = Utc::now().timestamp();
            (
                state.session.access_token().map(str::to_string),
                state
                    .session
                    .access_expired(now, self.inner.config.expiry_skew_secs),
            )
        };

        let Some(token) = token else {
            let response = self.dispatch(request).await?;
            if response.is_unauthorized() {
                return Err(GatewayError::SessionExpired);
            }
            return Ok(response);
        };

        if expired {
            tracing::debug!("Access token past expiry, renewing before {}", request.path);
            return self.retry_after_renewal(request, &token).await;
        }

        let response = self.dispatch(request.authorized(&token)).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!("{} rejected, waiting on renewal", request.path);
        self.retry_after_renewal(request, &token).await
    }

    async fn retry_after_renewal(
        &self,
        request: ApiRequest,
        rejected_token: &str,
    ) -> Result<ApiResponse, GatewayError> {
        let next = {
            let mut state = self.inner.state.lock().await;
            match state.session.access_token().map(str::to_string) {
                None => NextStep::Expired,
                // Rotated since this request went out
                Some(current) if current != rejected_token && !state.queue.is_renewing() => {
                    NextStep::Replay(request.authorized(&current))
                }
                Some(_) => {
                    let (reply, receiver) = oneshot::channel();
                    if state.queue.admit(request, reply) == Admission::Leader {
                        self.start_renewal(&state.session);
                    }
                    NextStep::Wait(receiver)
                }
            }
        };

        match next {
            NextStep::Expired => Err(GatewayError::SessionExpired),
            NextStep::Replay(request) => {
                tracing::debug!("Session already renewed, replaying {}", request.path);
                self.dispatch(request).await
            }
            NextStep::Wait(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(GatewayError::SessionExpired)),
        }
    }

    fn start_renewal(&self, session: &SessionState) {
        let refresh_token = session.refresh_token().map(str::to_string);
        let generation = session.generation();
        let gateway = self.clone();

        tokio::spawn(async move {
            gateway.complete_renewal(refresh_token, generation).await;
        });
    }

    async fn complete_renewal(self, refresh_token: Option<String>, generation: u64) {
        let outcome = self.request_renewal(refresh_token).await;

        let (waiting, outcome) = {
            let mut state = self.inner.state.lock().await;
            // The session change already released this renewal's queue
            if state.session.generation() != generation {
                tracing::debug!("Session changed during renewal, discarding result");
                return;
            }
            let waiting = state.queue.settle();

            match &outcome {
                Ok(tokens) => {
                    tracing::info!("Session renewed");
                    if let Err(err) = state.session.rotate(tokens, &self.inner.store) {
                        tracing::warn!("Failed to persist renewed tokens: {}", err);
                    }
                }
                Err(RenewalFailure::Rejected) => {
                    tracing::info!("Renewal refused, session expired");
                    self.end_session(&mut state, SessionStatus::Expired);
                }
                Err(RenewalFailure::Unreachable(reason)) => {
                    tracing::warn!("Renewal failed, keeping session: {}", reason);
                }
            }
            (waiting, outcome)
        };

        match outcome {
            Ok(tokens) => {
                tracing::debug!("Replaying {} queued requests", waiting.len());
                let gateway = &self;
                let token = tokens.access_token.as_str();
                futures::future::join_all(waiting.into_iter().map(|pending| async move {
                    if pending.is_cancelled() {
                        return;
                    }
                    let outcome = gateway.dispatch(pending.request.authorized(token)).await;
                    pending.resolve(outcome);
                }))
                .await;
            }
            Err(RenewalFailure::Rejected) => {
                for pending in waiting {
                    pending.resolve(Err(GatewayError::SessionExpired));
                }
            }
            Err(RenewalFailure::Unreachable(reason)) => {
                for pending in waiting {
                    pending.resolve(Err(GatewayError::NetworkUnavailable(reason.clone())));
                }
            }
        }
    }

    async fn request_renewal(
        &self,
        refresh_token: Option<String>,
    ) -> Result<TokenPair, RenewalFailure> {
        let Some(refresh_token) = refresh_token else {
            return Err(RenewalFailure::Rejected);
        };

        let request = ApiRequest::post(REFRESH_PATH)
            .json(&RefreshRequest { refresh_token })
            .map_err(|e| RenewalFailure::Unreachable(e.to_string()))?;
        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| RenewalFailure::Unreachable(e.to_string()))?;

        match response.status {
            400 | 401 | 403 => Err(RenewalFailure::Rejected),
            _ if response.is_success() => response
                .json()
                .map_err(|e| RenewalFailure::Unreachable(e.to_string())),
            status => Err(RenewalFailure::Unreachable(format!(
                "refresh returned status {}",
                status
            ))),
        }
    }

    fn end_session(&self, state: &mut GatewayState, status: SessionStatus) {
        if let Err(err) = state.session.destroy(&self.inner.store) {
            tracing::warn!("Failed to clear stored credentials: {}", err);
        }
        state.release_queue();
        self.inner.status.send_replace(status);
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        Ok(self.inner.transport.send(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::error::TransportError;
    use crate::client::storage::{MemoryCredentialStore, StoredCredentials};
    use crate::core::protocol::{BEARER, Role};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use tokio::task::JoinHandle;
    use uuid::Uuid;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum RenewalScript {
        Accept,
        Reject,
        ServerError,
    }

    /// In-process stand-in for the CRM API
    struct FakeApi {
        user_id: Uuid,
        valid_access: StdMutex<String>,
        issued: AtomicUsize,
        refresh_calls: AtomicUsize,
        renewal: StdMutex<RenewalScript>,
        renewal_gate: Semaphore,
        slow_gate: Semaphore,
        calls: StdMutex<Vec<(String, Option<String>)>>,
        reject_all: AtomicBool,
        offline: AtomicBool,
        issue_expired: AtomicBool,
    }

    impl FakeApi {
        fn with_renewal_permits(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                user_id: Uuid::new_v4(),
                valid_access: StdMutex::new(String::new()),
                issued: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                renewal: StdMutex::new(RenewalScript::Accept),
                renewal_gate: Semaphore::new(permits),
                slow_gate: Semaphore::new(0),
                calls: StdMutex::new(Vec::new()),
                reject_all: AtomicBool::new(false),
                offline: AtomicBool::new(false),
                issue_expired: AtomicBool::new(false),
            })
        }

        fn new() -> Arc<Self> {
            Self::with_renewal_permits(1)
        }

        /// Refresh calls block until `release_renewal`
        fn gated() -> Arc<Self> {
            Self::with_renewal_permits(0)
        }

        fn release_renewal(&self) {
            self.renewal_gate.add_permits(1);
        }

        fn release_slow(&self) {
            self.slow_gate.add_permits(1);
        }

        fn script_renewal(&self, script: RenewalScript) {
            *self.renewal.lock().unwrap() = script;
        }

        fn expire_access(&self) {
            self.valid_access.lock().unwrap().clear();
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }

        fn paths_sent_with(&self, token: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(_, bearer)| bearer.as_deref() == Some(token))
                .map(|(path, _)| path)
                .collect()
        }

        fn user(&self) -> AuthUser {
            AuthUser {
                id: self.user_id,
                email: "admin@example.com".to_string(),
                name: "Admin".to_string(),
                role: Role::Admin,
            }
        }

        fn issue(&self) -> TokenPair {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            let access_token = format!("access-{}", n);
            *self.valid_access.lock().unwrap() = access_token.clone();

            let now = Utc::now().timestamp();
            let access_expires_at = if self.issue_expired.load(Ordering::SeqCst) {
                now - 60
            } else {
                now + 3600
            };

            TokenPair {
                access_token,
                refresh_token: format!("refresh-{}", n),
                access_expires_at,
                refresh_expires_at: now + 86400,
                token_type: BEARER.to_string(),
            }
        }

        async fn handle(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(TransportError::Network("connection refused".to_string()));
            }

            let body = request.body.clone().unwrap_or_default();
            match request.path.as_str() {
                LOGIN_PATH => {
                    if body["email"] == "admin@example.com" && body["password"] == "password123" {
                        let login = LoginResponse {
                            tokens: self.issue(),
                            user: self.user(),
                        };
                        Ok(ApiResponse::new(200, serde_json::to_value(login).unwrap()))
                    } else {
                        Ok(ApiResponse::new(401, json!({"code": "INVALID_CREDENTIALS"})))
                    }
                }
                REFRESH_PATH => {
                    self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                    let _permit = self.renewal_gate.acquire().await.unwrap();

                    let script = *self.renewal.lock().unwrap();
                    match script {
                        RenewalScript::Accept => Ok(ApiResponse::new(
                            200,
                            serde_json::to_value(self.issue()).unwrap(),
                        )),
                        RenewalScript::Reject => Ok(ApiResponse::new(
                            401,
                            json!({"code": "INVALID_REFRESH_TOKEN"}),
                        )),
                        RenewalScript::ServerError => Ok(ApiResponse::new(503, json!(null))),
                    }
                }
                path => {
                    if path == "/slow" {
                        let _permit = self.slow_gate.acquire().await.unwrap();
                    }
                    self.calls
                        .lock()
                        .unwrap()
                        .push((path.to_string(), request.bearer.clone()));

                    let valid = self.valid_access.lock().unwrap().clone();
                    let accepted = !self.reject_all.load(Ordering::SeqCst)
                        && !valid.is_empty()
                        && request.bearer.as_deref() == Some(valid.as_str());

                    if !accepted {
                        Ok(ApiResponse::new(401, json!({"code": "INVALID_TOKEN"})))
                    } else if path == PROFILE_PATH {
                        Ok(ApiResponse::new(
                            200,
                            serde_json::to_value(self.user()).unwrap(),
                        ))
                    } else {
                        Ok(ApiResponse::new(200, json!({"path": path})))
                    }
                }
            }
        }
    }

    struct FakeTransport(Arc<FakeApi>);

    impl Transport for FakeTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.0.handle(request).await
        }
    }

    type TestGateway = SessionGateway<FakeTransport, MemoryCredentialStore>;

    fn gateway_with(api: &Arc<FakeApi>, store: MemoryCredentialStore) -> TestGateway {
        SessionGateway::new(FakeTransport(api.clone()), store, GatewayConfig::default())
    }

    async fn logged_in(api: &Arc<FakeApi>) -> TestGateway {
        let gateway = gateway_with(api, MemoryCredentialStore::new());
        gateway
            .login("admin@example.com", "password123")
            .await
            .unwrap();
        gateway
    }

    fn spawn_get(
        gateway: &TestGateway,
        path: &'static str,
    ) -> JoinHandle<Result<ApiResponse, GatewayError>> {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.send(ApiRequest::get(path)).await })
    }

    async fn wait_for_pending(gateway: &TestGateway, expected: usize) {
        for _ in 0..1000 {
            if gateway.pending_len().await == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("queue never reached {} entries", expected);
    }

    async fn let_tasks_run() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    fn stored_access(gateway: &TestGateway) -> Option<String> {
        gateway
            .store()
            .load()
            .unwrap()
            .map(|credentials| credentials.access_token)
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let api = FakeApi::new();
        let gateway = gateway_with(&api, MemoryCredentialStore::new());
        assert_eq!(gateway.status(), SessionStatus::Unauthenticated);

        let user = gateway
            .login("admin@example.com", "password123")
            .await
            .unwrap();

        assert_eq!(user.role, Role::Admin);
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
        assert_eq!(stored_access(&gateway).as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_login_rejection_is_invalid_credentials() {
        let api = FakeApi::new();
        let gateway = gateway_with(&api, MemoryCredentialStore::new());

        let result = gateway.login("admin@example.com", "wrong").await;

        assert!(matches!(result, Err(GatewayError::InvalidCredentials)));
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(gateway.status(), SessionStatus::Unauthenticated);
        assert!(stored_access(&gateway).is_none());
    }

    #[tokio::test]
    async fn test_login_path_bypasses_renewal() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;

        let request = ApiRequest::post(LOGIN_PATH)
            .json(&json!({"email": "admin@example.com", "password": "nope"}))
            .unwrap();
        let response = gateway.send(request).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_send_attaches_access_token() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;

        let response = gateway.send(ApiRequest::get("/clients")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            api.calls(),
            vec![("/clients".to_string(), Some("access-1".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_parallel_rejections_share_one_renewal() {
        let api = FakeApi::gated();
        let gateway = logged_in(&api).await;
        api.expire_access();

        let handles: Vec<_> = ["/a", "/b", "/c"]
            .into_iter()
            .map(|path| spawn_get(&gateway, path))
            .collect();
        wait_for_pending(&gateway, 3).await;
        let_tasks_run().await;
        assert_eq!(api.refresh_calls(), 1);

        api.release_renewal();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().status, 200);
        }

        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(gateway.pending_len().await, 0);
        assert_eq!(stored_access(&gateway).as_deref(), Some("access-2"));
        assert_eq!(api.paths_sent_with("access-2").len(), 3);
    }

    #[tokio::test]
    async fn test_replays_in_arrival_order() {
        let api = FakeApi::gated();
        let gateway = logged_in(&api).await;
        api.expire_access();

        let mut handles = Vec::new();
        for (i, path) in ["/1", "/2", "/3"].into_iter().enumerate() {
            handles.push(spawn_get(&gateway, path));
            wait_for_pending(&gateway, i + 1).await;
        }

        api.release_renewal();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(api.paths_sent_with("access-2"), vec!["/1", "/2", "/3"]);
    }

    #[tokio::test]
    async fn test_refused_renewal_expires_session() {
        let api = FakeApi::gated();
        let gateway = logged_in(&api).await;
        let mut status = gateway.subscribe();
        api.script_renewal(RenewalScript::Reject);
        api.expire_access();

        let first = spawn_get(&gateway, "/a");
        let second = spawn_get(&gateway, "/b");
        wait_for_pending(&gateway, 2).await;
        api.release_renewal();

        assert!(matches!(
            first.await.unwrap(),
            Err(GatewayError::SessionExpired)
        ));
        assert!(matches!(
            second.await.unwrap(),
            Err(GatewayError::SessionExpired)
        ));

        assert!(stored_access(&gateway).is_none());
        assert_eq!(gateway.status(), SessionStatus::Expired);
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), SessionStatus::Expired);

        let after = gateway.send(ApiRequest::get("/a")).await;
        assert!(matches!(after, Err(GatewayError::SessionExpired)));
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_rejection_returned_as_is() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;
        api.reject_all.store(true, Ordering::SeqCst);

        let response = gateway.send(ApiRequest::get("/clients")).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body["code"], "INVALID_TOKEN");
        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(
            api.calls(),
            vec![
                ("/clients".to_string(), Some("access-1".to_string())),
                ("/clients".to_string(), Some("access-2".to_string())),
            ]
        );
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_network_failure_skips_renewal() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;
        api.offline.store(true, Ordering::SeqCst);

        let result = gateway.send(ApiRequest::get("/clients")).await;

        assert!(matches!(result, Err(GatewayError::NetworkUnavailable(_))));
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_unreachable_renewal_keeps_session() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;
        api.script_renewal(RenewalScript::ServerError);
        api.expire_access();

        let result = gateway.send(ApiRequest::get("/clients")).await;

        match result {
            Err(GatewayError::NetworkUnavailable(reason)) => assert!(reason.contains("503")),
            other => panic!("expected NetworkUnavailable, got {:?}", other),
        }
        assert_eq!(stored_access(&gateway).as_deref(), Some("access-1"));
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_queue() {
        let api = FakeApi::gated();
        let gateway = logged_in(&api).await;
        api.expire_access();

        let first = spawn_get(&gateway, "/1");
        wait_for_pending(&gateway, 1).await;
        let second = spawn_get(&gateway, "/2");
        wait_for_pending(&gateway, 2).await;
        let third = spawn_get(&gateway, "/3");
        wait_for_pending(&gateway, 3).await;

        second.abort();
        assert!(second.await.unwrap_err().is_cancelled());
        assert_eq!(gateway.pending_len().await, 2);

        api.release_renewal();
        assert_eq!(first.await.unwrap().unwrap().status, 200);
        assert_eq!(third.await.unwrap().unwrap().status, 200);

        assert_eq!(api.paths_sent_with("access-2"), vec!["/1", "/3"]);
        assert_eq!(api.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_rejection_replays_with_current_token() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;
        api.expire_access();

        let slow = spawn_get(&gateway, "/slow");
        let_tasks_run().await;

        let fast = gateway.send(ApiRequest::get("/fast")).await.unwrap();
        assert_eq!(fast.status, 200);
        assert_eq!(api.refresh_calls(), 1);

        api.release_slow();
        assert_eq!(slow.await.unwrap().unwrap().status, 200);

        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(api.paths_sent_with("access-1"), vec!["/fast", "/slow"]);
        assert_eq!(api.paths_sent_with("access-2"), vec!["/fast", "/slow"]);
    }

    #[tokio::test]
    async fn test_known_expired_token_renews_before_sending() {
        let api = FakeApi::new();
        api.issue_expired.store(true, Ordering::SeqCst);
        let gateway = logged_in(&api).await;
        api.issue_expired.store(false, Ordering::SeqCst);

        let response = gateway.send(ApiRequest::get("/clients")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(api.refresh_calls(), 1);
        assert_eq!(
            api.calls(),
            vec![("/clients".to_string(), Some("access-2".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;

        gateway.logout().await;
        assert_eq!(gateway.status(), SessionStatus::Unauthenticated);
        assert!(stored_access(&gateway).is_none());

        let result = gateway.send(ApiRequest::get("/clients")).await;
        assert!(matches!(result, Err(GatewayError::SessionExpired)));
        assert_eq!(api.refresh_calls(), 0);
        assert_eq!(api.calls(), vec![("/clients".to_string(), None)]);
    }

    #[tokio::test]
    async fn test_relogin_during_renewal_starts_fresh_renewal() {
        let api = FakeApi::gated();
        let gateway = logged_in(&api).await;
        api.expire_access();

        let stale = spawn_get(&gateway, "/old");
        wait_for_pending(&gateway, 1).await;

        gateway.logout().await;
        assert!(matches!(
            stale.await.unwrap(),
            Err(GatewayError::SessionExpired)
        ));
        gateway
            .login("admin@example.com", "password123")
            .await
            .unwrap();
        api.expire_access();

        let fresh = spawn_get(&gateway, "/new");
        wait_for_pending(&gateway, 1).await;
        let_tasks_run().await;
        assert_eq!(api.refresh_calls(), 2);

        // Abandoned renewal finishes first and must not touch the new queue
        api.release_renewal();
        let_tasks_run().await;
        assert_eq!(gateway.pending_len().await, 1);
        api.release_renewal();

        let response = fresh.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(gateway.status(), SessionStatus::Authenticated);
        assert_eq!(gateway.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_restores_persisted_session() {
        let api = FakeApi::new();
        *api.valid_access.lock().unwrap() = "access-7".to_string();
        let store = MemoryCredentialStore::with_credentials(StoredCredentials {
            access_token: "access-7".to_string(),
            refresh_token: "refresh-7".to_string(),
        });

        let gateway = gateway_with(&api, store);
        assert_eq!(gateway.status(), SessionStatus::Authenticated);

        let response = gateway.send(ApiRequest::get("/clients")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(api.paths_sent_with("access-7"), vec!["/clients"]);
    }

    #[tokio::test]
    async fn test_profile() {
        let api = FakeApi::new();
        let gateway = logged_in(&api).await;

        let user = gateway.profile().await.unwrap();

        assert_eq!(user, api.user());
    }
}
