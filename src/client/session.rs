//! Client-held session value
//!
//! `SessionState` is owned by the gateway and changes in exactly three ways:
//! `establish` on login, `rotate` after a successful renewal, `destroy` on logout
//! or when renewal is refused. Each change writes through to the credential store
//! as one replace or one clear.

use crate::client::storage::{CredentialStore, StorageError, StoredCredentials};
use crate::core::protocol::TokenPair;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveSession {
    access_token: String,
    refresh_token: String,
    /// Known only when the pair came from the server in this process
    access_expires_at: Option<i64>,
}

/// The access/refresh pair of the current login, if any
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    current: Option<ActiveSession>,
    /// Bumped on every login and logout; renewal keeps it
    generation: u64,
}

impl SessionState {
    /// Load the session persisted by a previous run
    pub fn restore<C: CredentialStore>(store: &C) -> Self {
        let current = match store.load() {
            Ok(stored) => stored.map(|stored| ActiveSession {
                access_token: stored.access_token,
                refresh_token: stored.refresh_token,
                access_expires_at: None,
            }),
            Err(err) => {
                tracing::warn!("Ignoring unreadable stored credentials: {}", err);
                None
            }
        };

        Self {
            current,
            generation: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.refresh_token.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the access token is known to be past its expiry at `now`
    pub fn access_expired(&self, now: i64, skew_secs: i64) -> bool {
        self.current
            .as_ref()
            .and_then(|s| s.access_expires_at)
            .is_some_and(|exp| exp - skew_secs <= now)
    }

    /// Start a new session. Nothing changes if the pair cannot be persisted.
    pub(crate) fn establish<C: CredentialStore>(
        &mut self,
        tokens: &TokenPair,
        store: &C,
    ) -> Result<(), StorageError> {
        store.replace(&Self::stored(tokens))?;
        self.current = Some(Self::active(tokens));
        self.generation += 1;
        Ok(())
    }

    /// Swap in a renewed pair. Memory is updated even if persisting fails.
    pub(crate) fn rotate<C: CredentialStore>(
        &mut self,
        tokens: &TokenPair,
        store: &C,
    ) -> Result<(), StorageError> {
        self.current = Some(Self::active(tokens));
        store.replace(&Self::stored(tokens))
    }

    /// End the session
    pub(crate) fn destroy<C: CredentialStore>(&mut self, store: &C) -> Result<(), StorageError> {
        self.current = None;
        self.generation += 1;
        store.clear()
    }

    fn active(tokens: &TokenPair) -> ActiveSession {
        ActiveSession {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            access_expires_at: Some(tokens.access_expires_at),
        }
    }

    fn stored(tokens: &TokenPair) -> StoredCredentials {
        StoredCredentials {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
        }
    }
}
