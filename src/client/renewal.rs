//! Queue of requests waiting on the in-flight renewal
//!
//! The first rejected request to be admitted leads the renewal; later ones
//! follow it. When renewal settles every follower, leader included, is handed
//! back in arrival order.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::client::error::GatewayError;
use crate::client::transport::{ApiRequest, ApiResponse};

pub(crate) type Reply = oneshot::Sender<Result<ApiResponse, GatewayError>>;

/// A rejected request parked until renewal settles
#[derive(Debug)]
pub struct PendingRequest {
    pub request: ApiRequest,
    reply: Reply,
}

impl PendingRequest {
    /// The caller stopped waiting
    pub fn is_cancelled(&self) -> bool {
        self.reply.is_closed()
    }

    /// Deliver the final outcome. A caller that went away is ignored.
    pub fn resolve(self, outcome: Result<ApiResponse, GatewayError>) {
        let _ = self.reply.send(outcome);
    }
}

/// Role of a request admitted to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Must start the renewal
    Leader,
    /// A renewal is already running
    Follower,
}

#[derive(Debug, Default)]
pub struct PendingRequestQueue {
    renewing: bool,
    entries: VecDeque<PendingRequest>,
}

impl PendingRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_renewing(&self) -> bool {
        self.renewing
    }

    /// Waiting requests whose callers are still listening
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|p| !p.is_cancelled()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn admit(&mut self, request: ApiRequest, reply: Reply) -> Admission {
        self.entries.push_back(PendingRequest { request, reply });

        if self.renewing {
            Admission::Follower
        } else {
            self.renewing = true;
            Admission::Leader
        }
    }

    /// End the renewal and take the live waiters, oldest first
    pub fn settle(&mut self) -> Vec<PendingRequest> {
        self.renewing = false;
        self.entries.drain(..).filter(|p| !p.is_cancelled()).collect()
    }
}
