//! Pending start/stop/remove requests
//!
//! A [`PendingRequest`] is the engine's half of an asynchronous operation
//! and a [`PendingOperation`] is the caller's half. Settling a request
//! consumes it, so a request cannot be resolved twice through this type.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};

/// Identifier of a pending request, unique per engine
pub type RequestId = u64;

/// Which operation a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Start,
    Stop,
    Remove,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Start => f.write_str("START"),
            OperationKind::Stop => f.write_str("STOP"),
            OperationKind::Remove => f.write_str("REMOVE"),
        }
    }
}

/// Lifecycle of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionState {
    Pending,
    Resolved,
    Rejected,
}

/// Engine-side half of a start/stop call
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    kind: OperationKind,
    state: ResolutionState,
    responder: oneshot::Sender<Result<()>>,
}

impl PendingRequest {
    /// Create a request and the future handed back to the caller
    pub fn new(id: RequestId, kind: OperationKind) -> (Self, PendingOperation) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            id,
            kind,
            state: ResolutionState::Pending,
            responder: tx,
        };
        let operation = PendingOperation { id, kind, rx };
        (request, operation)
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    /// Resolve successfully
    pub fn resolve(self) -> ResolutionState {
        self.settle(Ok(()))
    }

    /// Reject with an error
    pub fn reject(self, error: Error) -> ResolutionState {
        self.settle(Err(error))
    }

    /// Deliver the outcome, consuming the request
    pub fn settle(mut self, outcome: Result<()>) -> ResolutionState {
        self.state = if outcome.is_ok() {
            ResolutionState::Resolved
        } else {
            ResolutionState::Rejected
        };

        if self.responder.send(outcome).is_err() {
            debug!(id = self.id, kind = %self.kind, "Caller dropped pending operation before it settled");
        }
        self.state
    }
}

/// Caller-side half of a start/stop call
///
/// Await it to learn the outcome. Dropping it is allowed; the operation
/// still runs to completion.
#[derive(Debug)]
#[must_use = "a pending operation reports its outcome only when awaited"]
pub struct PendingOperation {
    id: RequestId,
    kind: OperationKind,
    rx: oneshot::Receiver<Result<()>>,
}

impl PendingOperation {
    /// An operation that is already settled
    pub fn settled(id: RequestId, kind: OperationKind, outcome: Result<()>) -> Self {
        let (request, operation) = PendingRequest::new(id, kind);
        request.settle(outcome);
        operation
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Future for PendingOperation {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::engine_unavailable(format!(
                "engine stopped before {} request {} settled",
                self.kind, self.id
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
