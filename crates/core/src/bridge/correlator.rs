//! Request correlation
//!
//! Every outbound request is registered here under its identifier until a
//! response with the same identifier arrives or its deadline passes. The pending
//! map is touched from the caller's task, the network receive path and the
//! maintenance sweep, so every operation goes through the `DashMap` shard locks.

use super::{ResolutionOutcome, ResolutionRequest, ResolutionResponse};
use crate::error::{BridgeError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

/// Stored half of a pending request
struct Waiter {
    key: String,
    deadline: Instant,
    sender: oneshot::Sender<ResolutionOutcome>,
}

/// Caller side of a registered request.
///
/// Dropping the entry abandons the wait; the correlator still removes the
/// request on completion or expiry.
#[derive(Debug)]
pub struct PendingEntry {
    request: ResolutionRequest,
    deadline: Instant,
    receiver: oneshot::Receiver<ResolutionOutcome>,
}

impl PendingEntry {
    pub fn id(&self) -> Uuid {
        self.request.id()
    }

    pub fn request(&self) -> &ResolutionRequest {
        &self.request
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the outcome.
    ///
    /// Does not enforce the deadline by itself; wrap in `timeout_at` or rely on
    /// the correlator sweep.
    pub async fn wait(self) -> ResolutionOutcome {
        self.receiver
            .await
            .unwrap_or(ResolutionOutcome::TransportFailed)
    }
}

/// Tracks outstanding resolution requests by identifier
#[derive(Default)]
pub struct RequestCorrelator {
    pending: DashMap<Uuid, Waiter>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request that must be answered before `deadline`.
    ///
    /// A duplicate identifier means identifier generation is broken; it is
    /// logged as an error and the request is refused.
    pub fn register(&self, request: ResolutionRequest, deadline: Instant) -> Result<PendingEntry> {
        let id = request.id();
        let (sender, receiver) = oneshot::channel();

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                tracing::error!(
                    request_id = %id,
                    key = request.key(),
                    "Duplicate bridge request identifier, refusing to register"
                );
                Err(BridgeError::DuplicateIdentifier(id))
            }
            Entry::Vacant(slot) => {
                slot.insert(Waiter {
                    key: request.key().to_owned(),
                    deadline,
                    sender,
                });
                tracing::trace!(request_id = %id, key = request.key(), "Registered bridge request");

                Ok(PendingEntry {
                    request,
                    deadline,
                    receiver,
                })
            }
        }
    }

    /// Fulfil the pending request matching `response`.
    ///
    /// Returns `false` for unknown identifiers, which covers late responses to
    /// expired requests and duplicates of an already completed one.
    pub fn complete(&self, response: ResolutionResponse) -> bool {
        let outcome = if response.success {
            ResolutionOutcome::Resolved(response.value)
        } else {
            ResolutionOutcome::Rejected
        };

        if self.finish(response.id, outcome) {
            true
        } else {
            tracing::debug!(request_id = %response.id, "Discarding response for unknown or expired request");
            false
        }
    }

    /// Remove a request whose deadline passed and wake its caller with a timeout
    pub fn expire(&self, id: Uuid) -> bool {
        self.finish(id, ResolutionOutcome::TimedOut)
    }

    /// Remove a request that could not be dispatched
    pub fn fail(&self, id: Uuid) -> bool {
        self.finish(id, ResolutionOutcome::TransportFailed)
    }

    /// Expire every request whose deadline is at or before `now`
    pub fn expire_overdue(&self, now: Instant) -> usize {
        let overdue: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let expired = overdue.into_iter().filter(|id| self.expire(*id)).count();
        if expired > 0 {
            tracing::debug!("Expired {} overdue bridge requests", expired);
        }

        expired
    }

    /// Fail every pending request, used on shutdown
    pub fn fail_all(&self) -> usize {
        let ids: Vec<Uuid> = self.pending.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.fail(*id)).count()
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn finish(&self, id: Uuid, outcome: ResolutionOutcome) -> bool {
        let Some((_, waiter)) = self.pending.remove(&id) else {
            return false;
        };

        tracing::trace!(request_id = %id, key = %waiter.key, ?outcome, "Bridge request finished");
        // The caller may have given up already, which is fine
        let _ = waiter.sender.send(outcome);
        true
    }
}
