//! The negotiation ticket handed to participants, and the negotiation it
//! turns into once every participant has had its say.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use gatehold_protocol::{Identity, Notice};
use gatehold_transport::LoginConnection;

use crate::{NegotiationError, NegotiationParticipant, TaskHandle, WorkerPool};

/// A unit of negotiation work: finishes with `Ok(())` or a reason to refuse
/// the login.
pub type WorkHandle = TaskHandle<Result<(), NegotiationError>>;

/// Identifies one negotiation across all participants.
///
/// A fresh id is issued per dispatch, so two logins of the same player
/// never share one. Participants use it to tell a stale completion from
/// the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NegotiationId(u64);

impl NegotiationId {
    /// Creates a new `NegotiationId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "negotiation-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NegotiationTicket
// ---------------------------------------------------------------------------

/// What a participant receives during the broadcast.
///
/// The identity is fixed. The connection is held weakly: a participant
/// that keeps a reference past the broadcast must not keep the connection
/// alive. Work can only be added while the participant holds `&mut` to the
/// ticket, which is exactly the duration of the broadcast.
pub struct NegotiationTicket {
    id: NegotiationId,
    identity: Identity,
    connection: Weak<dyn LoginConnection>,
    pool: WorkerPool,
    work: Vec<WorkHandle>,
}

impl NegotiationTicket {
    pub(crate) fn new(
        id: NegotiationId,
        identity: Identity,
        connection: Weak<dyn LoginConnection>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            id,
            identity,
            connection,
            pool,
            work: Vec::new(),
        }
    }

    /// This negotiation's id.
    pub fn id(&self) -> NegotiationId {
        self.id
    }

    /// The identity being negotiated. May be incomplete (no id) when the
    /// client was not authenticated.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The connection, if it is still alive.
    pub fn connection(&self) -> Option<Arc<dyn LoginConnection>> {
        self.connection.upgrade()
    }

    /// Runs `work` on the shared worker pool and waits for it before the
    /// login may proceed.
    pub fn enqueue_work<F>(&mut self, name: &'static str, work: F)
    where
        F: Future<Output = Result<(), NegotiationError>> + Send + 'static,
    {
        let handle = self.pool.spawn(name, work);
        self.enqueue_handle(handle);
    }

    /// Adds an existing handle, e.g. one created with
    /// [`TaskHandle::ready`].
    pub fn enqueue_handle(&mut self, handle: WorkHandle) {
        tracing::trace!(negotiation = %self.id, work = handle.name(), "work enqueued");
        self.work.push(handle);
    }

    /// Number of work items registered so far.
    pub fn work_count(&self) -> usize {
        self.work.len()
    }

    pub(crate) fn into_negotiation(
        self,
        participants: Vec<Arc<dyn NegotiationParticipant>>,
    ) -> Negotiation {
        Negotiation {
            id: self.id,
            identity: self.identity,
            work: self.work,
            participants,
            abandoned: false,
        }
    }
}

impl fmt::Debug for NegotiationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationTicket")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("work", &self.work.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Where a negotiation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationStatus {
    /// At least one work item is still running.
    Pending,
    /// Every work item finished successfully.
    Complete,
    /// A work item refused the login (or crashed). The notice is the
    /// disconnect reason.
    Failed(Notice),
}

/// A dispatched negotiation: the work every participant registered.
///
/// The state machine polls it once per tick. No new work can be added.
pub struct Negotiation {
    id: NegotiationId,
    identity: Identity,
    work: Vec<WorkHandle>,
    participants: Vec<Arc<dyn NegotiationParticipant>>,
    abandoned: bool,
}

impl Negotiation {
    /// This negotiation's id.
    pub fn id(&self) -> NegotiationId {
        self.id
    }

    /// The identity that was negotiated.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Number of work items registered during the broadcast.
    pub fn work_count(&self) -> usize {
        self.work.len()
    }

    /// Polls every work item.
    ///
    /// A refusal is reported as soon as it is seen, even if other items
    /// are still running; those are left to finish on their own. When
    /// several items have failed, the first in registration order wins.
    pub fn poll(&mut self) -> NegotiationStatus {
        let mut pending = false;

        for handle in &mut self.work {
            let name = handle.name();
            match handle.poll() {
                None => pending = true,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    tracing::debug!(
                        negotiation = %self.id,
                        work = name,
                        error = %e,
                        "negotiation work refused the login"
                    );
                    return NegotiationStatus::Failed(e.notice());
                }
                Some(Err(failure)) => {
                    return NegotiationStatus::Failed(
                        NegotiationError::from(failure.clone()).notice(),
                    );
                }
            }
        }

        if pending {
            NegotiationStatus::Pending
        } else {
            NegotiationStatus::Complete
        }
    }

    /// Tells every participant the login will not be completed.
    ///
    /// Called when the connection goes away between dispatch and
    /// placement. Work still in flight is not cancelled. Calling this more
    /// than once notifies only once.
    pub fn abandon(&mut self) {
        if std::mem::replace(&mut self.abandoned, true) {
            return;
        }
        tracing::debug!(negotiation = %self.id, player = %self.identity, "negotiation abandoned");
        for participant in &self.participants {
            participant.on_abandon(self.id, &self.identity);
        }
    }

    /// Whether [`abandon`](Self::abandon) has run.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }
}

impl fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiation")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("work", &self.work)
            .field("abandoned", &self.abandoned)
            .finish_non_exhaustive()
    }
}
