//! Error types for the negotiation layer.

use gatehold_protocol::Notice;

/// Why a background task produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    /// The task panicked. The payload is the panic message, if it was a
    /// string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped before it reported a result, e.g. because the
    /// runtime shut down.
    #[error("task was dropped before completing")]
    Lost,
}

/// Errors a negotiation work item can finish with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// The participant refuses this login. The notice is shown to the
    /// client as the disconnect reason.
    #[error("login rejected: {0}")]
    Rejected(Notice),

    /// The work item crashed or was lost.
    #[error(transparent)]
    Task(#[from] TaskFailure),
}

impl NegotiationError {
    /// The reason to show the client.
    ///
    /// Crashes are never described to the client in detail.
    pub fn notice(&self) -> Notice {
        match self {
            Self::Rejected(notice) => notice.clone(),
            Self::Task(_) => Notice::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_notice_is_passed_through() {
        let err = NegotiationError::Rejected(Notice::DatabaseError);
        assert_eq!(err.notice(), Notice::DatabaseError);
    }

    #[test]
    fn test_task_failure_hides_details() {
        let err = NegotiationError::from(TaskFailure::Panicked("boom".into()));
        assert_eq!(err.notice(), Notice::InternalError);
        assert_eq!(err.to_string(), "task panicked: boom");
    }
}
