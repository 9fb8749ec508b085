//! Status of an asynchronous agent run as reported by the hosted backend.

use serde::{Deserialize, Serialize};

/// Run status values of the hosted agent API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    /// The agent wants a follow-up (tool outputs) before continuing.
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    Incomplete,
}

/// How a run status should be treated by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Keep polling.
    Pending,
    /// Stop polling; the output gathered so far is the answer.
    Succeeded,
    /// Stop polling; the run did not produce a usable answer.
    Failed,
}

impl RunStatus {
    pub fn outcome(&self) -> RunOutcome {
        match self {
            RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {
                RunOutcome::Pending
            }
            RunStatus::Completed | RunStatus::RequiresAction | RunStatus::Incomplete => {
                RunOutcome::Succeeded
            }
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => RunOutcome::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome() != RunOutcome::Pending
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
        };
        write!(f, "{}", s)
    }
}
