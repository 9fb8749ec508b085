//! Lifecycle of a single chat request.

use serde::Serialize;

use crate::domain::foundation::StateMachine;

/// Phase of a chat request.
///
/// ```text
/// Validating -> SessionResolving -> Streaming -> Completing
///      \               \               |-------> Erroring
///       \               \--------------|-------> Erroring
///        \-------------------------------------> Erroring
///                                      \-------> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    Validating,
    SessionResolving,
    Streaming,
    Completing,
    Erroring,
    Cancelled,
}

impl StateMachine for ChatPhase {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ChatPhase::*;
        matches!(
            (self, target),
            (Validating, SessionResolving)
                | (Validating, Erroring)
                | (SessionResolving, Streaming)
                | (SessionResolving, Erroring)
                | (Streaming, Completing)
                | (Streaming, Erroring)
                | (Streaming, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ChatPhase::*;
        match self {
            Validating => vec![SessionResolving, Erroring],
            SessionResolving => vec![Streaming, Erroring],
            Streaming => vec![Completing, Erroring, Cancelled],
            Completing | Erroring | Cancelled => vec![],
        }
    }
}

impl std::fmt::Display for ChatPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChatPhase::Validating => "validating",
            ChatPhase::SessionResolving => "session_resolving",
            ChatPhase::Streaming => "streaming",
            ChatPhase::Completing => "completing",
            ChatPhase::Erroring => "erroring",
            ChatPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}
