//! Chat domain - messages, sessions, wire events and lifecycle enums.

mod errors;
mod events;
mod message;
mod phase;
mod run;
mod session;

pub use errors::ChatValidationError;
pub use events::{
    ChunkPayload, DonePayload, ErrorPayload, MetadataPayload, WireEvent, WireEventKind,
};
pub use message::{latest_user_message, ChatMessage, ChatRole, MAX_MESSAGE_LENGTH};
pub use phase::ChatPhase;
pub use run::{RunOutcome, RunStatus};
pub use session::ConversationSession;
