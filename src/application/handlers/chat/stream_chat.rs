//! Streaming chat handler.
//!
//! Orchestrates one chat request: validate the transcript, resolve the
//! backend session, then relay the agent's answer as wire events.
//!
//! The work is split in two so the transport can pick a status code before
//! it commits to a stream:
//!
//! - [`StreamChatHandler::prepare`] fails with a [`ChatError`] that maps to a
//!   plain HTTP error response.
//! - [`StreamChatHandler::run`] never fails; problems after the stream opened
//!   become a single `error` event.

use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::application::agent_stream::{AgentStreamClient, StreamingError};
use crate::application::event_stream::EventStreamWriter;
use crate::domain::chat::{
    latest_user_message, ChatMessage, ChatPhase, ChatValidationError, ConversationSession,
    WireEvent,
};
use crate::domain::foundation::{ConversationId, CorrelationId, MessageId, StateMachine, Timestamp};
use crate::ports::{SessionError, SessionRegistry};

/// Command to answer the latest user message of a transcript.
#[derive(Debug, Clone)]
pub struct StreamChatCommand {
    /// Existing conversation to continue; absent or blank starts a new one.
    pub conversation_id: Option<String>,
    /// Transcript as sent by the caller.
    pub messages: Vec<ChatMessage>,
}

impl StreamChatCommand {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            conversation_id: None,
            messages,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Errors raised before the response stream opens.
///
/// Every variant carries the correlation id it was logged under.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("{source}")]
    Validation {
        correlation_id: CorrelationId,
        #[source]
        source: ChatValidationError,
    },

    #[error("Failed to resolve agent session (correlation id {correlation_id})")]
    Session {
        correlation_id: CorrelationId,
        #[source]
        source: SessionError,
    },
}

impl ChatError {
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            ChatError::Validation { correlation_id, .. }
            | ChatError::Session { correlation_id, .. } => *correlation_id,
        }
    }
}

/// A validated request bound to a backend session, ready to stream.
#[derive(Debug, Clone)]
pub struct PreparedChat {
    conversation_id: ConversationId,
    session: ConversationSession,
    message: String,
    message_id: MessageId,
    phase: ChatPhase,
}

impl PreparedChat {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

/// How a streamed request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// `done` was sent with the assembled text.
    Completed { total_content: String },
    /// `error` was sent; the correlation id is in the logs.
    Failed { correlation_id: CorrelationId },
    /// The caller went away; nothing further was sent.
    Cancelled,
}

/// Handler for streaming chat requests.
pub struct StreamChatHandler {
    sessions: Arc<dyn SessionRegistry>,
    agent: Arc<AgentStreamClient>,
}

impl StreamChatHandler {
    pub fn new(sessions: Arc<dyn SessionRegistry>, agent: Arc<AgentStreamClient>) -> Self {
        Self { sessions, agent }
    }

    /// Validate the command and resolve its backend session.
    pub async fn prepare(&self, cmd: StreamChatCommand) -> Result<PreparedChat, ChatError> {
        let mut phase = ChatPhase::Validating;

        let message = match latest_user_message(&cmd.messages) {
            Ok(message) => message.content.clone(),
            Err(err) => {
                enter(&mut phase, ChatPhase::Erroring);
                let correlation_id = CorrelationId::new();
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "Rejected chat request"
                );
                return Err(ChatError::Validation {
                    correlation_id,
                    source: err,
                });
            }
        };

        enter(&mut phase, ChatPhase::SessionResolving);
        let conversation_id = cmd
            .conversation_id
            .and_then(|id| ConversationId::new(id).ok())
            .unwrap_or_else(ConversationId::generate);

        let session = match self.sessions.get_or_create(&conversation_id).await {
            Ok(session) => session,
            Err(source) => {
                enter(&mut phase, ChatPhase::Erroring);
                let correlation_id = CorrelationId::new();
                tracing::error!(
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    error = %source,
                    "Session resolution failed"
                );
                return Err(ChatError::Session {
                    correlation_id,
                    source,
                });
            }
        };

        Ok(PreparedChat {
            conversation_id,
            session,
            message,
            message_id: MessageId::new(),
            phase,
        })
    }

    /// Stream the agent's answer for a prepared request into `writer`.
    ///
    /// Emits `metadata`, then one `chunk` per fragment, then exactly one of
    /// `done` or `error`. After `cancel` fires or the transport closes,
    /// nothing more is written.
    pub async fn run(
        &self,
        prepared: PreparedChat,
        writer: &EventStreamWriter,
        cancel: CancellationToken,
    ) -> ChatOutcome {
        let PreparedChat {
            conversation_id,
            session,
            message,
            message_id,
            mut phase,
        } = prepared;
        enter(&mut phase, ChatPhase::Streaming);

        let agent_cancel = cancel.child_token();
        let metadata = WireEvent::metadata(&conversation_id, message_id, Timestamp::now());
        if !writer.write(metadata, &cancel).await {
            agent_cancel.cancel();
            return cancelled(&mut phase, &conversation_id);
        }

        let mut fragments = self.agent.stream_response(
            session.backend_session_id().clone(),
            message,
            agent_cancel.clone(),
        );
        let mut total_content = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = fragments.next() => Some(item),
            };

            match next {
                None | Some(Some(Err(StreamingError::Cancelled))) => {
                    agent_cancel.cancel();
                    return cancelled(&mut phase, &conversation_id);
                }
                Some(Some(Ok(fragment))) => {
                    total_content.push_str(&fragment);
                    if !writer.write(WireEvent::chunk(fragment), &cancel).await {
                        agent_cancel.cancel();
                        return cancelled(&mut phase, &conversation_id);
                    }
                }
                Some(Some(Err(err))) => {
                    enter(&mut phase, ChatPhase::Erroring);
                    let correlation_id = CorrelationId::new();
                    tracing::error!(
                        correlation_id = %correlation_id,
                        conversation_id = %conversation_id,
                        message_id = %message_id,
                        error = %err,
                        "Agent stream failed"
                    );
                    let event = WireEvent::error(err.client_message(), correlation_id);
                    if !writer.write(event, &cancel).await {
                        return ChatOutcome::Cancelled;
                    }
                    return ChatOutcome::Failed { correlation_id };
                }
                Some(None) => break,
            }
        }

        enter(&mut phase, ChatPhase::Completing);
        let done = WireEvent::done(message_id, total_content.clone(), Timestamp::now());
        if !writer.write(done, &cancel).await {
            return cancelled(&mut phase, &conversation_id);
        }

        tracing::info!(
            conversation_id = %conversation_id,
            message_id = %message_id,
            chars = total_content.chars().count(),
            "Chat response completed"
        );
        ChatOutcome::Completed { total_content }
    }

    /// Prepare and run in one call, for callers that do not need to pick a
    /// status code in between.
    pub async fn handle(
        &self,
        cmd: StreamChatCommand,
        writer: &EventStreamWriter,
        cancel: CancellationToken,
    ) -> Result<ChatOutcome, ChatError> {
        let prepared = self.prepare(cmd).await?;
        Ok(self.run(prepared, writer, cancel).await)
    }
}

fn enter(phase: &mut ChatPhase, next: ChatPhase) {
    match phase.transition_to(next) {
        Ok(next) => {
            tracing::trace!(from = %phase, to = %next, "Chat phase");
            *phase = next;
        }
        Err(err) => tracing::warn!(error = %err, "Unexpected chat phase transition"),
    }
}

fn cancelled(phase: &mut ChatPhase, conversation_id: &ConversationId) -> ChatOutcome {
    enter(phase, ChatPhase::Cancelled);
    tracing::info!(conversation_id = %conversation_id, "Chat stream cancelled by client");
    ChatOutcome::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agent::MockAgentBackend;
    use crate::adapters::session::InMemorySessionRegistry;
    use crate::application::agent_stream::AgentStreamConfig;
    use crate::domain::chat::WireEventKind;
    use crate::ports::AgentBackendError;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handler_with(backend: MockAgentBackend) -> (StreamChatHandler, Arc<MockAgentBackend>) {
        let backend = Arc::new(backend);
        let sessions = Arc::new(InMemorySessionRegistry::new(backend.clone()));
        let agent = Arc::new(AgentStreamClient::with_config(
            backend.clone(),
            AgentStreamConfig {
                poll_interval: Duration::from_millis(1),
                max_run_duration: Duration::from_secs(5),
                channel_capacity: 8,
            },
        ));
        (StreamChatHandler::new(sessions, agent), backend)
    }

    fn transcript(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    async fn drain(mut rx: mpsc::Receiver<WireEvent>) -> Vec<WireEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    async fn stream(
        handler: &StreamChatHandler,
        cmd: StreamChatCommand,
    ) -> (Result<ChatOutcome, ChatError>, Vec<WireEvent>) {
        let (writer, rx) = EventStreamWriter::channel(64);
        let outcome = handler.handle(cmd, &writer, CancellationToken::new()).await;
        drop(writer);
        (outcome, drain(rx).await)
    }

    fn kinds(events: &[WireEvent]) -> Vec<WireEventKind> {
        events.iter().map(WireEvent::kind).collect()
    }

    mod validation {
        use super::*;

        #[tokio::test]
        async fn empty_transcript_is_rejected_before_streaming() {
            let (handler, backend) = handler_with(MockAgentBackend::new());

            let (outcome, events) = stream(&handler, StreamChatCommand::new(vec![])).await;

            assert!(matches!(
                outcome,
                Err(ChatError::Validation {
                    source: ChatValidationError::MessagesRequired,
                    ..
                })
            ));
            assert!(events.is_empty());
            assert_eq!(backend.session_calls(), 0);
        }

        #[tokio::test]
        async fn assistant_only_transcript_is_rejected() {
            let (handler, backend) = handler_with(MockAgentBackend::new());

            let (outcome, events) = stream(
                &handler,
                StreamChatCommand::new(vec![ChatMessage::assistant("Hi, how can I help?")]),
            )
            .await;

            assert!(matches!(
                outcome,
                Err(ChatError::Validation {
                    source: ChatValidationError::NoUserMessage,
                    ..
                })
            ));
            assert!(events.is_empty());
            assert_eq!(backend.session_calls(), 0);
        }

        #[tokio::test]
        async fn each_rejection_gets_its_own_correlation_id() {
            let (handler, _) = handler_with(MockAgentBackend::new());

            let first = handler.prepare(StreamChatCommand::new(vec![])).await.unwrap_err();
            let second = handler.prepare(StreamChatCommand::new(vec![])).await.unwrap_err();

            assert!(matches!(first, ChatError::Validation { .. }));
            assert!(!first.correlation_id().to_string().is_empty());
            assert_ne!(first.correlation_id(), second.correlation_id());
        }

        #[tokio::test]
        async fn latest_user_message_is_forwarded() {
            let (handler, backend) = handler_with(MockAgentBackend::new().with_fragments(["ok"]));

            let cmd = StreamChatCommand::new(vec![
                ChatMessage::user("first question"),
                ChatMessage::assistant("first answer"),
                ChatMessage::user("second question"),
                ChatMessage::assistant(""),
            ]);
            let (outcome, _) = stream(&handler, cmd).await;

            assert!(outcome.is_ok());
            let posted = backend.posted_messages();
            assert_eq!(posted.len(), 1);
            assert_eq!(posted[0].1, "second question");
        }
    }

    mod sessions {
        use super::*;

        #[tokio::test]
        async fn session_failure_surfaces_with_correlation_id() {
            let (handler, _) = handler_with(
                MockAgentBackend::new()
                    .with_session_failures(1, AgentBackendError::unavailable("down")),
            );

            let (outcome, events) =
                stream(&handler, StreamChatCommand::new(transcript("hi"))).await;

            assert!(matches!(outcome, Err(ChatError::Session { .. })));
            assert!(events.is_empty());
        }

        #[tokio::test]
        async fn conversation_id_is_reused_across_requests() {
            let (handler, backend) = handler_with(MockAgentBackend::new().with_fragments(["a"]));

            let first = handler
                .prepare(StreamChatCommand::new(transcript("one")).with_conversation_id("conv-7"))
                .await
                .unwrap();
            let second = handler
                .prepare(StreamChatCommand::new(transcript("two")).with_conversation_id("conv-7"))
                .await
                .unwrap();

            assert_eq!(first.conversation_id().as_str(), "conv-7");
            assert_eq!(first.session.backend_session_id(), second.session.backend_session_id());
            assert_eq!(backend.session_calls(), 1);
        }

        #[tokio::test]
        async fn blank_conversation_id_starts_a_new_conversation() {
            let (handler, _) = handler_with(MockAgentBackend::new());

            let prepared = handler
                .prepare(StreamChatCommand::new(transcript("hi")).with_conversation_id("   "))
                .await
                .unwrap();

            assert!(!prepared.conversation_id().as_str().trim().is_empty());
        }

        #[tokio::test]
        async fn each_request_gets_a_fresh_message_id() {
            let (handler, _) = handler_with(MockAgentBackend::new());
            let cmd = StreamChatCommand::new(transcript("hi")).with_conversation_id("c");

            let a = handler.prepare(cmd.clone()).await.unwrap();
            let b = handler.prepare(cmd).await.unwrap();

            assert_ne!(a.message_id(), b.message_id());
        }
    }

    mod streaming {
        use super::*;

        #[tokio::test]
        async fn successful_stream_follows_grammar() {
            let (handler, _) =
                handler_with(MockAgentBackend::new().with_fragments(["Your tyres ", "look fine."]));

            let (outcome, events) = stream(
                &handler,
                StreamChatCommand::new(transcript("Check my tyres")).with_conversation_id("c-1"),
            )
            .await;

            assert_eq!(
                kinds(&events),
                vec![
                    WireEventKind::Metadata,
                    WireEventKind::Chunk,
                    WireEventKind::Chunk,
                    WireEventKind::Done
                ]
            );

            let (meta_message_id, conversation_id) = match &events[0] {
                WireEvent::Metadata(m) => (m.message_id.clone(), m.conversation_id.clone()),
                other => panic!("expected metadata, got {:?}", other),
            };
            assert_eq!(conversation_id, "c-1");

            match &events[3] {
                WireEvent::Done(done) => {
                    assert_eq!(done.total_content, "Your tyres look fine.");
                    assert_eq!(done.message_id, meta_message_id);
                }
                other => panic!("expected done, got {:?}", other),
            }

            assert_eq!(
                outcome.unwrap(),
                ChatOutcome::Completed {
                    total_content: "Your tyres look fine.".into()
                }
            );
        }

        #[tokio::test]
        async fn empty_answer_still_completes() {
            let (handler, _) = handler_with(MockAgentBackend::new());

            let (_, events) = stream(&handler, StreamChatCommand::new(transcript("hi"))).await;

            assert_eq!(kinds(&events), vec![WireEventKind::Metadata, WireEventKind::Done]);
        }

        #[tokio::test]
        async fn failure_after_partial_output_sends_one_error() {
            let (handler, _) = handler_with(
                MockAgentBackend::new().with_fragments_then_failure(["a", "b"], "rate limit"),
            );

            let (outcome, events) =
                stream(&handler, StreamChatCommand::new(transcript("hi"))).await;

            assert_eq!(
                kinds(&events),
                vec![
                    WireEventKind::Metadata,
                    WireEventKind::Chunk,
                    WireEventKind::Chunk,
                    WireEventKind::Error
                ]
            );

            let correlation_id = match outcome.unwrap() {
                ChatOutcome::Failed { correlation_id } => correlation_id,
                other => panic!("expected failure, got {:?}", other),
            };
            match &events[3] {
                WireEvent::Error(err) => {
                    assert_eq!(err.correlation_id, correlation_id.to_string());
                    assert!(!err.message.contains("rate limit"));
                }
                other => panic!("expected error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn backend_error_before_output_sends_metadata_then_error() {
            let (handler, _) = handler_with(
                MockAgentBackend::new().with_run_error(AgentBackendError::network("reset")),
            );

            let (_, events) = stream(&handler, StreamChatCommand::new(transcript("hi"))).await;

            assert_eq!(kinds(&events), vec![WireEventKind::Metadata, WireEventKind::Error]);
        }
    }

    mod cancellation {
        use super::*;

        #[tokio::test]
        async fn cancel_mid_stream_stops_without_terminal_event() {
            let (handler, backend) = handler_with(
                MockAgentBackend::new()
                    .with_fragments(["a", "b", "c", "d"])
                    .with_poll_delay(Duration::from_millis(30)),
            );
            let prepared = handler
                .prepare(StreamChatCommand::new(transcript("hi")))
                .await
                .unwrap();

            let (writer, mut rx) = EventStreamWriter::channel(16);
            let cancel = CancellationToken::new();
            let run = {
                let cancel = cancel.clone();
                async move { handler.run(prepared, &writer, cancel).await }
            };
            let task = tokio::spawn(run);

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                let is_chunk = event.kind() == WireEventKind::Chunk;
                events.push(event);
                if is_chunk {
                    cancel.cancel();
                    break;
                }
            }

            assert_eq!(task.await.unwrap(), ChatOutcome::Cancelled);
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }

            assert!(events.iter().all(|e| !e.is_terminal()));

            let polls = backend.poll_calls();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(backend.poll_calls(), polls);
        }

        #[tokio::test]
        async fn cancel_while_reader_stalls_drops_blocked_chunk() {
            let (handler, _) =
                handler_with(MockAgentBackend::new().with_fragments(["Hello", ", ", "world"]));
            let prepared = handler
                .prepare(StreamChatCommand::new(transcript("hi")))
                .await
                .unwrap();

            let (writer, mut rx) = EventStreamWriter::channel(1);
            let cancel = CancellationToken::new();
            let task = {
                let cancel = cancel.clone();
                tokio::spawn(async move { handler.run(prepared, &writer, cancel).await })
            };

            assert_eq!(rx.recv().await.map(|e| e.kind()), Some(WireEventKind::Metadata));
            assert_eq!(rx.recv().await, Some(WireEvent::chunk("Hello")));

            // Reader stalls: ", " fills the buffer and "world" blocks behind it.
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
            assert_eq!(task.await.unwrap(), ChatOutcome::Cancelled);

            let mut after_cancel = Vec::new();
            while let Some(event) = rx.recv().await {
                after_cancel.push(event);
            }
            assert_eq!(after_cancel, vec![WireEvent::chunk(", ")]);
        }

        #[tokio::test]
        async fn closed_transport_counts_as_cancellation() {
            let (handler, _) = handler_with(MockAgentBackend::new().with_fragments(["a", "b"]));
            let prepared = handler
                .prepare(StreamChatCommand::new(transcript("hi")))
                .await
                .unwrap();

            let (writer, rx) = EventStreamWriter::channel(4);
            drop(rx);

            let outcome = handler.run(prepared, &writer, CancellationToken::new()).await;

            assert_eq!(outcome, ChatOutcome::Cancelled);
        }

        #[tokio::test]
        async fn already_cancelled_request_writes_nothing() {
            let (handler, backend) = handler_with(MockAgentBackend::new().with_fragments(["a"]));
            let prepared = handler
                .prepare(StreamChatCommand::new(transcript("hi")))
                .await
                .unwrap();
            let cancel = CancellationToken::new();
            cancel.cancel();

            let (writer, rx) = EventStreamWriter::channel(4);
            let outcome = handler.run(prepared, &writer, cancel).await;
            drop(writer);

            assert_eq!(outcome, ChatOutcome::Cancelled);
            assert!(drain(rx).await.is_empty());
            assert_eq!(backend.run_calls(), 0);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn chunks_reassemble_into_done(
            fragments in prop::collection::vec("[a-zA-Z0-9 .,!?]{1,12}", 0..6)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let (outcome, events) = runtime.block_on(async {
                let (handler, _) =
                    handler_with(MockAgentBackend::new().with_fragments(fragments.clone()));
                stream(&handler, StreamChatCommand::new(transcript("hi"))).await
            });
            prop_assert!(outcome.is_ok());

            prop_assert_eq!(events.len(), fragments.len() + 2);
            prop_assert_eq!(events[0].kind(), WireEventKind::Metadata);
            prop_assert!(events.last().map(WireEvent::is_terminal).unwrap_or(false));
            prop_assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

            let chunks: String = events
                .iter()
                .filter_map(|e| match e {
                    WireEvent::Chunk(c) => Some(c.content.as_str()),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(&chunks, &fragments.concat());

            match events.last() {
                Some(WireEvent::Done(done)) => prop_assert_eq!(&done.total_content, &chunks),
                other => prop_assert!(false, "expected done, got {:?}", other),
            }
        }
    }
}
