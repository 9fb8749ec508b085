//! Agent stream client.
//!
//! Drives the hosted agent's asynchronous protocol for one user message:
//!
//! 1. post the message into the backend session
//! 2. start a run
//! 3. poll the run status at a fixed interval until it is terminal
//! 4. after every poll, list the run's output and forward only text that has
//!    not been forwarded before
//!
//! The protocol runs in a producer task that feeds a bounded channel; callers
//! consume the receiving side as a [`FragmentStream`]. Cancelling the token or
//! dropping the stream stops the producer at its next suspension point, and
//! any backend call in flight at that moment is abandoned.

use futures::Stream;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::domain::chat::{RunOutcome, RunStatus};
use crate::domain::foundation::{BackendSessionId, RunId};
use crate::ports::{AgentBackend, AgentBackendError, OutputMessage};

/// Lazy, single-use sequence of response fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, StreamingError>> + Send>>;

/// Errors ending a fragment stream.
#[derive(Debug, Clone, Error)]
pub enum StreamingError {
    /// The run reached a failed terminal status.
    #[error("agent run ended with status {status}: {message}")]
    RunFailed { status: RunStatus, message: String },

    /// The run did not reach a terminal status in time.
    #[error("agent run did not finish within {limit_secs}s")]
    Timeout { limit_secs: u64 },

    /// A backend call failed.
    #[error("agent backend error: {0}")]
    Backend(#[from] AgentBackendError),

    /// The consumer went away or the request was cancelled.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamingError {
    /// Message safe to show to the caller.
    pub fn client_message(&self) -> &'static str {
        match self {
            StreamingError::RunFailed { .. } => {
                "The assistant was unable to complete the response."
            }
            StreamingError::Timeout { .. } => "The assistant took too long to respond.",
            StreamingError::Backend(_) => "The assistant service is currently unavailable.",
            StreamingError::Cancelled => "The request was cancelled.",
        }
    }
}

/// Tuning for the polling loop.
#[derive(Debug, Clone)]
pub struct AgentStreamConfig {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on how long one run is polled.
    pub max_run_duration: Duration,
    /// Fragments buffered between the poller and its consumer.
    pub channel_capacity: usize,
}

impl Default for AgentStreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_run_duration: Duration::from_secs(300),
            channel_capacity: 32,
        }
    }
}

/// Adapter turning the run/poll protocol into a fragment stream.
pub struct AgentStreamClient {
    backend: Arc<dyn AgentBackend>,
    config: AgentStreamConfig,
}

impl AgentStreamClient {
    pub fn new(backend: Arc<dyn AgentBackend>) -> Self {
        Self::with_config(backend, AgentStreamConfig::default())
    }

    pub fn with_config(backend: Arc<dyn AgentBackend>, config: AgentStreamConfig) -> Self {
        Self { backend, config }
    }

    /// Send `message` into `session_id` and stream the agent's answer.
    ///
    /// The stream yields fragments in arrival order and ends after the run
    /// completes. A failed run, a timeout or a backend error ends it with one
    /// `Err` item. After cancellation nothing more is yielded.
    pub fn stream_response(
        &self,
        session_id: BackendSessionId,
        message: String,
        cancel: CancellationToken,
    ) -> FragmentStream {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        let poller = RunPoller {
            backend: self.backend.clone(),
            config: self.config.clone(),
            session_id,
            cancel,
            tx,
        };
        tokio::spawn(poller.run(message));

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Producer side of one fragment stream.
struct RunPoller {
    backend: Arc<dyn AgentBackend>,
    config: AgentStreamConfig,
    session_id: BackendSessionId,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<String, StreamingError>>,
}

impl RunPoller {
    async fn run(self, message: String) {
        match self.drive(&message).await {
            Ok(()) => {}
            Err(StreamingError::Cancelled) => {
                tracing::debug!(session_id = %self.session_id, "Agent stream cancelled");
            }
            Err(err) => {
                if !self.cancel.is_cancelled() {
                    let _ = self.tx.send(Err(err)).await;
                }
            }
        }
    }

    async fn drive(&self, message: &str) -> Result<(), StreamingError> {
        self.guarded(self.backend.post_message(&self.session_id, message))
            .await?;
        let run = self
            .guarded(self.backend.create_run(&self.session_id))
            .await?;

        tracing::debug!(session_id = %self.session_id, run_id = %run.id, "Agent run started");

        let result = self.poll(&run.id).await;
        if matches!(
            result,
            Err(StreamingError::Cancelled) | Err(StreamingError::Timeout { .. })
        ) {
            self.cancel_remote(run.id);
        }
        result
    }

    async fn poll(&self, run_id: &RunId) -> Result<(), StreamingError> {
        let deadline = Instant::now() + self.config.max_run_duration;
        let mut cursor = OutputCursor::default();

        loop {
            let snapshot = self
                .guarded(self.backend.get_run(&self.session_id, run_id))
                .await?;

            // Drain after every status read so output revealed alongside a
            // terminal status is still forwarded.
            let output = self
                .guarded(
                    self.backend
                        .list_output(&self.session_id, run_id, cursor.checkpoint()),
                )
                .await?;
            for fragment in cursor.advance(output) {
                self.emit(fragment).await?;
            }

            match snapshot.status.outcome() {
                RunOutcome::Pending => {}
                RunOutcome::Succeeded => {
                    if snapshot.status != RunStatus::Completed {
                        tracing::warn!(
                            run_id = %run_id,
                            status = %snapshot.status,
                            "Agent run stopped before completion; returning partial output"
                        );
                    }
                    return Ok(());
                }
                RunOutcome::Failed => {
                    let message = snapshot
                        .last_error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "no error details".to_string());
                    tracing::warn!(
                        run_id = %run_id,
                        status = %snapshot.status,
                        error = %message,
                        "Agent run failed"
                    );
                    return Err(StreamingError::RunFailed {
                        status: snapshot.status,
                        message,
                    });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(run_id = %run_id, "Agent run exceeded maximum duration");
                return Err(StreamingError::Timeout {
                    limit_secs: self.config.max_run_duration.as_secs(),
                });
            }

            let wait = self.config.poll_interval.min(deadline - now);
            self.guarded(async {
                tokio::time::sleep(wait).await;
                Ok(())
            })
            .await?;
        }
    }

    /// Races a backend call against cancellation and consumer drop.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, AgentBackendError>>,
    ) -> Result<T, StreamingError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamingError::Cancelled),
            _ = self.tx.closed() => Err(StreamingError::Cancelled),
            result = call => result.map_err(StreamingError::Backend),
        }
    }

    async fn emit(&self, fragment: String) -> Result<(), StreamingError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamingError::Cancelled),
            sent = self.tx.send(Ok(fragment)) => sent.map_err(|_| StreamingError::Cancelled),
        }
    }

    /// Fire-and-forget cancellation of a run nobody is waiting for anymore.
    fn cancel_remote(&self, run_id: RunId) {
        let backend = self.backend.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = backend.cancel_run(&session_id, &run_id).await {
                tracing::debug!(
                    run_id = %run_id,
                    error = %err,
                    "Best-effort run cancellation failed"
                );
            }
        });
    }
}

/// Tracks which output has already been forwarded.
///
/// Messages before the newest one are settled: they will not change, so the
/// newest settled id becomes the listing checkpoint. The newest message may
/// still grow; only text beyond what was already forwarded is emitted.
#[derive(Debug, Default)]
pub(crate) struct OutputCursor {
    settled: HashSet<String>,
    checkpoint: Option<String>,
    open: Option<(String, usize)>,
}

impl OutputCursor {
    pub(crate) fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    /// Consume a listing and return the unseen text in order.
    pub(crate) fn advance(&mut self, messages: Vec<OutputMessage>) -> Vec<String> {
        let mut fragments = Vec::new();

        for message in messages {
            if self.settled.contains(&message.id) {
                continue;
            }

            let growing = matches!(&self.open, Some((id, _)) if *id == message.id);

            if growing {
                if let Some((_, emitted)) = self.open.as_mut() {
                    let seen = *emitted;
                    if message.text.len() > seen && message.text.is_char_boundary(seen) {
                        fragments.push(message.text[seen..].to_string());
                        *emitted = message.text.len();
                    }
                }
                continue;
            }

            if let Some((previous, _)) = self.open.take() {
                self.settled.insert(previous.clone());
                self.checkpoint = Some(previous);
            }
            if !message.text.is_empty() {
                fragments.push(message.text.clone());
            }
            self.open = Some((message.id, message.text.len()));
        }

        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agent::{MockAgentBackend, MockRunStep};
    use futures::StreamExt;

    fn fast_config() -> AgentStreamConfig {
        AgentStreamConfig {
            poll_interval: Duration::from_millis(1),
            max_run_duration: Duration::from_secs(5),
            channel_capacity: 4,
        }
    }

    fn client(backend: MockAgentBackend) -> (AgentStreamClient, Arc<MockAgentBackend>) {
        let backend = Arc::new(backend);
        (
            AgentStreamClient::with_config(backend.clone(), fast_config()),
            backend,
        )
    }

    async fn collect(stream: FragmentStream) -> Vec<Result<String, StreamingError>> {
        stream.collect().await
    }

    mod output_cursor {
        use super::*;

        #[test]
        fn new_messages_are_emitted_whole() {
            let mut cursor = OutputCursor::default();
            let fragments = cursor.advance(vec![
                OutputMessage::new("m1", "Hello"),
                OutputMessage::new("m2", "world"),
            ]);
            assert_eq!(fragments, vec!["Hello", "world"]);
            assert_eq!(cursor.checkpoint(), Some("m1"));
        }

        #[test]
        fn growing_message_emits_only_the_suffix() {
            let mut cursor = OutputCursor::default();
            assert_eq!(cursor.advance(vec![OutputMessage::new("m1", "Hel")]), vec!["Hel"]);
            assert_eq!(cursor.advance(vec![OutputMessage::new("m1", "Hello")]), vec!["lo"]);
            assert!(cursor.advance(vec![OutputMessage::new("m1", "Hello")]).is_empty());
        }

        #[test]
        fn settled_messages_are_never_repeated() {
            let mut cursor = OutputCursor::default();
            cursor.advance(vec![OutputMessage::new("m1", "a"), OutputMessage::new("m2", "b")]);
            // A backend ignoring the checkpoint returns everything again.
            let fragments = cursor.advance(vec![
                OutputMessage::new("m1", "a"),
                OutputMessage::new("m2", "b"),
                OutputMessage::new("m3", "c"),
            ]);
            assert_eq!(fragments, vec!["c"]);
        }

        #[test]
        fn empty_message_waits_for_text() {
            let mut cursor = OutputCursor::default();
            assert!(cursor.advance(vec![OutputMessage::new("m1", "")]).is_empty());
            assert_eq!(cursor.advance(vec![OutputMessage::new("m1", "Hi")]), vec!["Hi"]);
        }

        #[test]
        fn multibyte_text_is_split_on_char_boundaries() {
            let mut cursor = OutputCursor::default();
            cursor.advance(vec![OutputMessage::new("m1", "Kilometerstand: 12")]);
            let fragments =
                cursor.advance(vec![OutputMessage::new("m1", "Kilometerstand: 12 500 km ✓")]);
            assert_eq!(fragments, vec![" 500 km ✓"]);
        }
    }

    #[tokio::test]
    async fn yields_fragments_in_order() {
        let (client, backend) =
            client(MockAgentBackend::new().with_fragments(["Hello", ", ", "world"]));
        let session = BackendSessionId::new("thread_1");

        let items =
            collect(client.stream_response(session, "Hi".into(), CancellationToken::new())).await;
        let fragments: Vec<String> = items.into_iter().map(Result::unwrap).collect();

        assert_eq!(fragments, vec!["Hello", ", ", "world"]);
        assert_eq!(backend.posted_messages(), vec![("thread_1".to_string(), "Hi".to_string())]);
        assert_eq!(backend.run_calls(), 1);
    }

    #[tokio::test]
    async fn growing_output_is_not_duplicated() {
        let (client, _) = client(MockAgentBackend::new().with_script(vec![
            MockRunStep::new(RunStatus::Queued),
            MockRunStep::new(RunStatus::InProgress).with_message("Your next "),
            MockRunStep::new(RunStatus::InProgress).with_extension("service is "),
            MockRunStep::new(RunStatus::InProgress),
            MockRunStep::new(RunStatus::Completed).with_extension("due in 300 km."),
        ]));

        let items = collect(client.stream_response(
            BackendSessionId::new("t"),
            "When is service due?".into(),
            CancellationToken::new(),
        ))
        .await;
        let fragments: Vec<String> = items.into_iter().map(Result::unwrap).collect();

        assert_eq!(fragments, vec!["Your next ", "service is ", "due in 300 km."]);
    }

    #[tokio::test]
    async fn failed_run_ends_with_error_after_partial_output() {
        let (client, _) = client(
            MockAgentBackend::new().with_fragments_then_failure(["one", "two"], "model overloaded"),
        );

        let items = collect(client.stream_response(
            BackendSessionId::new("t"),
            "q".into(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "one");
        assert_eq!(items[1].as_ref().unwrap(), "two");
        match &items[2] {
            Err(StreamingError::RunFailed { status, message }) => {
                assert_eq!(*status, RunStatus::Failed);
                assert!(message.contains("model overloaded"));
            }
            other => panic!("expected RunFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn requires_action_ends_stream_normally() {
        let (client, _) = client(MockAgentBackend::new().with_script(vec![
            MockRunStep::new(RunStatus::RequiresAction).with_message("Let me check."),
        ]));

        let items = collect(client.stream_response(
            BackendSessionId::new("t"),
            "q".into(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "Let me check.");
    }

    #[tokio::test]
    async fn backend_error_is_surfaced() {
        let (client, _) = client(
            MockAgentBackend::new().with_run_error(AgentBackendError::unavailable("503")),
        );

        let items = collect(client.stream_response(
            BackendSessionId::new("t"),
            "q".into(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamingError::Backend(_))));
    }

    #[tokio::test]
    async fn stuck_run_times_out_and_is_cancelled_remotely() {
        let backend = Arc::new(
            MockAgentBackend::new().with_script(vec![MockRunStep::new(RunStatus::InProgress)]),
        );
        let client = AgentStreamClient::with_config(
            backend.clone(),
            AgentStreamConfig {
                poll_interval: Duration::from_millis(5),
                max_run_duration: Duration::from_millis(40),
                channel_capacity: 4,
            },
        );

        let items = collect(client.stream_response(
            BackendSessionId::new("t"),
            "q".into(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StreamingError::Timeout { .. })));

        // Remote cancellation runs detached.
        for _ in 0..50 {
            if !backend.cancelled_runs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(backend.cancelled_runs(), vec!["run_1".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_polling_without_further_items() {
        let backend = Arc::new(
            MockAgentBackend::new()
                .with_fragments(["a", "b", "c"])
                .with_poll_delay(Duration::from_millis(30)),
        );
        let client = AgentStreamClient::with_config(backend.clone(), fast_config());
        let cancel = CancellationToken::new();

        let mut stream =
            client.stream_response(BackendSessionId::new("t"), "q".into(), cancel.clone());
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");

        cancel.cancel();
        assert!(stream.next().await.is_none());

        let polls = backend.poll_calls();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.poll_calls(), polls);
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_producer() {
        let backend = Arc::new(
            MockAgentBackend::new()
                .with_fragments(["a", "b", "c", "d"])
                .with_poll_delay(Duration::from_millis(20)),
        );
        let client = AgentStreamClient::with_config(backend.clone(), fast_config());

        let mut stream = client.stream_response(
            BackendSessionId::new("t"),
            "q".into(),
            CancellationToken::new(),
        );
        stream.next().await;
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let polls = backend.poll_calls();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.poll_calls(), polls);
    }

    #[test]
    fn client_messages_hide_details() {
        let err = StreamingError::RunFailed {
            status: RunStatus::Failed,
            message: "internal stack trace".into(),
        };
        assert!(!err.client_message().contains("stack trace"));
        assert!(!StreamingError::Backend(AgentBackendError::AuthenticationFailed)
            .client_message()
            .contains("authentication"));
    }
}
