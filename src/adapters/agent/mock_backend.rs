//! Mock Agent Backend for testing.
//!
//! Provides a scripted implementation of the AgentBackend port so the
//! polling state machine, the session registry and the HTTP layer can be
//! exercised without a hosted agent.
//!
//! # Features
//!
//! - Scripted run progression: each status poll advances one step
//! - Output that arrives as new messages or grows an existing one
//! - Error injection for session creation and run failures
//! - Simulated latency for race and cancellation tests
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let backend = MockAgentBackend::new().with_fragments(["Hello", ", ", "world"]);
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;

use crate::domain::chat::RunStatus;
use crate::domain::foundation::{BackendSessionId, RunId};
use crate::ports::{AgentBackend, AgentBackendError, OutputMessage, RunSnapshot};

/// Output revealed by one scripted step.
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// A new assistant message with the given text.
    NewMessage(String),
    /// Text appended to the most recent assistant message.
    Extend(String),
}

/// One status poll of a scripted run.
#[derive(Debug, Clone)]
pub struct MockRunStep {
    pub status: RunStatus,
    pub output: Vec<MockOutput>,
    pub error: Option<(String, String)>,
}

impl MockRunStep {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            output: Vec::new(),
            error: None,
        }
    }

    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.output.push(MockOutput::NewMessage(text.into()));
        self
    }

    pub fn with_extension(mut self, text: impl Into<String>) -> Self {
        self.output.push(MockOutput::Extend(text.into()));
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some((code.into(), message.into()));
        self
    }
}

#[derive(Debug, Default)]
struct RunState {
    session_id: String,
    step: usize,
    messages: Vec<OutputMessage>,
    last: Option<RunSnapshot>,
}

#[derive(Debug, Default)]
struct MockState {
    session_failures: Vec<AgentBackendError>,
    posted: Vec<(String, String)>,
    runs: HashMap<String, RunState>,
    cancelled: Vec<String>,
}

/// Mock hosted agent for testing.
#[derive(Debug, Clone)]
pub struct MockAgentBackend {
    script: Arc<Vec<MockRunStep>>,
    state: Arc<Mutex<MockState>>,
    session_delay: Duration,
    poll_delay: Duration,
    run_error: Option<AgentBackendError>,
    session_counter: Arc<AtomicUsize>,
    run_counter: Arc<AtomicUsize>,
    poll_counter: Arc<AtomicUsize>,
}

impl Default for MockAgentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgentBackend {
    /// Creates a backend whose runs complete immediately with no output.
    pub fn new() -> Self {
        Self {
            script: Arc::new(vec![MockRunStep::new(RunStatus::Completed)]),
            state: Arc::new(Mutex::new(MockState::default())),
            session_delay: Duration::ZERO,
            poll_delay: Duration::ZERO,
            run_error: None,
            session_counter: Arc::new(AtomicUsize::new(0)),
            run_counter: Arc::new(AtomicUsize::new(0)),
            poll_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the run script.
    pub fn with_script(mut self, steps: Vec<MockRunStep>) -> Self {
        self.script = Arc::new(steps);
        self
    }

    /// Each poll reveals one fragment as a new message; the run then completes.
    pub fn with_fragments<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<MockRunStep> = fragments
            .into_iter()
            .map(|f| MockRunStep::new(RunStatus::InProgress).with_message(f))
            .collect();
        steps.push(MockRunStep::new(RunStatus::Completed));
        self.with_script(steps)
    }

    /// Each poll reveals one fragment; the run then fails with `message`.
    pub fn with_fragments_then_failure<I, S>(self, fragments: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<MockRunStep> = fragments
            .into_iter()
            .map(|f| MockRunStep::new(RunStatus::InProgress).with_message(f))
            .collect();
        steps.push(MockRunStep::new(RunStatus::Failed).with_error("server_error", message));
        self.with_script(steps)
    }

    /// Makes the next `count` session creations fail with `error`.
    pub fn with_session_failures(self, count: usize, error: AgentBackendError) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.session_failures = vec![error; count];
        }
        self
    }

    /// Makes every run creation fail with `error`.
    pub fn with_run_error(mut self, error: AgentBackendError) -> Self {
        self.run_error = Some(error);
        self
    }

    /// Simulated latency of session creation.
    pub fn with_session_delay(mut self, delay: Duration) -> Self {
        self.session_delay = delay;
        self
    }

    /// Simulated latency of each status poll.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Number of successful and failed session creations.
    pub fn session_calls(&self) -> usize {
        self.session_counter.load(Ordering::SeqCst)
    }

    /// Number of runs started.
    pub fn run_calls(&self) -> usize {
        self.run_counter.load(Ordering::SeqCst)
    }

    /// Number of status polls.
    pub fn poll_calls(&self) -> usize {
        self.poll_counter.load(Ordering::SeqCst)
    }

    /// Messages posted so far as `(session_id, content)` pairs.
    pub fn posted_messages(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).posted.clone()
    }

    /// Ids of runs the caller asked to cancel.
    pub fn cancelled_runs(&self) -> Vec<String> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).cancelled.clone()
    }

    fn apply_output(messages: &mut Vec<OutputMessage>, output: &[MockOutput]) {
        for item in output {
            match item {
                MockOutput::NewMessage(text) => {
                    let id = format!("msg_{}", messages.len() + 1);
                    messages.push(OutputMessage::new(id, text.clone()));
                }
                MockOutput::Extend(text) => match messages.last_mut() {
                    Some(last) => last.text.push_str(text),
                    None => messages.push(OutputMessage::new("msg_1", text.clone())),
                },
            }
        }
    }
}

#[async_trait]
impl AgentBackend for MockAgentBackend {
    async fn create_session(&self) -> Result<BackendSessionId, AgentBackendError> {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.session_delay.is_zero() {
            sleep(self.session_delay).await;
        }

        let failure = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .session_failures
            .pop();
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(BackendSessionId::new(format!("thread_{}", n)))
    }

    async fn post_message(
        &self,
        session_id: &BackendSessionId,
        content: &str,
    ) -> Result<(), AgentBackendError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .posted
            .push((session_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn create_run(
        &self,
        session_id: &BackendSessionId,
    ) -> Result<RunSnapshot, AgentBackendError> {
        if let Some(err) = &self.run_error {
            return Err(err.clone());
        }

        let n = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let run_id = RunId::new(format!("run_{}", n));
        self.state.lock().unwrap_or_else(PoisonError::into_inner).runs.insert(
            run_id.to_string(),
            RunState {
                session_id: session_id.to_string(),
                ..RunState::default()
            },
        );
        Ok(RunSnapshot::new(run_id, RunStatus::Queued))
    }

    async fn get_run(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<RunSnapshot, AgentBackendError> {
        self.poll_counter.fetch_add(1, Ordering::SeqCst);

        if !self.poll_delay.is_zero() {
            sleep(self.poll_delay).await;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let run = state
            .runs
            .get_mut(run_id.as_str())
            .filter(|r| r.session_id == session_id.as_str())
            .ok_or_else(|| AgentBackendError::NotFound(format!("run {}", run_id)))?;

        if let Some(step) = self.script.get(run.step) {
            run.step += 1;
            Self::apply_output(&mut run.messages, &step.output);
            let mut snapshot = RunSnapshot::new(run_id.clone(), step.status);
            if let Some((code, message)) = &step.error {
                snapshot = snapshot.with_error(code.clone(), message.clone());
            }
            run.last = Some(snapshot);
        }

        Ok(run
            .last
            .clone()
            .unwrap_or_else(|| RunSnapshot::new(run_id.clone(), RunStatus::Completed)))
    }

    async fn list_output(
        &self,
        _session_id: &BackendSessionId,
        run_id: &RunId,
        after: Option<&str>,
    ) -> Result<Vec<OutputMessage>, AgentBackendError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let run = state
            .runs
            .get(run_id.as_str())
            .ok_or_else(|| AgentBackendError::NotFound(format!("run {}", run_id)))?;

        let start = after
            .and_then(|id| run.messages.iter().position(|m| m.id == id))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        Ok(run.messages[start..].to_vec())
    }

    async fn cancel_run(
        &self,
        _session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<(), AgentBackendError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
            .push(run_id.to_string());
        Ok(())
    }
}
