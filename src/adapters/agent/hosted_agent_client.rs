//! Hosted Agent Client - Implementation of AgentBackend over HTTP.
//!
//! Talks to a threads/runs style agent service:
//!
//! | Primitive       | Request                                              |
//! |-----------------|------------------------------------------------------|
//! | create session  | `POST {base}/threads`                                |
//! | post message    | `POST {base}/threads/{thread}/messages`              |
//! | create run      | `POST {base}/threads/{thread}/runs`                  |
//! | get run         | `GET  {base}/threads/{thread}/runs/{run}`            |
//! | list output     | `GET  {base}/threads/{thread}/messages?order=asc...` |
//!
//! Message listings are paged; `list_output` follows `has_more` until the
//! newest message is reached.
//! | cancel run      | `POST {base}/threads/{thread}/runs/{run}/cancel`     |
//!
//! # Configuration
//!
//! ```ignore
//! let config = HostedAgentConfig::new("https://agents.example.com", api_key, "asst_123")
//!     .with_api_version("2025-05-01")
//!     .with_max_retries(2);
//!
//! let client = HostedAgentClient::new(config)?;
//! ```

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Page size requested when listing messages (the API maximum).
const MESSAGE_PAGE_LIMIT: u32 = 100;

use crate::domain::chat::RunStatus;
use crate::domain::foundation::{BackendSessionId, RunId};
use crate::ports::{AgentBackend, AgentBackendError, OutputMessage, RunFailure, RunSnapshot};

/// Configuration for the hosted agent client.
#[derive(Debug, Clone)]
pub struct HostedAgentConfig {
    /// Base URL of the agent service, without trailing slash.
    pub base_url: String,
    /// API key sent in the `api-key` header.
    api_key: Secret<String>,
    /// Agent (assistant) that runs are started against.
    pub assistant_id: String,
    /// Optional `api-version` query parameter.
    pub api_version: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
}

impl HostedAgentConfig {
    /// Creates a new configuration.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: Secret::new(api_key.into()),
            assistant_id: assistant_id.into(),
            api_version: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    /// Sets the API version query parameter.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// HTTP implementation of the hosted agent port.
pub struct HostedAgentClient {
    config: HostedAgentConfig,
    client: Client,
}

impl HostedAgentClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: HostedAgentConfig) -> Result<Self, AgentBackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentBackendError::InvalidRequest(format!("HTTP client setup: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Sends a request once and maps transport failures.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response, AgentBackendError> {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("api-key", self.config.api_key())
            .query(query);

        if let Some(version) = &self.config.api_version {
            request = request.query(&[("api-version", version.as_str())]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentBackendError::Timeout {
                    timeout_secs: self.config.timeout.as_secs() as u32,
                }
            } else if e.is_connect() {
                AgentBackendError::network(format!("Connection failed: {}", e))
            } else {
                AgentBackendError::network(e.to_string())
            }
        })?;

        Self::handle_response_status(response).await
    }

    /// Sends a request with retries and decodes the JSON body.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, AgentBackendError> {
        let mut retry_count = 0;

        loop {
            let attempt = match self.send_once(method.clone(), path, query, body.as_ref()).await {
                Ok(response) => response.json::<T>().await.map_err(|e| {
                    AgentBackendError::parse(format!("Failed to parse response: {}", e))
                }),
                Err(err) => Err(err),
            };

            match attempt {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    // Exponential backoff: 250ms, 500ms, 1s, ...
                    let delay = Duration::from_millis(250 << retry_count.min(6));
                    tracing::warn!(
                        path,
                        attempt = retry_count + 1,
                        error = %err,
                        "Agent request failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    retry_count += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Parses the API response status and handles errors.
    async fn handle_response_status(response: Response) -> Result<Response, AgentBackendError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 | 403 => Err(AgentBackendError::AuthenticationFailed),
            404 => Err(AgentBackendError::NotFound(error_body)),
            429 => Err(AgentBackendError::RateLimited {
                retry_after_secs: Self::parse_retry_after(&error_body),
            }),
            400 | 409 | 422 => Err(AgentBackendError::InvalidRequest(error_body)),
            500..=599 => Err(AgentBackendError::unavailable(format!(
                "Server error {}: {}",
                status, error_body
            ))),
            _ => Err(AgentBackendError::network(format!(
                "Unexpected status {}: {}",
                status, error_body
            ))),
        }
    }

    /// Extracts "retry after N seconds" from an error body, defaulting to 30.
    fn parse_retry_after(error_body: &str) -> u32 {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(error_body) {
            if let Some(msg) = parsed
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                if let Some(idx) = msg.find("retry after ") {
                    let digits: String = msg[idx + 12..]
                        .chars()
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    if let Ok(secs) = digits.parse::<u32>() {
                        return secs;
                    }
                }
            }
        }
        30
    }
}

#[async_trait]
impl AgentBackend for HostedAgentClient {
    async fn create_session(&self) -> Result<BackendSessionId, AgentBackendError> {
        let thread: ApiObject = self
            .execute(Method::POST, "/threads", &[], Some(serde_json::json!({})))
            .await?;
        Ok(BackendSessionId::new(thread.id))
    }

    async fn post_message(
        &self,
        session_id: &BackendSessionId,
        content: &str,
    ) -> Result<(), AgentBackendError> {
        let body = serde_json::to_value(CreateMessageRequest {
            role: "user",
            content,
        })
        .map_err(|e| AgentBackendError::parse(e.to_string()))?;

        let _: ApiObject = self
            .execute(
                Method::POST,
                &format!("/threads/{}/messages", session_id),
                &[],
                Some(body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        session_id: &BackendSessionId,
    ) -> Result<RunSnapshot, AgentBackendError> {
        let body = serde_json::to_value(CreateRunRequest {
            assistant_id: &self.config.assistant_id,
        })
        .map_err(|e| AgentBackendError::parse(e.to_string()))?;

        let run: ApiRun = self
            .execute(
                Method::POST,
                &format!("/threads/{}/runs", session_id),
                &[],
                Some(body),
            )
            .await?;
        Ok(run.into())
    }

    async fn get_run(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<RunSnapshot, AgentBackendError> {
        let run: ApiRun = self
            .execute(
                Method::GET,
                &format!("/threads/{}/runs/{}", session_id, run_id),
                &[],
                None,
            )
            .await?;
        Ok(run.into())
    }

    async fn list_output(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
        after: Option<&str>,
    ) -> Result<Vec<OutputMessage>, AgentBackendError> {
        let path = format!("/threads/{}/messages", session_id);
        let mut cursor = after.map(str::to_string);
        let mut output = Vec::new();

        loop {
            let mut query = vec![
                ("order", "asc".to_string()),
                ("limit", MESSAGE_PAGE_LIMIT.to_string()),
                ("run_id", run_id.to_string()),
            ];
            if let Some(after) = &cursor {
                query.push(("after", after.clone()));
            }

            let page: ApiMessageList = self.execute(Method::GET, &path, &query, None).await?;
            let next = page.next_cursor();
            output.extend(page.into_assistant_output());

            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(output)
    }

    async fn cancel_run(
        &self,
        session_id: &BackendSessionId,
        run_id: &RunId,
    ) -> Result<(), AgentBackendError> {
        let _: ApiRun = self
            .execute(
                Method::POST,
                &format!("/threads/{}/runs/{}/cancel", session_id, run_id),
                &[],
                None,
            )
            .await?;
        Ok(())
    }
}

// ----- Agent API Types -----

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunFailure>,
}

impl From<ApiRun> for RunSnapshot {
    fn from(run: ApiRun) -> Self {
        RunSnapshot {
            id: RunId::new(run.id),
            status: run.status,
            last_error: run.last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessageList {
    data: Vec<ApiMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

impl ApiMessageList {
    /// Cursor for the following page, if the listing continues.
    fn next_cursor(&self) -> Option<String> {
        if !self.has_more {
            return None;
        }
        self.last_id
            .clone()
            .or_else(|| self.data.last().map(|m| m.id.clone()))
    }

    fn into_assistant_output(self) -> impl Iterator<Item = OutputMessage> {
        self.data
            .into_iter()
            .filter(|m| m.role == "assistant")
            .map(ApiMessage::into_output)
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<ApiContent>,
}

impl ApiMessage {
    /// Concatenates the text parts; non-text parts are skipped.
    fn into_output(self) -> OutputMessage {
        let text = self
            .content
            .into_iter()
            .filter_map(|part| match part {
                ApiContent::Text { text } => Some(text.value),
                ApiContent::Other => None,
            })
            .collect::<String>();
        OutputMessage::new(self.id, text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text { text: ApiText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_works() {
        let config = HostedAgentConfig::new("https://agents.example.com/", "key", "asst_1")
            .with_api_version("2025-05-01")
            .with_timeout(Duration::from_secs(10))
            .with_max_retries(5);

        assert_eq!(config.base_url, "https://agents.example.com");
        assert_eq!(config.assistant_id, "asst_1");
        assert_eq!(config.api_version.as_deref(), Some("2025-05-01"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.api_key(), "key");
    }

    #[test]
    fn config_debug_does_not_leak_key() {
        let config = HostedAgentConfig::new("https://a", "super-secret", "asst");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }

    #[test]
    fn url_joins_base_and_path() {
        let config = HostedAgentConfig::new("https://a.example", "k", "asst");
        let client = HostedAgentClient::new(config).unwrap();
        assert_eq!(client.url("/threads"), "https://a.example/threads");
    }

    #[test]
    fn run_response_parses_status_and_error() {
        let json = r#"{
            "id": "run_abc",
            "object": "thread.run",
            "status": "failed",
            "last_error": {"code": "server_error", "message": "Something broke"}
        }"#;
        let run: ApiRun = serde_json::from_str(json).unwrap();
        let snapshot: RunSnapshot = run.into();

        assert_eq!(snapshot.id.as_str(), "run_abc");
        assert_eq!(snapshot.status, RunStatus::Failed);
        assert_eq!(snapshot.last_error.unwrap().code, "server_error");
    }

    #[test]
    fn run_response_without_error() {
        let json = r#"{"id":"run_1","status":"in_progress","last_error":null}"#;
        let run: ApiRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert!(run.last_error.is_none());
    }

    #[test]
    fn message_list_keeps_text_parts_only() {
        let json = r#"{
            "data": [
                {"id": "msg_1", "role": "assistant", "content": [
                    {"type": "text", "text": {"value": "Your fleet has ", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "f1"}},
                    {"type": "text", "text": {"value": "12 vehicles.", "annotations": []}}
                ]},
                {"id": "msg_0", "role": "user", "content": [
                    {"type": "text", "text": {"value": "How many vehicles?"}}
                ]}
            ],
            "has_more": false
        }"#;
        let page: ApiMessageList = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_cursor(), None);

        let outputs: Vec<_> = page.into_assistant_output().collect();
        assert_eq!(outputs, vec![OutputMessage::new("msg_1", "Your fleet has 12 vehicles.")]);
    }

    #[test]
    fn message_list_with_more_pages_continues_after_last_id() {
        let json = r#"{
            "data": [
                {"id": "msg_5", "role": "assistant", "content": []},
                {"id": "msg_6", "role": "user", "content": []}
            ],
            "first_id": "msg_5",
            "last_id": "msg_6",
            "has_more": true
        }"#;
        let page: ApiMessageList = serde_json::from_str(json).unwrap();

        assert_eq!(page.next_cursor().as_deref(), Some("msg_6"));
    }

    #[test]
    fn message_list_without_last_id_uses_final_message() {
        let json = r#"{
            "data": [
                {"id": "msg_1", "role": "assistant", "content": []},
                {"id": "msg_2", "role": "assistant", "content": []}
            ],
            "has_more": true
        }"#;
        let page: ApiMessageList = serde_json::from_str(json).unwrap();

        assert_eq!(page.next_cursor().as_deref(), Some("msg_2"));
    }

    #[test]
    fn empty_page_claiming_more_stops_paging() {
        let page: ApiMessageList =
            serde_json::from_str(r#"{"data": [], "has_more": true}"#).unwrap();

        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn parse_retry_after_from_message() {
        let error = r#"{"error":{"message":"Rate limit is exceeded. Please retry after 12 seconds."}}"#;
        assert_eq!(HostedAgentClient::parse_retry_after(error), 12);
    }

    #[test]
    fn parse_retry_after_default() {
        assert_eq!(HostedAgentClient::parse_retry_after("not json"), 30);
        assert_eq!(
            HostedAgentClient::parse_retry_after(r#"{"error":{"message":"nope"}}"#),
            30
        );
    }
}
