//! Remote assistant provider abstraction.
//!
//! The provider hosts the assistant resources, conversation threads and runs.
//! Everything in here is provider agnostic; the HTTP implementation lives in
//! `infrastructure::openai`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a provider call can fail, as seen by the services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote rejected the request: {0}")]
    Validation(String),
    #[error("remote resource not found: {0}")]
    NotFound(String),
    #[error("remote rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("failed to reach remote service: {0}")]
    Connection(String),
    #[error("remote service error ({status}): {message}")]
    Upstream { status: u16, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteAssistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: String,
}

/// What we ask the provider to create or update an assistant with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// `None` leaves the attached files untouched on update.
    pub file_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// The run is still being worked on by the provider.
    pub fn is_pending(self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub failed_at: Option<i64>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    pub created_at: i64,
    /// The run that wrote the message; `None` for user messages.
    pub run_id: Option<String>,
    /// Concatenated text parts; other content kinds are dropped.
    pub text: String,
}

/// Picks the reply `run_id` produced from a newest-first message list.
///
/// Answers of earlier runs on the same thread never qualify.
pub fn run_reply<'a>(messages: &'a [ThreadMessage], run_id: &str) -> Option<&'a ThreadMessage> {
    messages.iter().find(|m| {
        m.role == MessageRole::Assistant
            && m.run_id.as_deref() == Some(run_id)
            && !m.text.is_empty()
    })
}

#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>)
    -> Result<RemoteFile, RemoteError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError>;

    async fn create_assistant(
        &self,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError>;

    async fn retrieve_assistant(&self, remote_id: &str) -> Result<RemoteAssistant, RemoteError>;

    async fn update_assistant(
        &self,
        remote_id: &str,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError>;

    async fn delete_assistant(&self, remote_id: &str) -> Result<(), RemoteError>;

    async fn create_thread(&self) -> Result<Thread, RemoteError>;

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, RemoteError>;

    /// Posts a `user` message to the thread.
    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, RemoteError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, RemoteError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RemoteError>;

    /// Messages on the thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RemoteError>;
}
