//! Shared fixtures for the integration tests.
//!
//! The fake provider keeps its state in a global so tests can inspect the
//! "remote" side after driving the HTTP API. Tests using it are serialized.

#![allow(dead_code)]

use assistant_hub::api;
use assistant_hub::core::poller::PollPolicy;
use assistant_hub::core::remote::{
    AssistantDefinition, AssistantProvider, MessageRole, RemoteAssistant, RemoteError, RemoteFile,
    Run, RunStatus, Thread, ThreadMessage,
};
use assistant_hub::core::services::{MyAccountService, MyAssistantService, MyChatService};
use assistant_hub::infrastructure::database::DatabaseConnection;
use assistant_hub::infrastructure::repositories::{
    DbAssistantRepository, DbChatRepository, DbUserRepository,
};
use assistant_hub::infrastructure::settings::Settings;
use assistant_hub::infrastructure::storage::MediaStorage;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use di::{Injectable, ServiceCollection, inject, injectable};
use di_axum::RouterServiceProviderExtensions;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tower::ServiceExt;

/// Marker that makes the fake fail the run instead of answering.
pub const FAIL_RUN: &str = "[fail-run]";
/// Marker that makes the fake complete the run without a reply.
pub const SILENT_RUN: &str = "[silent-run]";
/// Assistant names containing this are rejected by the fake.
pub const REJECTED_NAME: &str = "[rejected]";

struct FakeRun {
    run: Run,
    polls_left: u32,
}

pub struct FakeState {
    counter: u64,
    pub assistants: BTreeMap<String, RemoteAssistant>,
    pub attached_files: BTreeMap<String, Vec<String>>,
    pub threads: BTreeMap<String, Vec<ThreadMessage>>,
    runs: BTreeMap<String, FakeRun>,
    /// Remote file id to file name, for files not deleted yet.
    pub uploaded_files: BTreeMap<String, String>,
    pub run_polls: u32,
}

impl FakeState {
    const fn new() -> Self {
        FakeState {
            counter: 0,
            assistants: BTreeMap::new(),
            attached_files: BTreeMap::new(),
            threads: BTreeMap::new(),
            runs: BTreeMap::new(),
            uploaded_files: BTreeMap::new(),
            run_polls: 0,
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{:04}", self.counter)
    }

    fn tick(&mut self) -> i64 {
        self.counter += 1;
        self.counter as i64
    }
}

static FAKE_STATE: Mutex<FakeState> = Mutex::new(FakeState::new());

pub fn fake_state() -> std::sync::MutexGuard<'static, FakeState> {
    FAKE_STATE.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn reset_fake() {
    *fake_state() = FakeState::new();
}

/// Stands in for the remote provider; every run goes queued, in_progress,
/// then completed with a canned reply.
pub struct FakeProvider;

#[injectable(AssistantProvider)]
impl FakeProvider {
    #[inject]
    pub fn create() -> FakeProvider {
        FakeProvider
    }
}

fn not_found(what: &str, id: &str) -> RemoteError {
    RemoteError::NotFound(format!("No {what} found with id '{id}'."))
}

fn remote_assistant(id: String, definition: &AssistantDefinition) -> RemoteAssistant {
    RemoteAssistant {
        id,
        name: Some(definition.name.clone()),
        instructions: Some(definition.instructions.clone()),
        model: definition.model.clone(),
    }
}

#[async_trait]
impl AssistantProvider for FakeProvider {
    async fn upload_file(&self, file_name: &str, _bytes: Vec<u8>) -> Result<RemoteFile, RemoteError> {
        let mut state = fake_state();
        let id = state.next_id("file");
        state.uploaded_files.insert(id.clone(), file_name.to_owned());
        Ok(RemoteFile {
            id,
            filename: Some(file_name.to_owned()),
        })
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        fake_state()
            .uploaded_files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| not_found("file", file_id))
    }

    async fn create_assistant(
        &self,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError> {
        if definition.name.contains(REJECTED_NAME) {
            return Err(RemoteError::Validation("name is not allowed".to_owned()));
        }
        let mut state = fake_state();
        let id = state.next_id("asst");
        let assistant = remote_assistant(id.clone(), &definition);
        state.assistants.insert(id.clone(), assistant.clone());
        state
            .attached_files
            .insert(id, definition.file_ids.unwrap_or_default());
        Ok(assistant)
    }

    async fn retrieve_assistant(&self, remote_id: &str) -> Result<RemoteAssistant, RemoteError> {
        fake_state()
            .assistants
            .get(remote_id)
            .cloned()
            .ok_or_else(|| not_found("assistant", remote_id))
    }

    async fn update_assistant(
        &self,
        remote_id: &str,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError> {
        let mut state = fake_state();
        if !state.assistants.contains_key(remote_id) {
            return Err(not_found("assistant", remote_id));
        }
        let assistant = remote_assistant(remote_id.to_owned(), &definition);
        state
            .assistants
            .insert(remote_id.to_owned(), assistant.clone());
        if let Some(file_ids) = definition.file_ids {
            state.attached_files.insert(remote_id.to_owned(), file_ids);
        }
        Ok(assistant)
    }

    async fn delete_assistant(&self, remote_id: &str) -> Result<(), RemoteError> {
        fake_state()
            .assistants
            .remove(remote_id)
            .map(|_| ())
            .ok_or_else(|| not_found("assistant", remote_id))
    }

    async fn create_thread(&self) -> Result<Thread, RemoteError> {
        let mut state = fake_state();
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(Thread { id })
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, RemoteError> {
        if fake_state().threads.contains_key(thread_id) {
            Ok(Thread {
                id: thread_id.to_owned(),
            })
        } else {
            Err(not_found("thread", thread_id))
        }
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, RemoteError> {
        let mut state = fake_state();
        let message = ThreadMessage {
            id: state.next_id("msg"),
            role: MessageRole::User,
            created_at: state.tick(),
            run_id: None,
            text: content.to_owned(),
        };
        state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| not_found("thread", thread_id))?
            .push(message.clone());
        Ok(message)
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, RemoteError> {
        let mut state = fake_state();
        if !state.threads.contains_key(thread_id) {
            return Err(not_found("thread", thread_id));
        }
        if !state.assistants.contains_key(assistant_id) {
            return Err(not_found("assistant", assistant_id));
        }
        let run = Run {
            id: state.next_id("run"),
            thread_id: thread_id.to_owned(),
            assistant_id: assistant_id.to_owned(),
            status: RunStatus::Queued,
            failed_at: None,
            last_error: None,
        };
        state.runs.insert(
            run.id.clone(),
            FakeRun {
                run: run.clone(),
                polls_left: 1,
            },
        );
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RemoteError> {
        let mut state = fake_state();
        state.run_polls += 1;
        let mut fake = state
            .runs
            .remove(run_id)
            .filter(|r| r.run.thread_id == thread_id)
            .ok_or_else(|| not_found("run", run_id))?;

        if fake.run.status.is_pending() {
            if fake.polls_left > 0 {
                fake.polls_left -= 1;
                fake.run.status = RunStatus::InProgress;
            } else {
                let last_input = state
                    .threads
                    .get(thread_id)
                    .and_then(|messages| messages.last())
                    .map(|m| m.text.clone())
                    .unwrap_or_default();
                if last_input.contains(FAIL_RUN) {
                    fake.run.status = RunStatus::Failed;
                    fake.run.failed_at = Some(state.tick());
                } else {
                    if !last_input.contains(SILENT_RUN) {
                        let name = state
                            .assistants
                            .get(&fake.run.assistant_id)
                            .and_then(|a| a.name.clone())
                            .unwrap_or_default();
                        let reply = ThreadMessage {
                            id: state.next_id("msg"),
                            role: MessageRole::Assistant,
                            created_at: state.tick(),
                            run_id: Some(fake.run.id.clone()),
                            text: format!("{name} here, how can I help?"),
                        };
                        if let Some(messages) = state.threads.get_mut(thread_id) {
                            messages.push(reply);
                        }
                    }
                    fake.run.status = RunStatus::Completed;
                }
            }
        }

        let run = fake.run.clone();
        state.runs.insert(run_id.to_owned(), fake);
        Ok(run)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RemoteError> {
        let state = fake_state();
        let mut messages = state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| not_found("thread", thread_id))?;
        messages.reverse();
        Ok(messages)
    }
}

/// Counter for unique test database URIs
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn test_settings(media_root: PathBuf) -> Settings {
    Settings {
        media_root,
        bcrypt_cost: 4,
        poll_policy: PollPolicy {
            interval: Duration::from_millis(1),
            backoff: 1.0,
            max_interval: Duration::from_millis(1),
            max_attempts: 10,
        },
        ..Settings::default()
    }
}

/// Fresh in-memory database, test settings and an empty fake provider.
///
/// The pool and settings are installed globally so the DI-created
/// `DatabaseConnection` and `Settings` pick them up.
pub async fn setup() -> SqlitePool {
    let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_url = format!(
        "sqlite:file:hubtestdb{}_{}?mode=memory&cache=shared",
        std::process::id(),
        db_num
    );

    let pool = SqlitePool::connect(&db_url).await.unwrap();
    DatabaseConnection::from_pool(pool.clone())
        .migrate()
        .await
        .unwrap();

    DatabaseConnection::set_test_pool(pool.clone());
    Settings::set_test_settings(test_settings(std::env::temp_dir().join(format!(
        "assistant-hub-media-{}-{}",
        std::process::id(),
        db_num
    ))));
    reset_fake();

    pool
}

/// Uploads currently stored under the test media root.
pub fn stored_uploads() -> Vec<PathBuf> {
    let dir = Settings::create().media_root.join("files");
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

pub fn cleanup() {
    DatabaseConnection::clear_test_pool();
    Settings::clear_test_settings();
}

pub fn create_test_app() -> axum::Router {
    let provider = ServiceCollection::new()
        .add(Settings::transient())
        .add(DatabaseConnection::transient())
        .add(MediaStorage::transient())
        .add(FakeProvider::singleton())
        .add(DbAssistantRepository::scoped())
        .add(DbChatRepository::scoped())
        .add(DbUserRepository::scoped())
        .add(MyAssistantService::scoped())
        .add(MyChatService::scoped())
        .add(MyAccountService::scoped())
        .build_provider()
        .unwrap();

    api::router().with_provider(provider)
}

/// Sends a request and returns the status with the JSON body (`Null` when empty).
pub async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

/// Signs up `username` and returns its token.
pub async fn signup(app: &axum::Router, username: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/users/",
        None,
        Some(serde_json::json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "s3cret-pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        Method::POST,
        "/tokens/",
        None,
        Some(serde_json::json!({ "username": username, "password": "s3cret-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    body["token"].as_str().unwrap().to_owned()
}
