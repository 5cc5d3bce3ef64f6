//! OpenAI Assistants API client

use crate::core::remote::{
    AssistantDefinition, AssistantProvider, MessageRole, RemoteAssistant, RemoteError, RemoteFile,
    Run, Thread, ThreadMessage,
};
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_ASSISTANTS: &str = "assistants=v2";
const MESSAGE_PAGE_SIZE: u32 = 20;

pub struct OpenAiAssistantProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[injectable(AssistantProvider)]
impl OpenAiAssistantProvider {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> OpenAiAssistantProvider {
        OpenAiAssistantProvider::new(
            settings.openai_base_url.clone(),
            settings.openai_api_key.clone(),
        )
    }
}

impl OpenAiAssistantProvider {
    pub fn new(base_url: String, api_key: String) -> OpenAiAssistantProvider {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        OpenAiAssistantProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.delete(self.url(path)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_ASSISTANTS)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Upstream {
                status,
                message: format!("unexpected response body: {e}"),
            })
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Maps a non-success response onto the closed set of remote errors.
fn error_for_status(status: u16, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_owned());

    match status {
        400 | 422 => RemoteError::Validation(message),
        404 => RemoteError::NotFound(message),
        429 => RemoteError::RateLimited(message),
        _ => RemoteError::Upstream { status, message },
    }
}

#[derive(Serialize)]
struct AssistantBody<'a> {
    model: &'a str,
    name: &'a str,
    instructions: &'a str,
    tools: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_resources: Option<serde_json::Value>,
}

impl<'a> AssistantBody<'a> {
    fn from_definition(definition: &'a AssistantDefinition) -> Self {
        AssistantBody {
            model: &definition.model,
            name: &definition.name,
            instructions: &definition.instructions,
            tools: json!([{ "type": "code_interpreter" }]),
            tool_resources: definition
                .file_ids
                .as_ref()
                .map(|ids| json!({ "code_interpreter": { "file_ids": ids } })),
        }
    }
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    role: MessageRole,
    created_at: i64,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text { text: WireText },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
}

impl From<WireMessage> for ThreadMessage {
    fn from(message: WireMessage) -> Self {
        let text = message
            .content
            .into_iter()
            .filter_map(|part| match part {
                WireContent::Text { text } => Some(text.value),
                WireContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        ThreadMessage {
            id: message.id,
            role: message.role,
            created_at: message.created_at,
            run_id: message.run_id,
            text,
        }
    }
}

#[async_trait]
impl AssistantProvider for OpenAiAssistantProvider {
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<RemoteFile, RemoteError> {
        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name.to_owned()));

        self.send(self.post("files").multipart(form)).await
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), RemoteError> {
        let _: serde_json::Value = self.send(self.delete(&format!("files/{file_id}"))).await?;
        Ok(())
    }

    async fn create_assistant(
        &self,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError> {
        let body = AssistantBody::from_definition(&definition);
        self.send(self.post("assistants").json(&body)).await
    }

    async fn retrieve_assistant(&self, remote_id: &str) -> Result<RemoteAssistant, RemoteError> {
        self.send(self.get(&format!("assistants/{remote_id}"))).await
    }

    async fn update_assistant(
        &self,
        remote_id: &str,
        definition: AssistantDefinition,
    ) -> Result<RemoteAssistant, RemoteError> {
        let body = AssistantBody::from_definition(&definition);
        self.send(self.post(&format!("assistants/{remote_id}")).json(&body))
            .await
    }

    async fn delete_assistant(&self, remote_id: &str) -> Result<(), RemoteError> {
        let _: serde_json::Value = self
            .send(self.delete(&format!("assistants/{remote_id}")))
            .await?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<Thread, RemoteError> {
        self.send(self.post("threads").json(&json!({}))).await
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread, RemoteError> {
        self.send(self.get(&format!("threads/{thread_id}"))).await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<ThreadMessage, RemoteError> {
        let message: WireMessage = self
            .send(
                self.post(&format!("threads/{thread_id}/messages"))
                    .json(&json!({ "role": "user", "content": content })),
            )
            .await?;
        Ok(message.into())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, RemoteError> {
        let run: Run = self
            .send(
                self.post(&format!("threads/{thread_id}/runs"))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        debug!("created run {} on thread {thread_id}: {:?}", run.id, run.status);
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, RemoteError> {
        self.send(self.get(&format!("threads/{thread_id}/runs/{run_id}")))
            .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, RemoteError> {
        let list: MessageList = self
            .send(
                self.get(&format!("threads/{thread_id}/messages"))
                    .query(&[("order", "desc".to_owned()), ("limit", MESSAGE_PAGE_SIZE.to_string())]),
            )
            .await?;
        Ok(list.data.into_iter().map(ThreadMessage::from).collect())
    }
}
