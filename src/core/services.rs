//! Implementations for the service the app needs.
//!

use crate::core::errors::{
    BAD_CREDENTIALS, BLANK_FIELD, FieldErrors, NON_FIELD_ERRORS, REQUIRED_FIELD, ServiceError,
};
use crate::core::forms::{
    CreateAssistant, CreateChat, Credentials, RegisterUser, UpdateAssistant, UpdateChat,
    UploadedFile,
};
use crate::core::poller::RunPoller;
use crate::core::remote::{
    AssistantDefinition, AssistantProvider, RemoteError, RunStatus, run_reply,
};
use crate::core::traits::{AccountService, AssistantService, ChatService};
use crate::infrastructure::entities::{
    Assistant, AuthToken, Chat, NewAssistant, NewChat, NewUser, User,
};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::storage::MediaStorage;
use crate::infrastructure::traits::{AssistantRepository, ChatRepository, UserRepository};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{error, info, warn};
use uuid::Uuid;

const PERSONA_GUIDANCE: &str = "You read and analyse files if possible. \
You are designed to make customers feel like they're chatting with a real help desk agent. \
You are trained to communicate naturally and to answer user's questions in a way that mimics human interaction. \
You can base your answers and refer to previous messages from the user. \
End your message with a question if more clarity is needed. \
Answer as short as possible, without missing crucial information.";

/// Instructions sent to the provider for an assistant.
pub fn remote_instructions(name: &str, company_name: &str, instructions: &str) -> String {
    format!(
        "Your name is {name}, an assistant working for {company_name}. {instructions}\n\n{PERSONA_GUIDANCE}"
    )
}

#[injectable(AssistantService)]
pub struct MyAssistantService {
    repo: Ref<dyn AssistantRepository>,
    provider: Ref<dyn AssistantProvider>,
    storage: Ref<MediaStorage>,
    settings: Ref<Settings>,
}

impl MyAssistantService {
    pub fn new(
        repo: Ref<dyn AssistantRepository>,
        provider: Ref<dyn AssistantProvider>,
        storage: Ref<MediaStorage>,
        settings: Ref<Settings>,
    ) -> Self {
        Self {
            repo,
            provider,
            storage,
            settings,
        }
    }

    /// Stores the upload locally and hands it to the provider.
    ///
    /// Returns the local reference and the remote file id.
    async fn store_file(&self, file: UploadedFile) -> Result<(String, String), ServiceError> {
        let reference = self.storage.save(&file.file_name, &file.bytes).await?;
        let remote = match self.provider.upload_file(&file.file_name, file.bytes).await {
            Ok(remote) => remote,
            Err(e) => {
                if let Err(cleanup) = self.storage.remove(&reference).await {
                    warn!("stored upload {reference} left behind: {cleanup}");
                }
                return Err(e.into());
            }
        };
        info!("uploaded {reference} as remote file {}", remote.id);

        Ok((reference, remote.id))
    }

    /// Best-effort removal of an upload whose assistant never got saved.
    async fn discard_upload(&self, reference: &str, file_id: &str) {
        if let Err(e) = self.storage.remove(reference).await {
            warn!("stored upload {reference} left behind: {e}");
        }
        match self.provider.delete_file(file_id).await {
            Ok(()) => info!("discarded remote file {file_id}"),
            Err(e) => warn!("remote file {file_id} left behind: {e}"),
        }
    }

    async fn load(&self, id: i64) -> Result<Assistant, ServiceError> {
        self.repo
            .get_assistant(id)
            .await?
            .ok_or(ServiceError::NotFound("assistant"))
    }
}

#[async_trait]
impl AssistantService for MyAssistantService {
    async fn list_assistants(&self) -> Result<Vec<Assistant>, ServiceError> {
        Ok(self.repo.list_assistants().await?)
    }

    async fn get_assistant(&self, id: i64) -> Result<Assistant, ServiceError> {
        self.load(id).await
    }

    async fn create_assistant(&self, form: CreateAssistant) -> Result<Assistant, ServiceError> {
        let valid = form.validate()?;

        let upload = match form.files {
            Some(file) => Some(self.store_file(file).await?),
            None => None,
        };
        let file_ids = upload.as_ref().map(|(_, file_id)| vec![file_id.clone()]);

        let remote = self
            .provider
            .create_assistant(AssistantDefinition {
                name: valid.name.clone(),
                instructions: remote_instructions(
                    &valid.name,
                    &valid.company_name,
                    &valid.instructions,
                ),
                model: self.settings.assistant_model.clone(),
                file_ids,
            })
            .await;
        let remote = match remote {
            Ok(remote) => remote,
            Err(e) => {
                if let Some((reference, file_id)) = &upload {
                    self.discard_upload(reference, file_id).await;
                }
                return Err(e.into());
            }
        };
        info!("created remote assistant {} for {:?}", remote.id, valid.name);

        let created = self
            .repo
            .create_assistant(NewAssistant {
                name: valid.name,
                remote_id: remote.id.clone(),
                company_name: valid.company_name,
                instructions: valid.instructions,
                files: upload.as_ref().map(|(reference, _)| reference.clone()),
            })
            .await;

        match created {
            Ok(assistant) => Ok(assistant),
            Err(e) => {
                error!("failed to store assistant {}: {e}", remote.id);
                if let Err(cleanup) = self.provider.delete_assistant(&remote.id).await {
                    warn!("remote assistant {} left behind: {cleanup}", remote.id);
                }
                if let Some((reference, file_id)) = &upload {
                    self.discard_upload(reference, file_id).await;
                }
                Err(e.into())
            }
        }
    }

    async fn update_assistant(
        &self,
        id: i64,
        form: UpdateAssistant,
    ) -> Result<Assistant, ServiceError> {
        form.validate()?;
        let mut assistant = self.load(id).await?;

        if let Some(new_name) = form.new_name {
            assistant.name = new_name.trim().to_owned();
        }
        if let Some(company_name) = form.company_name {
            assistant.company_name = company_name.trim().to_owned();
        }
        if let Some(instructions) = form.instructions {
            assistant.instructions = instructions;
        }

        let upload = match form.files {
            Some(file) => Some(self.store_file(file).await?),
            None => None,
        };
        let file_ids = upload.as_ref().map(|(_, file_id)| vec![file_id.clone()]);

        let updated = self
            .provider
            .update_assistant(
                &assistant.remote_id,
                AssistantDefinition {
                    name: assistant.name.clone(),
                    instructions: remote_instructions(
                        &assistant.name,
                        &assistant.company_name,
                        &assistant.instructions,
                    ),
                    model: self.settings.assistant_model.clone(),
                    file_ids,
                },
            )
            .await;
        if let Err(e) = updated {
            if let Some((reference, file_id)) = &upload {
                self.discard_upload(reference, file_id).await;
            }
            return Err(e.into());
        }

        if let Some((reference, _)) = upload {
            assistant.files = Some(reference);
        }

        Ok(self.repo.update_assistant(assistant).await?)
    }

    async fn delete_assistant(&self, id: i64) -> Result<(), ServiceError> {
        let assistant = self.load(id).await?;

        match self.provider.delete_assistant(&assistant.remote_id).await {
            Ok(()) => info!("deleted remote assistant {}", assistant.remote_id),
            Err(RemoteError::NotFound(_)) => {
                warn!("remote assistant {} was already gone", assistant.remote_id)
            }
            Err(e) => return Err(e.into()),
        }

        if !self.repo.delete_assistant(id).await? {
            return Err(ServiceError::NotFound("assistant"));
        }

        Ok(())
    }
}

#[injectable(ChatService)]
pub struct MyChatService {
    chats: Ref<dyn ChatRepository>,
    assistants: Ref<dyn AssistantRepository>,
    provider: Ref<dyn AssistantProvider>,
    settings: Ref<Settings>,
}

impl MyChatService {
    pub fn new(
        chats: Ref<dyn ChatRepository>,
        assistants: Ref<dyn AssistantRepository>,
        provider: Ref<dyn AssistantProvider>,
        settings: Ref<Settings>,
    ) -> Self {
        Self {
            chats,
            assistants,
            provider,
            settings,
        }
    }

    /// The chat is already stored when this runs, so a failure is only logged.
    async fn count_query(&self, assistant_id: i64) {
        if let Err(e) = self.assistants.increment_query_count(assistant_id).await {
            warn!("query count of assistant {assistant_id} not updated: {e}");
        }
    }

    async fn referenced_assistant(&self, assistant_id: i64) -> Result<Assistant, ServiceError> {
        self.assistants
            .get_assistant(assistant_id)
            .await?
            .ok_or_else(|| {
                ServiceError::field(
                    "assistant_id",
                    format!("Invalid pk \"{assistant_id}\" - object does not exist."),
                )
            })
    }

    /// Posts `input` to the assistant and waits for its reply.
    ///
    /// Continues `thread_id` when given, otherwise starts a new thread.
    /// Returns the thread id and the reply text.
    async fn ask(
        &self,
        assistant: &Assistant,
        thread_id: Option<&str>,
        input: &str,
    ) -> Result<(String, String), ServiceError> {
        let remote = self
            .provider
            .retrieve_assistant(&assistant.remote_id)
            .await?;

        let thread = match thread_id {
            Some(thread_id) => self.provider.retrieve_thread(thread_id).await?,
            None => self.provider.create_thread().await?,
        };

        self.provider.create_message(&thread.id, input).await?;
        let run = self.provider.create_run(&thread.id, &remote.id).await?;

        let run = RunPoller::new(&*self.provider, self.settings.poll_policy)
            .wait(run)
            .await?;
        if run.status != RunStatus::Completed {
            return Err(ServiceError::RunNotCompleted {
                run_id: run.id,
                status: run.status,
            });
        }

        let messages = self.provider.list_messages(&thread.id).await?;
        let reply = run_reply(&messages, &run.id)
            .map(|m| m.text.clone())
            .ok_or_else(|| ServiceError::NoAssistantReply {
                thread_id: thread.id.clone(),
            })?;

        Ok((thread.id, reply))
    }
}

#[async_trait]
impl ChatService for MyChatService {
    async fn list_chats(&self) -> Result<Vec<Chat>, ServiceError> {
        Ok(self.chats.list_chats().await?)
    }

    async fn get_chat(&self, id: i64) -> Result<Chat, ServiceError> {
        self.chats
            .get_chat(id)
            .await?
            .ok_or(ServiceError::NotFound("chat"))
    }

    async fn create_chat(&self, form: CreateChat) -> Result<Chat, ServiceError> {
        let mut errors = FieldErrors::new();
        let input = errors
            .require_text("input", form.input.as_deref())
            .map(str::to_owned);
        if form.assistant_id.is_none() {
            errors.add("assistant_id", REQUIRED_FIELD);
        }
        let (Some(input), Some(assistant_id)) = (input, form.assistant_id) else {
            return Err(ServiceError::Validation(errors));
        };

        let assistant = self.referenced_assistant(assistant_id).await?;
        let thread_id = form.thread_id.filter(|t| !t.trim().is_empty());

        let (thread_id, output) = self.ask(&assistant, thread_id.as_deref(), &input).await?;

        let chat = self
            .chats
            .create_chat(NewChat {
                assistant_id: Some(assistant.id),
                thread_id: Some(thread_id),
                input,
                output,
            })
            .await?;
        self.count_query(assistant.id).await;
        info!("chat {} answered by assistant {}", chat.id, assistant.id);

        Ok(chat)
    }

    async fn update_chat(&self, id: i64, form: UpdateChat) -> Result<Chat, ServiceError> {
        let mut chat = self.get_chat(id).await?;

        let mut errors = FieldErrors::new();
        let input = errors
            .require_text("input", form.input.as_deref())
            .map(str::to_owned);
        let assistant_id = form.assistant_id.or(chat.assistant_id);
        if assistant_id.is_none() {
            errors.add("assistant_id", REQUIRED_FIELD);
        }
        let (Some(input), Some(assistant_id)) = (input, assistant_id) else {
            return Err(ServiceError::Validation(errors));
        };

        let assistant = self.referenced_assistant(assistant_id).await?;
        let (thread_id, output) = self
            .ask(&assistant, chat.thread_id.as_deref(), &input)
            .await?;

        chat.assistant_id = Some(assistant.id);
        chat.thread_id = Some(thread_id);
        chat.input = input;
        chat.output = output;

        let chat = self.chats.update_chat(chat).await?;
        self.count_query(assistant.id).await;

        Ok(chat)
    }
}

#[injectable(AccountService)]
pub struct MyAccountService {
    users: Ref<dyn UserRepository>,
    settings: Ref<Settings>,
}

impl MyAccountService {
    pub fn new(users: Ref<dyn UserRepository>, settings: Ref<Settings>) -> Self {
        Self { users, settings }
    }
}

fn new_token_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Runs on the blocking pool; bcrypt holds its thread for the whole hash.
async fn hash_password(password: String, cost: u32) -> Result<String, ServiceError> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {e}")))??;

    Ok(hashed)
}

async fn verify_password(password: String, hash: String) -> Result<bool, ServiceError> {
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(format!("password check task failed: {e}")))??;

    Ok(matches)
}

fn username_taken() -> ServiceError {
    ServiceError::field("username", "A user with that username already exists.")
}

#[async_trait]
impl AccountService for MyAccountService {
    async fn register(&self, form: RegisterUser) -> Result<User, ServiceError> {
        let valid = form.validate()?;

        if self.users.find_by_username(&valid.username).await?.is_some() {
            return Err(username_taken());
        }

        let password_hash = hash_password(valid.password, self.settings.bcrypt_cost).await?;
        let created = self
            .users
            .create_user_with_token(
                NewUser {
                    username: valid.username,
                    email: valid.email,
                    password_hash,
                },
                new_token_key(),
            )
            .await;

        match created {
            Ok((user, _token)) => {
                info!("registered user {} ({})", user.username, user.id);
                Ok(user)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(username_taken()),
            Err(e) => Err(e.into()),
        }
    }

    async fn obtain_token(&self, credentials: Credentials) -> Result<AuthToken, ServiceError> {
        let mut errors = FieldErrors::new();
        let username = errors
            .require_text("username", credentials.username.as_deref())
            .map(str::to_owned);
        let password = match credentials.password {
            Some(p) if !p.is_empty() => Some(p),
            Some(_) => {
                errors.add("password", BLANK_FIELD);
                None
            }
            None => {
                errors.add("password", REQUIRED_FIELD);
                None
            }
        };
        let (Some(username), Some(password)) = (username, password) else {
            return Err(ServiceError::Validation(errors));
        };

        let bad_credentials = || ServiceError::field(NON_FIELD_ERRORS, BAD_CREDENTIALS);

        let user = self
            .users
            .find_by_username(&username)
            .await?
            .ok_or_else(bad_credentials)?;
        if !verify_password(password, user.password_hash.clone()).await? {
            return Err(bad_credentials());
        }

        match self.users.token_for_user(user.id).await? {
            Some(token) => Ok(token),
            None => {
                warn!("user {} had no token, issuing one", user.id);
                Ok(self.users.create_token(user.id, new_token_key()).await?)
            }
        }
    }

    async fn authenticate(&self, key: &str) -> Result<User, ServiceError> {
        self.users
            .user_for_token(key)
            .await?
            .ok_or(ServiceError::InvalidToken)
    }

    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.list_users().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_password_round_trip() {
        let hash = hash_password("s3cret".to_owned(), 4).await.unwrap();

        assert!(verify_password("s3cret".to_owned(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_owned(), hash).await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_does_not_stall_the_runtime() {
        let hashing = tokio::spawn(async {
            hash_password("s3cret".to_owned(), 10).await.unwrap();
            Instant::now()
        });
        let ticking = tokio::spawn(async {
            for _ in 0..3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Instant::now()
        });

        let ticked_at = ticking.await.unwrap();
        let hashed_at = hashing.await.unwrap();
        assert!(ticked_at < hashed_at, "timer starved while hashing");
    }

    #[test]
    fn test_remote_instructions_compose_persona() {
        let instructions = remote_instructions("Aria", "Acme", "Be brief.");

        assert!(instructions.starts_with("Your name is Aria, an assistant working for Acme. Be brief.\n\n"));
        assert!(instructions.ends_with(PERSONA_GUIDANCE));
    }
}
