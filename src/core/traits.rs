//! DI "Interfaces"

use crate::core::errors::ServiceError;
use crate::core::forms::{
    CreateAssistant, CreateChat, Credentials, RegisterUser, UpdateAssistant, UpdateChat,
};
use crate::infrastructure::entities;
use async_trait::async_trait;

#[async_trait]
pub trait AccountService: Send + Sync {
    /// Creates a user and issues its token.
    async fn register(&self, form: RegisterUser) -> Result<entities::User, ServiceError>;

    /// Exchanges a username/password pair for the user's token.
    async fn obtain_token(&self, credentials: Credentials)
    -> Result<entities::AuthToken, ServiceError>;

    /// Resolves a bearer token to its user.
    ///
    /// Returns `Err(InvalidToken)` for unknown keys.
    async fn authenticate(&self, key: &str) -> Result<entities::User, ServiceError>;

    async fn list_users(&self) -> Result<Vec<entities::User>, ServiceError>;
}

#[async_trait]
pub trait AssistantService: Send + Sync {
    async fn list_assistants(&self) -> Result<Vec<entities::Assistant>, ServiceError>;

    async fn get_assistant(&self, id: i64) -> Result<entities::Assistant, ServiceError>;

    /// Creates the remote assistant, then stores it locally with its remote id.
    async fn create_assistant(
        &self,
        form: CreateAssistant,
    ) -> Result<entities::Assistant, ServiceError>;

    /// Updates the remote assistant by its stored remote id, then the row.
    async fn update_assistant(
        &self,
        id: i64,
        form: UpdateAssistant,
    ) -> Result<entities::Assistant, ServiceError>;

    /// Removes both the remote assistant and the row.
    async fn delete_assistant(&self, id: i64) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<entities::Chat>, ServiceError>;

    async fn get_chat(&self, id: i64) -> Result<entities::Chat, ServiceError>;

    /// Asks the assistant and stores the exchange.
    async fn create_chat(&self, form: CreateChat) -> Result<entities::Chat, ServiceError>;

    /// Asks again on the chat's thread and replaces input and output.
    async fn update_chat(&self, id: i64, form: UpdateChat)
    -> Result<entities::Chat, ServiceError>;
}
