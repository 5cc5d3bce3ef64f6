//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use async_trait::async_trait;

#[async_trait]
pub trait AssistantRepository: Send + Sync {
    async fn list_assistants(&self) -> sqlx::Result<Vec<entities::Assistant>>;

    async fn get_assistant(&self, id: i64) -> sqlx::Result<Option<entities::Assistant>>;

    async fn create_assistant(
        &self,
        assistant: entities::NewAssistant,
    ) -> sqlx::Result<entities::Assistant>;

    /// Writes every mutable column of `assistant` and refreshes `updated_at`.
    async fn update_assistant(
        &self,
        assistant: entities::Assistant,
    ) -> sqlx::Result<entities::Assistant>;

    /// Returns `false` when no row had that id.
    async fn delete_assistant(&self, id: i64) -> sqlx::Result<bool>;

    async fn increment_query_count(&self, id: i64) -> sqlx::Result<()>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn list_chats(&self) -> sqlx::Result<Vec<entities::Chat>>;

    async fn get_chat(&self, id: i64) -> sqlx::Result<Option<entities::Chat>>;

    async fn create_chat(&self, chat: entities::NewChat) -> sqlx::Result<entities::Chat>;

    async fn update_chat(&self, chat: entities::Chat) -> sqlx::Result<entities::Chat>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn list_users(&self) -> sqlx::Result<Vec<entities::User>>;

    async fn find_by_username(&self, username: &str) -> sqlx::Result<Option<entities::User>>;

    /// Inserts the user together with its one and only token.
    async fn create_user_with_token(
        &self,
        user: entities::NewUser,
        token_key: String,
    ) -> sqlx::Result<(entities::User, entities::AuthToken)>;

    async fn create_token(
        &self,
        user_id: i64,
        token_key: String,
    ) -> sqlx::Result<entities::AuthToken>;

    async fn token_for_user(&self, user_id: i64) -> sqlx::Result<Option<entities::AuthToken>>;

    async fn user_for_token(&self, key: &str) -> sqlx::Result<Option<entities::User>>;
}
