//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{
    Assistant, AuthToken, Chat, NewAssistant, NewChat, NewUser, User,
};
use crate::infrastructure::traits::{AssistantRepository, ChatRepository, UserRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};

#[injectable(AssistantRepository)]
pub struct DbAssistantRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbAssistantRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl AssistantRepository for DbAssistantRepository {
    async fn list_assistants(&self) -> sqlx::Result<Vec<Assistant>> {
        sqlx::query_as("SELECT * FROM assistants ORDER BY id ASC")
            .fetch_all(&**self.connection)
            .await
    }

    async fn get_assistant(&self, id: i64) -> sqlx::Result<Option<Assistant>> {
        sqlx::query_as("SELECT * FROM assistants WHERE id = ?")
            .bind(id)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn create_assistant(&self, assistant: NewAssistant) -> sqlx::Result<Assistant> {
        let now = Utc::now();
        sqlx::query_as(
            "INSERT INTO assistants (name, remote_id, company_name, instructions, created_at, updated_at, query_count, files) VALUES (?, ?, ?, ?, ?, ?, 0, ?) RETURNING *",
        )
            .bind(assistant.name)
            .bind(assistant.remote_id)
            .bind(assistant.company_name)
            .bind(assistant.instructions)
            .bind(now)
            .bind(now)
            .bind(assistant.files)
            .fetch_one(&**self.connection)
            .await
    }

    async fn update_assistant(&self, assistant: Assistant) -> sqlx::Result<Assistant> {
        sqlx::query_as(
            "UPDATE assistants SET name = ?, company_name = ?, instructions = ?, files = ?, updated_at = ? WHERE id = ? RETURNING *",
        )
            .bind(assistant.name)
            .bind(assistant.company_name)
            .bind(assistant.instructions)
            .bind(assistant.files)
            .bind(Utc::now())
            .bind(assistant.id)
            .fetch_one(&**self.connection)
            .await
    }

    async fn delete_assistant(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM assistants WHERE id = ?")
            .bind(id)
            .execute(&**self.connection)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_query_count(&self, id: i64) -> sqlx::Result<()> {
        sqlx::query("UPDATE assistants SET query_count = query_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&**self.connection)
            .await?;

        Ok(())
    }
}

#[injectable(ChatRepository)]
pub struct DbChatRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbChatRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl ChatRepository for DbChatRepository {
    async fn list_chats(&self) -> sqlx::Result<Vec<Chat>> {
        sqlx::query_as("SELECT * FROM chats ORDER BY id ASC")
            .fetch_all(&**self.connection)
            .await
    }

    async fn get_chat(&self, id: i64) -> sqlx::Result<Option<Chat>> {
        sqlx::query_as("SELECT * FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn create_chat(&self, chat: NewChat) -> sqlx::Result<Chat> {
        sqlx::query_as(
            "INSERT INTO chats (assistant_id, thread_id, input, output) VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(chat.assistant_id)
        .bind(chat.thread_id)
        .bind(chat.input)
        .bind(chat.output)
        .fetch_one(&**self.connection)
        .await
    }

    async fn update_chat(&self, chat: Chat) -> sqlx::Result<Chat> {
        sqlx::query_as(
            "UPDATE chats SET assistant_id = ?, thread_id = ?, input = ?, output = ? WHERE id = ? RETURNING *",
        )
        .bind(chat.assistant_id)
        .bind(chat.thread_id)
        .bind(chat.input)
        .bind(chat.output)
        .bind(chat.id)
        .fetch_one(&**self.connection)
        .await
    }
}

#[injectable(UserRepository)]
pub struct DbUserRepository {
    connection: Ref<DatabaseConnection>,
}

impl DbUserRepository {
    pub fn new(connection: Ref<DatabaseConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl UserRepository for DbUserRepository {
    async fn list_users(&self) -> sqlx::Result<Vec<User>> {
        sqlx::query_as("SELECT * FROM users ORDER BY id ASC")
            .fetch_all(&**self.connection)
            .await
    }

    async fn find_by_username(&self, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn create_user_with_token(
        &self,
        user: NewUser,
        token_key: String,
    ) -> sqlx::Result<(User, AuthToken)> {
        let now = Utc::now();
        let mut tx = self.connection.begin().await?;

        let user: User = sqlx::query_as(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, ?, ?) RETURNING *",
        )
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        let token: AuthToken = sqlx::query_as(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(token_key)
        .bind(user.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((user, token))
    }

    async fn create_token(&self, user_id: i64, token_key: String) -> sqlx::Result<AuthToken> {
        sqlx::query_as(
            "INSERT INTO auth_tokens (key, user_id, created_at) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(token_key)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_one(&**self.connection)
        .await
    }

    async fn token_for_user(&self, user_id: i64) -> sqlx::Result<Option<AuthToken>> {
        sqlx::query_as("SELECT * FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn user_for_token(&self, key: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as(
            "SELECT users.id, users.username, users.email, users.password_hash, users.created_at FROM users INNER JOIN auth_tokens ON auth_tokens.user_id = users.id WHERE auth_tokens.key = ?",
        )
            .bind(key)
            .fetch_optional(&**self.connection)
            .await
    }
}
