//! Chat endpoints

use crate::api::{CurrentUser, json_body};
use crate::core::errors::ServiceError;
use crate::core::forms::{CreateChat, UpdateChat};
use crate::core::traits::ChatService;
use axum::extract::Path;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/chat/", get(list_chats).post(create_chat))
        .route("/chat/:id/", get(get_chat).put(update_chat))
}

async fn list_chats(
    Inject(chats): Inject<dyn ChatService>,
    _: CurrentUser,
) -> Result<Json<Vec<schemas::Chat>>, ServiceError> {
    let chats = chats.list_chats().await?;

    Ok(Json(chats.into_iter().map(schemas::Chat::from).collect()))
}

async fn create_chat(
    Inject(chats): Inject<dyn ChatService>,
    _: CurrentUser,
    payload: Result<Json<CreateChat>, JsonRejection>,
) -> Result<(StatusCode, Json<schemas::Chat>), ServiceError> {
    let chat = chats.create_chat(json_body(payload)?).await?;

    Ok((StatusCode::CREATED, Json(chat.into())))
}

async fn get_chat(
    Inject(chats): Inject<dyn ChatService>,
    _: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<schemas::Chat>, ServiceError> {
    Ok(Json(chats.get_chat(id).await?.into()))
}

async fn update_chat(
    Inject(chats): Inject<dyn ChatService>,
    _: CurrentUser,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateChat>, JsonRejection>,
) -> Result<Json<schemas::Chat>, ServiceError> {
    let chat = chats.update_chat(id, json_body(payload)?).await?;

    Ok(Json(chat.into()))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct Chat {
        pub id: i64,
        pub assistant_id: Option<i64>,
        pub thread_id: Option<String>,
        pub input: String,
        pub output: String,
    }

    impl From<entities::Chat> for Chat {
        fn from(chat: entities::Chat) -> Self {
            Chat {
                id: chat.id,
                assistant_id: chat.assistant_id,
                thread_id: chat.thread_id,
                input: chat.input,
                output: chat.output,
            }
        }
    }
}
