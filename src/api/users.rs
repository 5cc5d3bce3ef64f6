//! Account and token endpoints

use crate::api::{CurrentUser, json_body};
use crate::core::errors::ServiceError;
use crate::core::forms::{Credentials, RegisterUser};
use crate::core::traits::AccountService;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route("/tokens/", post(obtain_token))
}

async fn list_users(
    Inject(accounts): Inject<dyn AccountService>,
    _: CurrentUser,
) -> Result<Json<Vec<schemas::User>>, ServiceError> {
    let users = accounts.list_users().await?;

    Ok(Json(users.into_iter().map(schemas::User::from).collect()))
}

async fn create_user(
    Inject(accounts): Inject<dyn AccountService>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> Result<(StatusCode, Json<schemas::User>), ServiceError> {
    let user = accounts.register(json_body(payload)?).await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn obtain_token(
    Inject(accounts): Inject<dyn AccountService>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<schemas::Token>, ServiceError> {
    let token = accounts.obtain_token(json_body(payload)?).await?;

    Ok(Json(schemas::Token { token: token.key }))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct User {
        pub id: i64,
        pub username: String,
        pub email: String,
    }

    impl From<entities::User> for User {
        fn from(user: entities::User) -> Self {
            User {
                id: user.id,
                username: user.username,
                email: user.email,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Token {
        pub token: String,
    }
}
