use crate::core::errors::{NON_FIELD_ERRORS, ServiceError};
use crate::core::remote::RemoteError;
use crate::core::traits::AccountService;
use crate::infrastructure::entities;
use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::FromRequestParts;
use axum::extract::rejection::JsonRejection;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use di_axum::Inject;
use log::error;
use serde::Serialize;

pub mod assistants;
pub mod chats;
pub mod users;

/// All endpoints, unlayered.
pub fn router() -> Router {
    Router::new()
        .merge(users::router())
        .merge(assistants::router())
        .merge(chats::router())
}

/// The user owning the bearer token of the request.
#[derive(Debug)]
pub struct CurrentUser(pub entities::User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, ServiceError> {
        let key = bearer_token(&parts.headers)?;
        let Inject(accounts) = Inject::<dyn AccountService>::from_request_parts(parts, state)
            .await
            .map_err(|_| ServiceError::Internal("account service is not registered".into()))?;

        Ok(CurrentUser(accounts.authenticate(&key).await?))
    }
}

/// Reads the token from `Authorization: Bearer <key>` (or the older `Token <key>`).
pub fn bearer_token(headers: &HeaderMap) -> Result<String, ServiceError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ServiceError::Unauthenticated)?
        .to_str()
        .map_err(|_| ServiceError::InvalidToken)?;

    match value.trim().split_once(' ') {
        Some((scheme, key))
            if (scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token"))
                && !key.trim().is_empty() =>
        {
            Ok(key.trim().to_owned())
        }
        _ => Err(ServiceError::InvalidToken),
    }
}

/// Turns a body rejection into a validation error.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::field(NON_FIELD_ERRORS, rejection.body_text()))
}

#[derive(Serialize, Debug)]
pub struct ErrorDetail {
    pub detail: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ServiceError::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
            }
            ServiceError::Unauthenticated => {
                return unauthorized("Authentication credentials were not provided.");
            }
            ServiceError::InvalidToken => return unauthorized("Invalid token."),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found.".to_owned()),
            ServiceError::Remote(e @ RemoteError::RateLimited(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ServiceError::Remote(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            e @ ServiceError::RunTimedOut { .. } => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            e @ (ServiceError::RunNotCompleted { .. } | ServiceError::NoAssistantReply { .. }) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            e @ (ServiceError::Database(_)
            | ServiceError::Storage(_)
            | ServiceError::PasswordHash(_)
            | ServiceError::Internal(_)) => {
                error!("{e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_owned(),
                )
            }
        };

        (status, Json(ErrorDetail { detail })).into_response()
    }
}

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorDetail {
            detail: detail.to_owned(),
        }),
    )
        .into_response()
}
