//! Assistant endpoints

use crate::api::CurrentUser;
use crate::core::errors::{NON_FIELD_ERRORS, ServiceError};
use crate::core::forms::{CreateAssistant, UpdateAssistant, UploadedFile};
use crate::core::traits::AssistantService;
use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request};
use axum::http::{StatusCode, header};
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use serde::Deserialize;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const FILE_FIELD: &str = "files";

pub fn router() -> Router {
    Router::new()
        .route("/assistants/", get(list_assistants).post(create_assistant))
        .route(
            "/assistants/:id/",
            get(get_assistant)
                .put(update_assistant)
                .delete(delete_assistant),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

async fn list_assistants(
    Inject(assistants): Inject<dyn AssistantService>,
    _: CurrentUser,
) -> Result<Json<Vec<schemas::Assistant>>, ServiceError> {
    let assistants = assistants.list_assistants().await?;

    Ok(Json(
        assistants
            .into_iter()
            .map(schemas::Assistant::from)
            .collect(),
    ))
}

async fn create_assistant(
    Inject(assistants): Inject<dyn AssistantService>,
    _: CurrentUser,
    AssistantForm(fields): AssistantForm,
) -> Result<(StatusCode, Json<schemas::Assistant>), ServiceError> {
    let assistant = assistants
        .create_assistant(CreateAssistant {
            name: fields.name,
            company_name: fields.company_name,
            instructions: fields.instructions,
            files: fields.files,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(assistant.into())))
}

async fn get_assistant(
    Inject(assistants): Inject<dyn AssistantService>,
    _: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<schemas::Assistant>, ServiceError> {
    Ok(Json(assistants.get_assistant(id).await?.into()))
}

async fn update_assistant(
    Inject(assistants): Inject<dyn AssistantService>,
    _: CurrentUser,
    Path(id): Path<i64>,
    AssistantForm(fields): AssistantForm,
) -> Result<Json<schemas::Assistant>, ServiceError> {
    let assistant = assistants
        .update_assistant(
            id,
            UpdateAssistant {
                // a plain `name` is accepted as a rename as well
                new_name: fields.new_name.or(fields.name),
                company_name: fields.company_name,
                instructions: fields.instructions,
                files: fields.files,
            },
        )
        .await?;

    Ok(Json(assistant.into()))
}

async fn delete_assistant(
    Inject(assistants): Inject<dyn AssistantService>,
    _: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    assistants.delete_assistant(id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Assistant fields sent either as JSON or as `multipart/form-data`.
///
/// Only the multipart form can carry a file.
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFields {
    pub name: Option<String>,
    pub new_name: Option<String>,
    pub company_name: Option<String>,
    pub instructions: Option<String>,
    #[serde(skip)]
    pub files: Option<UploadedFile>,
}

impl AssistantFields {
    fn set_text(&mut self, field: &str, value: String) {
        let slot = match field {
            "name" => &mut self.name,
            "new_name" => &mut self.new_name,
            "company_name" => &mut self.company_name,
            "instructions" => &mut self.instructions,
            _ => return,
        };
        *slot = Some(value);
    }
}

pub struct AssistantForm(pub AssistantFields);

fn bad_body(message: String) -> ServiceError {
    ServiceError::field(NON_FIELD_ERRORS, message)
}

#[async_trait]
impl<S> FromRequest<S> for AssistantForm
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ServiceError> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(fields) = Json::<AssistantFields>::from_request(req, state)
                .await
                .map_err(|e| bad_body(e.body_text()))?;
            return Ok(AssistantForm(fields));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| bad_body(e.body_text()))?;
        let mut fields = AssistantFields::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| bad_body(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_owned();
            if name == FILE_FIELD {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let bytes = field.bytes().await.map_err(|e| bad_body(e.body_text()))?;
                // browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    fields.files = Some(UploadedFile {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await.map_err(|e| bad_body(e.body_text()))?;
                fields.set_text(&name, value);
            }
        }

        Ok(AssistantForm(fields))
    }
}

pub mod schemas {
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct Assistant {
        pub id: i64,
        pub name: String,
        pub remote_id: String,
        pub company_name: String,
        pub instructions: String,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
        pub query_count: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub files: Option<String>,
    }

    impl From<entities::Assistant> for Assistant {
        fn from(assistant: entities::Assistant) -> Self {
            Assistant {
                id: assistant.id,
                name: assistant.name,
                remote_id: assistant.remote_id,
                company_name: assistant.company_name,
                instructions: assistant.instructions,
                created_at: assistant.created_at,
                updated_at: assistant.updated_at,
                query_count: assistant.query_count,
                files: assistant.files,
            }
        }
    }
}
