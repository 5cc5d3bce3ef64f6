//! Errors surfaced by the services.

use crate::core::remote::{RemoteError, RunStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const REQUIRED_FIELD: &str = "This field is required.";
pub const BLANK_FIELD: &str = "This field may not be blank.";
pub const BAD_CREDENTIALS: &str = "Credentials are not provided correctly.";
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Validation messages keyed by the offending input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }

    /// Records the usual required/blank message for a text field.
    pub fn require_text<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value {
            None => {
                self.add(field, REQUIRED_FIELD);
                None
            }
            Some(v) if v.trim().is_empty() => {
                self.add(field, BLANK_FIELD);
                None
            }
            Some(v) => Some(v),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("authentication credentials were not provided")]
    Unauthenticated,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("run {run_id} still pending after {attempts} polls")]
    RunTimedOut { run_id: String, attempts: u32 },
    #[error("run {run_id} ended with status {status:?}")]
    RunNotCompleted { run_id: String, status: RunStatus },
    #[error("the assistant produced no reply on thread {thread_id}")]
    NoAssistantReply { thread_id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Validation(FieldErrors::single(field, message))
    }
}
