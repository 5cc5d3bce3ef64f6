//! Validated inputs accepted by the services.
//!
//! Every field is optional at this level so that a missing value turns into a
//! field-keyed validation error instead of a deserialization failure.

use crate::core::errors::{BLANK_FIELD, FieldErrors, REQUIRED_FIELD, ServiceError};
use serde::Deserialize;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_NAME_LEN: usize = 120;

/// A file received with an assistant form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterUser {
    pub fn validate(self) -> Result<ValidRegistration, ServiceError> {
        let mut errors = FieldErrors::new();

        let username = errors
            .require_text("username", self.username.as_deref())
            .map(|u| u.trim().to_owned());
        if let Some(name) = &username {
            if name.chars().count() > MAX_USERNAME_LEN {
                errors.add(
                    "username",
                    format!("Ensure this field has no more than {MAX_USERNAME_LEN} characters."),
                );
            }
        }

        // passwords are taken verbatim, whitespace included
        let password = match self.password {
            None => {
                errors.add("password", REQUIRED_FIELD);
                None
            }
            Some(p) if p.is_empty() => {
                errors.add("password", BLANK_FIELD);
                None
            }
            Some(p) => Some(p),
        };

        let email = self.email.unwrap_or_default().trim().to_owned();
        if !email.is_empty() && !looks_like_email(&email) {
            errors.add("email", "Enter a valid email address.");
        }

        errors.into_result()?;
        Ok(ValidRegistration {
            username: username.unwrap_or_default(),
            email,
            password: password.unwrap_or_default(),
        })
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateAssistant {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub instructions: Option<String>,
    pub files: Option<UploadedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAssistant {
    pub name: String,
    pub company_name: String,
    pub instructions: String,
}

impl CreateAssistant {
    pub fn validate(&self) -> Result<ValidAssistant, ServiceError> {
        let mut errors = FieldErrors::new();
        let name = errors.require_text("name", self.name.as_deref());
        if let Some(name) = name {
            check_name_length(&mut errors, "name", name);
        }
        let company_name = errors.require_text("company_name", self.company_name.as_deref());
        let instructions = errors.require_text("instructions", self.instructions.as_deref());
        errors.into_result()?;

        Ok(ValidAssistant {
            name: name.unwrap_or_default().trim().to_owned(),
            company_name: company_name.unwrap_or_default().trim().to_owned(),
            instructions: instructions.unwrap_or_default().to_owned(),
        })
    }
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UpdateAssistant {
    pub new_name: Option<String>,
    pub company_name: Option<String>,
    pub instructions: Option<String>,
    pub files: Option<UploadedFile>,
}

impl UpdateAssistant {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.new_name {
            if errors.require_text("new_name", Some(name)).is_some() {
                check_name_length(&mut errors, "new_name", name);
            }
        }
        if let Some(company) = &self.company_name {
            errors.require_text("company_name", Some(company));
        }
        if let Some(instructions) = &self.instructions {
            errors.require_text("instructions", Some(instructions));
        }
        errors.into_result()
    }
}

fn check_name_length(errors: &mut FieldErrors, field: &str, name: &str) {
    if name.trim().chars().count() > MAX_NAME_LEN {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_NAME_LEN} characters."),
        );
    }
}

/// Body of a chat creation. A client-sent `output` is not even deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChat {
    pub assistant_id: Option<i64>,
    pub input: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChat {
    pub assistant_id: Option<i64>,
    pub input: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(result: Result<impl std::fmt::Debug, ServiceError>) -> FieldErrors {
        match result {
            Err(ServiceError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_register_requires_username_and_password() {
        let errors = field_errors(RegisterUser::default().validate());
        assert_eq!(errors.get("username").unwrap(), [REQUIRED_FIELD]);
        assert_eq!(errors.get("password").unwrap(), [REQUIRED_FIELD]);
        assert!(errors.get("email").is_none());
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let form = RegisterUser {
            username: Some("alice".into()),
            email: Some("not-an-email".into()),
            password: Some("secret".into()),
        };
        let errors = field_errors(form.validate());
        assert!(errors.get("email").is_some());
    }

    #[test]
    fn test_register_keeps_password_whitespace() {
        let form = RegisterUser {
            username: Some(" alice ".into()),
            email: None,
            password: Some(" secret ".into()),
        };
        let valid = form.validate().unwrap();
        assert_eq!(valid.username, "alice");
        assert_eq!(valid.password, " secret ");
        assert_eq!(valid.email, "");
    }

    #[test]
    fn test_create_assistant_reports_each_missing_field() {
        let form = CreateAssistant {
            name: Some("Aria".into()),
            company_name: Some("".into()),
            ..Default::default()
        };
        let errors = field_errors(form.validate());
        assert!(errors.get("name").is_none());
        assert_eq!(errors.get("company_name").unwrap(), [BLANK_FIELD]);
        assert_eq!(errors.get("instructions").unwrap(), [REQUIRED_FIELD]);
    }

    #[test]
    fn test_create_assistant_rejects_long_name() {
        let form = CreateAssistant {
            name: Some("x".repeat(MAX_NAME_LEN + 1)),
            company_name: Some("Acme".into()),
            instructions: Some("Be brief.".into()),
            files: None,
        };
        let errors = field_errors(form.validate());
        assert!(errors.get("name").is_some());
    }

    #[test]
    fn test_update_assistant_allows_empty_form() {
        assert!(UpdateAssistant::default().validate().is_ok());
    }

    #[test]
    fn test_update_assistant_rejects_blank_name() {
        let form = UpdateAssistant {
            new_name: Some(" ".into()),
            ..Default::default()
        };
        let errors = field_errors(form.validate());
        assert_eq!(errors.get("new_name").unwrap(), [BLANK_FIELD]);
    }
}
