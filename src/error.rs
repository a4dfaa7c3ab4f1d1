//! Service-level error taxonomy and its HTTP rendering.

use crate::storage::StorageError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde::Serialize;
use validator::ValidationErrors;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A single correctable problem with client input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum ServiceError {
    /// Malformed or missing input. Nothing was written.
    Validation(Vec<FieldError>),
    /// The named entity does not exist.
    NotFound(&'static str),
    /// Deletion blocked by live child records.
    ReferentialIntegrity(String),
    Unauthorized,
    Forbidden,
    Conflict(String),
    /// Retry after this many seconds.
    TooManyRequests(u64),
    Storage(StorageError),
    Database(DbErr),
}

impl ServiceError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &str, message: &str) -> Self {
        ServiceError::Validation(vec![FieldError::new(field, message)])
    }

    fn public_message(&self) -> String {
        match self {
            ServiceError::Validation(_) => "Validation failed".to_string(),
            ServiceError::NotFound(what) => format!("{} not found", what),
            ServiceError::ReferentialIntegrity(msg) => msg.clone(),
            ServiceError::Unauthorized => "Login required".to_string(),
            ServiceError::Forbidden => "Insufficient permissions".to_string(),
            ServiceError::Conflict(msg) => msg.clone(),
            ServiceError::TooManyRequests(secs) => {
                format!("Too many requests. Try again in {} seconds", secs)
            }
            ServiceError::Storage(_) => "File storage failed".to_string(),
            ServiceError::Database(_) => "Internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Validation(errors) => {
                write!(f, "Validation failed:")?;
                for e in errors {
                    write!(f, " {}: {};", e.field, e.message)?;
                }
                Ok(())
            }
            ServiceError::Storage(e) => write!(f, "Storage error: {}", e),
            ServiceError::Database(e) => write!(f, "Database error: {}", e),
            other => write!(f, "{}", other.public_message()),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<DbErr> for ServiceError {
    fn from(e: DbErr) -> Self {
        ServiceError::Database(e)
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Storage(e)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("invalid ({})", e.code),
                    };
                    FieldError::new(field, message)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        ServiceError::Validation(fields)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ReferentialIntegrity(_) | ServiceError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Storage(_) | ServiceError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self, ServiceError::Storage(_) | ServiceError::Database(_)) {
            log::error!("{}", self);
        }

        let mut body = serde_json::json!({
            "success": false,
            "message": self.public_message(),
        });
        if let ServiceError::Validation(errors) = self {
            body["errors"] = serde_json::json!(errors);
        }

        let mut res = HttpResponse::build(self.status_code());
        if let ServiceError::TooManyRequests(secs) = self {
            res.insert_header(("Retry-After", secs.to_string()));
        }
        res.json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Draft {
        #[validate(length(min = 5, message = "too short"))]
        title: String,
        #[validate(length(min = 10))]
        description: String,
    }

    #[test]
    fn test_validation_errors_are_field_level_and_sorted() {
        let draft = Draft {
            title: "abc".to_string(),
            description: "short".to_string(),
        };
        let err: ServiceError = draft.validate().unwrap_err().into();
        match err {
            ServiceError::Validation(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field, "description");
                assert_eq!(fields[1], FieldError::new("title", "too short"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::NotFound("Risk report").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ReferentialIntegrity("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ServiceError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ServiceError::invalid("title", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
