use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::mailer::MailError;

/// Field name used for errors that do not belong to a single input field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// FieldErrors
///
/// Field name -> list of human-readable messages. Serialized as-is in 400 bodies.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// StoreError
///
/// Failures raised by a `Repository` implementation. Unique-constraint violations are
/// kept apart from other database failures so the API layer can turn a lost race
/// (e.g. two concurrent reviews by the same author) into a readable 400.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write hit a unique constraint. Carries the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

/// Result alias used by every `Repository` method.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    /// Classifies Postgres error 23505 as a unique violation so `?` never lets a
    /// constraint race surface as a 500.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

/// AppError
///
/// The single error type returned by handlers. Every variant renders as a JSON body
/// with a stable `code`, so no failure reaches the client as an empty or plain-text
/// response.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or conflicting input. Rendered with per-field messages.
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("not found: {0}")]
    NotFound(String),

    /// No usable credentials were supplied.
    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,

    /// Credentials are valid but the role/ownership check failed.
    #[error("permission denied")]
    PermissionDenied,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Convenience alias for handler and service return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// A validation error carrying a single message for a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            let key = if field == "__all__" {
                NON_FIELD_ERRORS.to_string()
            } else {
                field.to_string()
            };
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid value ({})", e.code),
                })
                .collect::<Vec<_>>();
            fields.entry(key).or_default().extend(messages);
        }
        AppError::Validation(fields)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::field(NON_FIELD_ERRORS, rejection.body_text())
    }
}

/// Maps a storage unique constraint to the field a client should fix.
fn unique_violation_message(constraint: &str) -> (&'static str, &'static str) {
    match constraint {
        "reviews_author_title_key" => (
            NON_FIELD_ERRORS,
            "You have already left a review for this title",
        ),
        "titles_name_year_key" => (NON_FIELD_ERRORS, "A title with this name and year already exists"),
        "categories_slug_key" => ("slug", "A category with this slug already exists"),
        "genres_slug_key" => ("slug", "A genre with this slug already exists"),
        "users_username_key" => ("username", "A user with that username already exists"),
        "users_email_key" => ("email", "A user with that email already exists"),
        _ => (NON_FIELD_ERRORS, "The submitted data conflicts with an existing record"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "code": "VALIDATION_ERROR", "errors": errors }),
            ),
            AppError::Store(StoreError::UniqueViolation(constraint)) => {
                let (field, message) = unique_violation_message(&constraint);
                tracing::info!(%constraint, "write rejected by unique constraint");
                let mut errors = FieldErrors::new();
                errors.insert(field.to_string(), vec![message.to_string()]);
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "code": "VALIDATION_ERROR", "errors": errors }),
                )
            }
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({ "code": "NOT_FOUND", "detail": what }),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "code": "UNAUTHORIZED",
                    "detail": "Authentication credentials were not provided or are invalid."
                }),
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                json!({
                    "code": "PERMISSION_DENIED",
                    "detail": "You do not have permission to perform this action."
                }),
            ),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "code": "METHOD_NOT_ALLOWED", "detail": "Method not allowed." }),
            ),
            other => {
                tracing::error!(error = %other, "request failed with an internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "code": "INTERNAL_ERROR", "detail": "An internal error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn duplicate_review_constraint_is_a_bad_request() {
        let err = AppError::Store(StoreError::UniqueViolation(
            "reviews_author_title_key".to_string(),
        ));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_failures_are_internal_errors() {
        let err = AppError::Store(StoreError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn taxonomy_statuses() {
        assert_eq!(status_of(AppError::not_found("Title")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AppError::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(AppError::MethodNotAllowed),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            status_of(AppError::field("score", "out of range")),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unique_violation_names_the_field() {
        assert_eq!(unique_violation_message("genres_slug_key").0, "slug");
        assert_eq!(unique_violation_message("users_email_key").0, "email");
        assert_eq!(unique_violation_message("something_else").0, NON_FIELD_ERRORS);
    }
}
