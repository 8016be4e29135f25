//! HTTP handlers, grouped by resource, plus the extractors they share.
//!
//! Handlers stay thin: extract, check object-level permissions, call the
//! repository, shape the response. Every failure is an `AppError`, so clients
//! always receive a JSON body.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{
    config::AppConfig,
    error::{AppError, NON_FIELD_ERRORS},
    pagination::Pagination,
};

pub mod auth;
pub mod catalog;
pub mod feedback;
pub mod users;

/// ValidatedJson
///
/// JSON body extractor that runs the payload's `validator` rules. Malformed JSON and
/// failed rules are both rendered as 400 field errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Path
///
/// `axum::extract::Path` with a JSON rejection. A path segment that does not parse
/// (e.g. `/titles/abc`) names no resource, so it is a 404.
#[derive(Debug, Clone, Copy)]
pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(%rejection, "unparseable path parameter");
                Err(AppError::not_found("Not found."))
            }
        }
    }
}

/// Query
///
/// `axum::extract::Query` with a JSON 400 rejection.
#[derive(Debug, Clone, Default)]
pub struct Query<T>(pub T);

impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| Self(value))
            .map_err(|rejection| AppError::field(NON_FIELD_ERRORS, rejection.body_text()))
    }
}

/// Page window from raw query parameters and the configured default size.
pub(crate) fn window(
    config: &AppConfig,
    page: Option<u32>,
    page_size: Option<u32>,
) -> Result<Pagination, AppError> {
    Pagination::new(page, page_size, config.page_size)
}
