//! What a handler hands back to the dispatcher.

use super::{render, validator::LookupError};
use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

/// Every handled request ends in a redirect or a rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `303 See Other` to a local path.
    Redirect(String),
    Document { status: StatusCode, html: String },
}

impl Outcome {
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect(location.into())
    }

    #[must_use]
    pub fn page(html: String) -> Self {
        Self::Document {
            status: StatusCode::OK,
            html,
        }
    }

    #[must_use]
    pub fn with_status(status: StatusCode, html: String) -> Self {
        Self::Document { status, html }
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect(location) => Some(location),
            Self::Document { .. } => None,
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(location) => match HeaderValue::try_from(location) {
                Ok(location) => (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response(),
                Err(err) => {
                    error!("refusing redirect to an invalid location: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Html(render::server_error()),
                    )
                        .into_response()
                }
            },
            Self::Document { status, html } => (status, Html(html)).into_response(),
        }
    }
}

/// Failures a handler cannot recover from by itself.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("uniqueness lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_is_see_other() {
        let response = Outcome::redirect("/movies").into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/movies");
    }

    #[test]
    fn invalid_location_is_a_server_error() {
        let response = Outcome::redirect("/movies\nx").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(LOCATION).is_none());
    }

    #[test]
    fn document_keeps_status() {
        let outcome = Outcome::with_status(StatusCode::FORBIDDEN, "<p>no</p>".to_string());
        assert_eq!(outcome.location(), None);
        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html")));
    }

    #[test]
    fn errors_convert() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Persistence(_)));

        let err: AppError = LookupError::Identifier("bad name".to_string()).into();
        assert!(matches!(err, AppError::Lookup(_)));

        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
