use crate::services::{ContentReader, RelayService};
use apilab_api::v1::ErrorResponse;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::IntoResponse,
    Router,
};
use serde::Serialize;

pub mod content;
pub mod relay;

/// An extractor that wraps the JSON extractor of Axum.
///
/// This extractor returns an API error on rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct Json<T>(pub T);

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        axum::Json(self.0).into_response()
    }
}

/// An extractor that wraps the query extractor of Axum.
///
/// This extractor returns an API error on rejection.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct Query<T>(pub T);

/// Represents a generic error from the API.
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    message: String,
}

impl Error {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        // Malformed or mistyped request bodies are input errors; only a missing
        // JSON content type keeps its own status.
        let status = match &rejection {
            JsonRejection::MissingJsonContentType(_) => rejection.status(),
            _ if rejection.status().is_client_error() => StatusCode::BAD_REQUEST,
            _ => rejection.status(),
        };

        Self {
            status,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (self.status, axum::Json(ErrorResponse::new(self.message))).into_response()
    }
}

pub async fn not_found() -> impl IntoResponse {
    Error::new(
        StatusCode::NOT_FOUND,
        "the requested resource was not found",
    )
}

pub fn create_router(relay: RelayService, content: Option<ContentReader>) -> Router {
    let mut router = Router::new().nest("/relay", relay::Config::new(relay).into_router());

    if let Some(reader) = content {
        router = router.nest("/content", content::Config::new(reader).into_router());
    }

    router
}
