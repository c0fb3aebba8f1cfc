use super::{Json, Query};
use crate::services::ContentReader;
use apilab_api::v1::content::{ContentError, ContentQuery, ContentResponse};
use axum::{
    debug_handler, extract::State, http::StatusCode, response::IntoResponse, routing::get, Router,
};

#[derive(Clone)]
pub struct Config {
    reader: ContentReader,
}

impl Config {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    pub fn into_router(self) -> Router {
        Router::new().route("/", get(get_content)).with_state(self)
    }
}

struct ContentApiError(ContentError);

impl IntoResponse for ContentApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

#[debug_handler]
async fn get_content(
    State(config): State<Config>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentResponse>, ContentApiError> {
    let file = query
        .file
        .ok_or(ContentApiError(ContentError::MissingPath))?;
    let content = config.reader.read(&file).await.map_err(ContentApiError)?;
    Ok(Json(ContentResponse { content }))
}
