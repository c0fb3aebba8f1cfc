use super::Json;
use crate::services::RelayService;
use apilab_api::v1::relay::{RelayError, RelayRequest, RelayResponse};
use axum::{
    debug_handler, extract::State, http::StatusCode, response::IntoResponse, routing::post, Router,
};

#[derive(Clone)]
pub struct Config {
    relay: RelayService,
}

impl Config {
    pub fn new(relay: RelayService) -> Self {
        Self { relay }
    }

    pub fn into_router(self) -> Router {
        Router::new().route("/", post(relay)).with_state(self)
    }
}

struct RelayApiError(RelayError);

impl IntoResponse for RelayApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

#[debug_handler]
async fn relay(
    State(config): State<Config>,
    Json(body): Json<RelayRequest>,
) -> Result<Json<RelayResponse>, RelayApiError> {
    config
        .relay
        .relay(body)
        .await
        .map(Json)
        .map_err(RelayApiError)
}
