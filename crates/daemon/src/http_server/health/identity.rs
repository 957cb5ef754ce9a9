use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;

use crate::ServiceState;

#[derive(Serialize)]
pub struct IdentityResponse {
    /// Fingerprint of the daemon's entity
    pub entity: String,
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let entity = state.identity().to_hex();
    (StatusCode::OK, Json(IdentityResponse { entity })).into_response()
}
