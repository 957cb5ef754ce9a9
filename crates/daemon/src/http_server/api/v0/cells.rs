//! Cell wire protocol
//!
//! `GET /:name` returns the raw value (404 until created), `POST /:name`
//! creates or resets it to empty, and `PUT /:name` with a [`CasRequest`] swaps
//! it. A swap answers 200 either way; `changed` carries the outcome.

use axum::extract::{Json, Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use http::{header, StatusCode};

use common::cell::{CasRequest, CasResponse};

use crate::cell_table::CellTableError;
use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route(
            "/:name",
            get(get_handler).post(create_handler).put(swap_handler),
        )
        .with_state(state)
}

pub async fn get_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<Response, CellsError> {
    let value = state
        .cells()
        .get(&name)
        .await?
        .ok_or(CellsError::NotFound(name))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        value,
    )
        .into_response())
}

pub async fn create_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, CellsError> {
    state.cells().create(&name).await?;
    tracing::info!(cell = %name, "cell created");
    Ok(StatusCode::OK)
}

pub async fn swap_handler(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    Json(req): Json<CasRequest>,
) -> Result<Json<CasResponse>, CellsError> {
    let outcome = state
        .cells()
        .swap(&name, &req.current, &req.next)
        .await?
        .ok_or(CellsError::NotFound(name))?;
    Ok(Json(outcome))
}

#[derive(Debug, thiserror::Error)]
pub enum CellsError {
    #[error("cell not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Table(#[from] CellTableError),
}

impl IntoResponse for CellsError {
    fn into_response(self) -> Response {
        match self {
            CellsError::NotFound(name) => {
                (StatusCode::NOT_FOUND, format!("cell not found: {}", name)).into_response()
            }
            CellsError::Table(CellTableError::InvalidName(name)) => (
                StatusCode::BAD_REQUEST,
                format!("invalid cell name: {:?}", name),
            )
                .into_response(),
            CellsError::Table(e) => {
                tracing::error!("CELL TABLE ERROR: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}
