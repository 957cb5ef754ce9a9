use axum::Router;

pub mod cells;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/cells", cells::router(state.clone()))
        .with_state(state)
}
