use axum::routing::get;
use axum::Router;

mod identity;
mod liveness;
mod readiness;
mod version;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/identity", get(identity::handler))
        .route("/version", get(version::handler))
        .with_state(state)
}
