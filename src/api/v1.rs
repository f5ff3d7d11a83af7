use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

use crate::api::{dispatch, feasibility};
use crate::app::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/feasibility", post(feasibility::assess_feasibility))
        .route(
            "/dispatch",
            get(dispatch::list_dispatches).post(dispatch::create_dispatch),
        )
        .route("/dispatch/:id", put(dispatch::update_dispatch))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
