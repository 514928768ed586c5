mod errors;
mod handlers;
mod state;

use axum::{
    Router,
    routing::{get, post},
};

pub use state::HttpState;

pub fn router(state: HttpState) -> Router<()> {
    let telemetry = Router::new()
        .route("/logs", post(handlers::otlp_logs))
        .route("/metrics", post(handlers::otlp_discard))
        .route("/traces", post(handlers::otlp_discard));

    let api = Router::new()
        .route("/stats", get(handlers::stats))
        .route("/blocks/current", get(handlers::current_block))
        .route(
            "/records",
            get(handlers::list_records)
                .post(handlers::append_record)
                .delete(handlers::purge_records),
        )
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/v1", telemetry)
        .nest("/api", api)
        .with_state(state)
}
