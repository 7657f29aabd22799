use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{ApiError, CoreError, CoreResult, StoreError};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api_routes().layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/access-codes",
            post(handlers::lifecycle::generate_access_code),
        )
        .merge(timer_routes())
        .merge(participant_routes())
}

// `{session}` is the access code on timer and join routes and the session id
// everywhere else.
fn timer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/sessions/{session}/questions/{question_id}/timer",
            get(handlers::timer::get_timer),
        )
        .route(
            "/sessions/{session}/questions/{question_id}/timer/start",
            post(handlers::timer::start_timer),
        )
        .route(
            "/sessions/{session}/questions/{question_id}/timer/pause",
            post(handlers::timer::pause_timer),
        )
        .route(
            "/sessions/{session}/questions/{question_id}/timer/stop",
            post(handlers::timer::stop_timer),
        )
        .route(
            "/sessions/{session}/questions/{question_id}/timer/edit",
            post(handlers::timer::edit_timer),
        )
}

fn participant_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions/{session}/join", post(handlers::participants::join_session))
        .route(
            "/sessions/{session}/participants/{participant_id}",
            get(handlers::participants::get_participant),
        )
        .route(
            "/sessions/{session}/participants/{participant_id}/answers",
            post(handlers::participants::submit_answer),
        )
        .route(
            "/sessions/{session}/participants/{participant_id}/questions/{question_id}/open",
            post(handlers::participants::open_question),
        )
        .route(
            "/sessions/{session}/leaderboard",
            get(handlers::participants::leaderboard).layer(CompressionLayer::new()),
        )
        .route("/sessions/{session}/events", get(handlers::sse::session_events))
        .route(
            "/sessions/{session}/complete",
            post(handlers::lifecycle::complete_session),
        )
        .route(
            "/sessions/{session}",
            delete(handlers::lifecycle::purge_session),
        )
}
