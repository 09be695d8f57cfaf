use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod repo;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use services::AppState;

/// Adds a Content-Security-Policy header to every response.
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let api = Router::new()
        .nest("/levels", levels_routes())
        .nest(
            "/attempts",
            attempts_routes().route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::rate_limit::rate_limit_middleware,
            )),
        )
        .nest("/rewards", rewards_routes())
        .nest("/achievements", achievements_routes())
        .nest("/me", me_routes())
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api.layer(cors).layer(CompressionLayer::new()))
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

type AppRouter = Router<Arc<AppState>>;

fn levels_routes() -> AppRouter {
    Router::new()
        .route("/", get(handlers::levels::list_levels))
        .route("/{id}", get(handlers::levels::get_level))
        .route(
            "/{id}/availability",
            get(handlers::levels::level_availability),
        )
}

fn attempts_routes() -> AppRouter {
    Router::new()
        .route(
            "/",
            get(handlers::attempts::list_attempts).post(handlers::attempts::start_attempt),
        )
        .route("/active", get(handlers::attempts::active_attempt))
        .route("/{id}", get(handlers::attempts::get_attempt))
        .route("/{id}/next", get(handlers::attempts::next_question))
        .route("/{id}/answer", post(handlers::attempts::answer_question))
        .route("/{id}/complete", post(handlers::attempts::complete_attempt))
        .route("/{id}/cancel", post(handlers::attempts::cancel_attempt))
}

fn rewards_routes() -> AppRouter {
    Router::new()
        .route("/balance", get(handlers::rewards::get_balance))
        .route("/transactions", get(handlers::rewards::list_transactions))
}

fn achievements_routes() -> AppRouter {
    Router::new()
        .route("/", get(handlers::achievements::list_achievements))
        .route("/my", get(handlers::achievements::my_achievements))
        .route(
            "/{code}/progress",
            get(handlers::achievements::achievement_progress),
        )
}

fn me_routes() -> AppRouter {
    Router::new()
        .route(
            "/profile",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route("/stats", get(handlers::profile::get_stats))
}
