pub mod auth;
pub mod error_handling;
pub mod guards;

use crate::state::AppState;
use axum::http;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Level;

/// Apply default middleware layers: request tracing and CORS.
pub fn with_defaults(router: Router<AppState>) -> Router<AppState> {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &http::Request<_>| {
            tracing::span!(
                Level::INFO,
                "request",
                method = %req.method(),
                path = %req.uri().path(),
            )
        })
        .on_response(
            |res: &http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = res.status().as_u16(),
                    elapsed_ms = latency.as_millis() as u64,
                    "request completed"
                );
            },
        );

    router.layer(trace).layer(CorsLayer::permissive())
}
