use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// Security headers for every response; respondents open these links from
/// mail clients and browsers we do not control.
async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data:; \
             connect-src 'self'",
        ),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // CORS for the staff tooling that consumes the internal surface
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Respondent-facing flow, authenticated by the opaque form token
        .nest("/form", form_routes())
        // Staff surface (requires JWT + staff role)
        .nest(
            "/internal",
            internal_routes()
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    middlewares::auth::auth_middleware,
                )),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

fn form_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/upload", post(handlers::forms::upload_file))
        .route("/{token}", get(handlers::forms::enter_form))
        .route(
            "/{token}/step/{step}",
            get(handlers::forms::get_step).post(handlers::forms::post_step),
        )
        .route("/{token}/completed", get(handlers::forms::get_completed))
}

fn internal_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/questionnaires",
            post(handlers::internal::create_questionnaire),
        )
        .route(
            "/questionnaires/{id}",
            get(handlers::internal::get_questionnaire),
        )
        .route(
            "/questionnaires/{id}/invitations",
            post(handlers::internal::create_invitation),
        )
        .route(
            "/submissions/{token}/report",
            get(handlers::internal::submission_report),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::staff_guard_middleware,
        ))
}
