use axum::{
    Json, Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use serde_json::{Value, json};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod permissions;
pub mod repository;

// One router module per resource group, each guarded by a single policy.
pub mod routes;

use error::AppError;
use permissions::{Policy, enforce};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use confirmation::ConfirmationCodes;
pub use mailer::{LogMailer, MailerState, MockMailer, SmtpMailer};
pub use memory::InMemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// Schema migrations, embedded at compile time and run at startup.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// ApiDoc
///
/// Auto-generates the OpenAPI document from the `#[utoipa::path]` annotations on the
/// handlers and the `ToSchema` derives on the models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::token,
        handlers::users::get_me, handlers::users::update_me, handlers::users::list_users,
        handlers::users::create_user, handlers::users::get_user, handlers::users::update_user,
        handlers::users::delete_user,
        handlers::catalog::list_categories, handlers::catalog::create_category,
        handlers::catalog::delete_category, handlers::catalog::list_genres,
        handlers::catalog::create_genre, handlers::catalog::delete_genre,
        handlers::catalog::list_titles, handlers::catalog::get_title,
        handlers::catalog::create_title, handlers::catalog::update_title,
        handlers::catalog::delete_title,
        handlers::feedback::list_reviews, handlers::feedback::get_review,
        handlers::feedback::create_review, handlers::feedback::update_review,
        handlers::feedback::delete_review, handlers::feedback::list_comments,
        handlers::feedback::get_comment, handlers::feedback::create_comment,
        handlers::feedback::update_comment, handlers::feedback::delete_comment,
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::SignupRequest, models::TokenRequest,
            models::TokenResponse, models::CreateUserRequest, models::UpdateUserRequest,
            models::UpdateOwnProfileRequest, models::Category, models::Genre,
            models::CreateSluggedRequest, models::Title, models::CreateTitleRequest,
            models::UpdateTitleRequest, models::Review, models::CreateReviewRequest,
            models::UpdateReviewRequest, models::Comment, models::CreateCommentRequest,
            models::UpdateCommentRequest,
        )
    ),
    tags(
        (name = "auth", description = "Confirmation-code login"),
        (name = "users", description = "Profiles and admin user management"),
        (name = "catalog", description = "Categories, genres and titles"),
        (name = "feedback", description = "Reviews and comments")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single container of shared services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres, or in-memory for tests and database-less local runs.
    pub repo: RepositoryState,
    /// Delivery of confirmation codes.
    pub mailer: MailerState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
    /// Confirmation-code issuer/verifier keyed by `config.confirmation_secret`.
    pub codes: ConfirmationCodes,
}

impl AppState {
    /// Assembles the state, deriving the code generator from the configuration.
    pub fn new(repo: RepositoryState, mailer: MailerState, config: AppConfig) -> Self {
        let codes =
            ConfirmationCodes::new(&config.confirmation_secret, config.confirmation_code_ttl());
        Self {
            repo,
            mailer,
            config,
            codes,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors (notably `AuthUser`) pull single components out of the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> AppError {
    AppError::not_found("Not found.")
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// create_router
///
/// Assembles the routing structure, attaches each group's access policy, and wraps
/// everything in the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let guarded = |policy: Policy| middleware::from_fn_with_state((state.clone(), policy), enforce);

    // 2. API v1: one policy per resource group.
    let api = Router::new()
        .merge(routes::auth::routes())
        .merge(routes::catalog::routes().route_layer(guarded(Policy::admin_or_read_only())))
        .merge(routes::feedback::routes().route_layer(guarded(Policy::staff_or_author())))
        .merge(routes::users::me_routes().route_layer(guarded(Policy::authenticated())))
        .merge(routes::users::admin_routes().route_layer(guarded(Policy::admin_only())));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health: liveness probe for load balancers.
        .route("/health", axum::routing::get(health))
        .nest("/api/v1", api)
        // Known path, unsupported verb: JSON 405 instead of an empty body.
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        // Apply the Unified State to all routes.
        .with_state(state);

    // 4. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, carrying the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span for `TraceLayer`, so every log line of one request is
/// correlated by its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
