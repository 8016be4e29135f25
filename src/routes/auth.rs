use crate::{AppState, handlers::auth};
use axum::{Router, routing::post};

/// Auth Router Module
///
/// No policy: anyone may sign up or exchange a code.
pub fn routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Creates the user (or re-issues for an identical username/email pair) and mails a code.
        .route("/auth/signup", post(auth::signup))
        // POST /auth/token
        // Confirmation code in, access token out.
        .route("/auth/token", post(auth::token))
}
