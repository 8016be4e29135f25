use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// Own-profile routes. Registered with the `authenticated` policy.
///
/// `/users/me` is a static segment, so it always wins over `/users/{username}`;
/// `me` is also a reserved username and can never name a real account.
pub fn me_routes() -> Router<AppState> {
    Router::new()
        // GET/PATCH /users/me
        .route("/users/me", get(users::get_me).patch(users::update_me))
}

/// Admin user management. Registered with the `admin_only` policy.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /users?search=
        .route("/users", get(users::list_users).post(users::create_user))
        // GET/PATCH/DELETE /users/{username}
        .route(
            "/users/{username}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
}
