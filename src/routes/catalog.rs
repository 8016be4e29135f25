use crate::{AppState, handlers::catalog};
use axum::{
    Router,
    routing::{delete, get},
};

/// Catalog Router Module
///
/// Read access for everyone, writes for admins. Categories and genres are addressed
/// by slug and have no retrieve or update route; titles are addressed by id.
/// PUT is never routed, only PATCH, so it answers 405.
pub fn routes() -> Router<AppState> {
    Router::new()
        // GET/POST /categories
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        // DELETE /categories/{slug}
        .route("/categories/{slug}", delete(catalog::delete_category))
        // GET/POST /genres
        .route("/genres", get(catalog::list_genres).post(catalog::create_genre))
        // DELETE /genres/{slug}
        .route("/genres/{slug}", delete(catalog::delete_genre))
        // GET/POST /titles?genre=&category=&year=&name=
        .route("/titles", get(catalog::list_titles).post(catalog::create_title))
        // GET/PATCH/DELETE /titles/{id}
        .route(
            "/titles/{id}",
            get(catalog::get_title)
                .patch(catalog::update_title)
                .delete(catalog::delete_title),
        )
}
