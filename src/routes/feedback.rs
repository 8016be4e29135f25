use crate::{AppState, handlers::feedback};
use axum::{Router, routing::get};

/// Feedback Router Module
///
/// Reviews and comments. The route layer only decides whether the caller may read
/// or write at all; authorship of an existing review/comment is checked in the
/// handlers once the object is loaded.
pub fn routes() -> Router<AppState> {
    Router::new()
        // GET/POST /titles/{title_id}/reviews
        .route(
            "/titles/{title_id}/reviews",
            get(feedback::list_reviews).post(feedback::create_review),
        )
        // GET/PATCH/DELETE /titles/{title_id}/reviews/{review_id}
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(feedback::get_review)
                .patch(feedback::update_review)
                .delete(feedback::delete_review),
        )
        // GET/POST /titles/{title_id}/reviews/{review_id}/comments
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(feedback::list_comments).post(feedback::create_comment),
        )
        // GET/PATCH/DELETE /titles/{title_id}/reviews/{review_id}/comments/{comment_id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(feedback::get_comment)
                .patch(feedback::update_comment)
                .delete(feedback::delete_comment),
        )
}
