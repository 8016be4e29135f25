use axum::{
    Json,
    extract::State,
    http::{Method, StatusCode},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult, NON_FIELD_ERRORS},
    handlers::{Path, Query, ValidatedJson, window},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, NewComment, NewReview, PageQuery,
        Review, ReviewChanges, Title, UpdateCommentRequest, UpdateReviewRequest,
    },
    pagination::Page,
    permissions::{Policy, RequestContext},
};

/// Object-level check for PATCH/DELETE: the author, a moderator or an admin.
fn authorize_change(user: &AuthUser, method: &Method, author_id: Uuid) -> AppResult<()> {
    let result = Policy::staff_or_author()
        .check_object(&RequestContext::new(method, Some(user)), author_id);
    if result.is_err() {
        tracing::info!(username = %user.username, %method, "change to someone else's content denied");
    }
    result
}

async fn title_for(state: &AppState, title_id: i64) -> AppResult<Title> {
    state
        .repo
        .get_title(title_id)
        .await?
        .ok_or_else(|| AppError::not_found("Title not found."))
}

/// The review, which must belong to the title in the path.
async fn review_for(state: &AppState, title_id: i64, review_id: i64) -> AppResult<Review> {
    state
        .repo
        .get_review(title_id, review_id)
        .await?
        .ok_or_else(|| AppError::not_found("Review not found."))
}

async fn comment_for(
    state: &AppState,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> AppResult<Comment> {
    let review = review_for(state, title_id, review_id).await?;
    state
        .repo
        .get_comment(review.id, comment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found."))
}

// --- Reviews ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title id"), PageQuery),
    responses(
        (status = 200, description = "Reviews, newest first", body = Page<Review>),
        (status = 404, description = "Title not found")
    ),
    tag = "feedback"
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Review>>> {
    let title = title_for(&state, title_id).await?;
    let window = window(&state.config, query.page, query.page_size)?;
    let (reviews, count) = state.repo.list_reviews(title.id, window).await?;
    Ok(Json(Page::new(reviews, count, window)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn get_review(
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<Json<Review>> {
    Ok(Json(review_for(&state, title_id, review_id).await?))
}

/// create_review
///
/// One review per author per title. The pre-check gives the common case a clear
/// message; a concurrent duplicate is caught by the storage constraint and mapped to
/// the same 400.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Invalid data or already reviewed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Title not found")
    ),
    tag = "feedback"
)]
pub async fn create_review(
    user: AuthUser,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let title = title_for(&state, title_id).await?;

    if state.repo.has_review_by(title.id, user.id).await? {
        return Err(AppError::field(
            NON_FIELD_ERRORS,
            "You have already left a review for this title",
        ));
    }

    let review = state
        .repo
        .create_review(NewReview {
            title_id: title.id,
            author_id: user.id,
            text: payload.text,
            score: payload.score,
        })
        .await?;
    tracing::info!(review_id = review.id, title_id = title.id, author = %user.username, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated review", body = Review),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn update_review(
    user: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidatedJson(payload): ValidatedJson<UpdateReviewRequest>,
) -> AppResult<Json<Review>> {
    let review = review_for(&state, title_id, review_id).await?;
    authorize_change(&user, &Method::PATCH, review.author_id)?;

    let review = state
        .repo
        .update_review(
            review.id,
            ReviewChanges {
                text: payload.text,
                score: payload.score,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Review not found."))?;
    tracing::info!(review_id = review.id, editor = %user.username, "review updated");
    Ok(Json(review))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 204, description = "Deleted, with its comments"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn delete_review(
    user: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    let review = review_for(&state, title_id, review_id).await?;
    authorize_change(&user, &Method::DELETE, review.author_id)?;
    state.repo.delete_review(review.id).await?;
    tracing::info!(review_id, editor = %user.username, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Comments, oldest first", body = Page<Comment>),
        (status = 404, description = "Review not found")
    ),
    tag = "feedback"
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Comment>>> {
    let review = review_for(&state, title_id, review_id).await?;
    let window = window(&state.config, query.page, query.page_size)?;
    let (comments, count) = state.repo.list_comments(review.id, window).await?;
    Ok(Json(Page::new(comments, count, window)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment", body = Comment),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn get_comment(
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> AppResult<Json<Comment>> {
    Ok(Json(comment_for(&state, title_id, review_id, comment_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Review not found")
    ),
    tag = "feedback"
)]
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidatedJson(payload): ValidatedJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let review = review_for(&state, title_id, review_id).await?;
    let comment = state
        .repo
        .create_comment(NewComment {
            review_id: review.id,
            author_id: user.id,
            text: payload.text,
        })
        .await?;
    tracing::info!(comment_id = comment.id, review_id = review.id, author = %user.username, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated comment", body = Comment),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    ValidatedJson(payload): ValidatedJson<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let comment = comment_for(&state, title_id, review_id, comment_id).await?;
    authorize_change(&user, &Method::PATCH, comment.author_id)?;

    let comment = state
        .repo
        .update_comment(comment.id, payload.text)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found."))?;
    Ok(Json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "feedback"
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> AppResult<StatusCode> {
    let comment = comment_for(&state, title_id, review_id, comment_id).await?;
    authorize_change(&user, &Method::DELETE, comment.author_id)?;
    state.repo.delete_comment(comment.id).await?;
    tracing::info!(comment_id, editor = %user.username, "comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
