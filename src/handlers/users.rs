use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::AuthUser,
    confirmation::ConfirmationCodes,
    error::{AppError, AppResult},
    handlers::{Path, Query, ValidatedJson, window},
    models::{
        CreateUserRequest, NewUser, SearchQuery, UpdateOwnProfileRequest, UpdateUserRequest,
        User, UserProfile,
    },
    pagination::Page,
};

async fn user_by_username(state: &AppState, username: &str) -> AppResult<User> {
    state
        .repo
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))
}

// --- Own profile ---

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "The caller's profile", body = UserProfile),
        (status = 401, description = "Not authenticated")
    ),
    tag = "users"
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(user.into()))
}

/// update_me
///
/// Self-service partial update. `role` is not part of the payload type, so a
/// client-supplied role never reaches the repository.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateOwnProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "users"
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<UpdateOwnProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .repo
        .update_user(id, payload.into())
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(user.into()))
}

// --- Admin user management ---

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(SearchQuery),
    responses(
        (status = 200, description = "Users ordered by username", body = Page<UserProfile>),
        (status = 403, description = "Admin only")
    ),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Page<UserProfile>>> {
    let window = window(&state.config, query.page, query.page_size)?;
    let (users, count) = state.repo.list_users(query.search, window).await?;
    Ok(Json(Page::new(users, count, window)?.map(UserProfile::from)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid data or username/email taken"),
        (status = 403, description = "Admin only")
    ),
    tag = "users"
)]
pub async fn create_user(
    AuthUser { username: admin, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            bio: payload.bio,
            role: payload.role,
            confirmation_secret: ConfirmationCodes::new_user_secret(),
        })
        .await?;
    tracing::info!(%admin, username = %user.username, role = user.role.as_str(), "user created by admin");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "User", body = UserProfile),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(user_by_username(&state, &username).await?.into()))
}

/// update_user
///
/// Admin partial update; the only path through which a role can change.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserProfile),
        (status = 400, description = "Invalid data"),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn update_user(
    AuthUser { username: admin, .. }: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    let target = user_by_username(&state, &username).await?;
    let role_change = payload.role.filter(|role| *role != target.role);
    let user = state
        .repo
        .update_user(target.id, payload.into())
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    if let Some(role) = role_change {
        tracing::info!(%admin, username = %user.username, role = role.as_str(), "role changed");
    }
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 204, description = "Deleted, with the user's reviews and comments"),
        (status = 404, description = "Not found")
    ),
    tag = "users"
)]
pub async fn delete_user(
    AuthUser { username: admin, .. }: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    let target = user_by_username(&state, &username).await?;
    state.repo.delete_user(target.id).await?;
    tracing::info!(%admin, %username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
