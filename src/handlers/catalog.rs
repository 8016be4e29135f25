use std::collections::BTreeSet;

use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    error::{AppError, AppResult},
    handlers::{Path, Query, ValidatedJson, window},
    models::{
        Category, CreateSluggedRequest, CreateTitleRequest, Genre, NewTitle, SearchQuery,
        Title, TitleChanges, TitleFilter, UpdateTitleRequest,
    },
    pagination::Page,
};

/// Maps genre slugs to ids; every slug must exist.
async fn resolve_genres(state: &AppState, slugs: &[String]) -> AppResult<Vec<i64>> {
    let wanted: BTreeSet<&str> = slugs.iter().map(String::as_str).collect();
    let genres = state.repo.find_genres(slugs).await?;
    let missing: Vec<&str> = wanted
        .iter()
        .copied()
        .filter(|slug| !genres.iter().any(|genre| genre.slug == *slug))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::field(
            "genre",
            format!("Unknown genre slug(s): {}", missing.join(", ")),
        ));
    }
    Ok(genres.into_iter().map(|genre| genre.id).collect())
}

async fn resolve_category(state: &AppState, slug: &str) -> AppResult<i64> {
    state
        .repo
        .find_category(slug)
        .await?
        .map(|category| category.id)
        .ok_or_else(|| AppError::field("category", format!("Unknown category slug: {slug}")))
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(SearchQuery),
    responses((status = 200, description = "Categories ordered by name", body = Page<Category>)),
    tag = "catalog"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Page<Category>>> {
    let window = window(&state.config, query.page, query.page_size)?;
    let (categories, count) = state.repo.list_categories(query.search, window).await?;
    Ok(Json(Page::new(categories, count, window)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateSluggedRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Invalid data or slug taken")
    ),
    tag = "catalog"
)]
pub async fn create_category(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateSluggedRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let category = state
        .repo
        .create_category(payload.name, payload.slug)
        .await?;
    tracing::info!(slug = %category.slug, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

/// delete_category
///
/// Titles in the category are kept and become uncategorized.
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "catalog"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_category(&slug).await? {
        return Err(AppError::not_found("Category not found."));
    }
    tracing::info!(%slug, "category deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Genres ---

#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(SearchQuery),
    responses((status = 200, description = "Genres ordered by name", body = Page<Genre>)),
    tag = "catalog"
)]
pub async fn list_genres(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Page<Genre>>> {
    let window = window(&state.config, query.page, query.page_size)?;
    let (genres, count) = state.repo.list_genres(query.search, window).await?;
    Ok(Json(Page::new(genres, count, window)?))
}

#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = CreateSluggedRequest,
    responses(
        (status = 201, description = "Genre created", body = Genre),
        (status = 400, description = "Invalid data or slug taken")
    ),
    tag = "catalog"
)]
pub async fn create_genre(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateSluggedRequest>,
) -> AppResult<(StatusCode, Json<Genre>)> {
    let genre = state.repo.create_genre(payload.name, payload.slug).await?;
    tracing::info!(slug = %genre.slug, "genre created");
    Ok((StatusCode::CREATED, Json(genre)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "catalog"
)]
pub async fn delete_genre(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_genre(&slug).await? {
        return Err(AppError::not_found("Genre not found."));
    }
    tracing::info!(%slug, "genre deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Titles ---

/// list_titles
///
/// Filters: `genre` and `category` by slug, exact `year`, `name` substring.
#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(TitleFilter),
    responses((status = 200, description = "Filtered titles", body = Page<Title>)),
    tag = "catalog"
)]
pub async fn list_titles(
    State(state): State<AppState>,
    Query(filter): Query<TitleFilter>,
) -> AppResult<Json<Page<Title>>> {
    let window = window(&state.config, filter.page, filter.page_size)?;
    let (titles, count) = state.repo.list_titles(&filter, window).await?;
    Ok(Json(Page::new(titles, count, window)?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title id")),
    responses(
        (status = 200, description = "Title with rating", body = Title),
        (status = 404, description = "Not found")
    ),
    tag = "catalog"
)]
pub async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Title>> {
    let title = state
        .repo
        .get_title(id)
        .await?
        .ok_or_else(|| AppError::not_found("Title not found."))?;
    Ok(Json(title))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Title created", body = Title),
        (status = 400, description = "Invalid data, unknown slug or duplicate title")
    ),
    tag = "catalog"
)]
pub async fn create_title(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateTitleRequest>,
) -> AppResult<(StatusCode, Json<Title>)> {
    let genre_ids = resolve_genres(&state, &payload.genre).await?;
    let category_id = match payload.category.as_deref() {
        Some(slug) => Some(resolve_category(&state, slug).await?),
        None => None,
    };

    let title = state
        .repo
        .create_title(NewTitle {
            name: payload.name,
            year: payload.year,
            description: payload.description,
            category_id,
            genre_ids,
        })
        .await?;
    tracing::info!(title_id = title.id, name = %title.name, "title created");
    Ok((StatusCode::CREATED, Json(title)))
}

/// update_title
///
/// Partial update. A present `genre` list replaces the genres; `"category": null`
/// clears the category.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title id")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Updated title", body = Title),
        (status = 400, description = "Invalid data, unknown slug or duplicate title"),
        (status = 404, description = "Not found")
    ),
    tag = "catalog"
)]
pub async fn update_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ValidatedJson(payload): ValidatedJson<UpdateTitleRequest>,
) -> AppResult<Json<Title>> {
    if state.repo.get_title(id).await?.is_none() {
        return Err(AppError::not_found("Title not found."));
    }

    let genre_ids = match payload.genre.as_deref() {
        Some(slugs) => Some(resolve_genres(&state, slugs).await?),
        None => None,
    };
    let category_id = match payload.category {
        Some(Some(slug)) => Some(Some(resolve_category(&state, &slug).await?)),
        Some(None) => Some(None),
        None => None,
    };

    let title = state
        .repo
        .update_title(
            id,
            TitleChanges {
                name: payload.name,
                year: payload.year,
                description: payload.description,
                category_id,
                genre_ids,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Title not found."))?;
    tracing::info!(title_id = title.id, "title updated");
    Ok(Json(title))
}

/// delete_title
///
/// Removes the title with its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "catalog"
)]
pub async fn delete_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    if !state.repo.delete_title(id).await? {
        return Err(AppError::not_found("Title not found."));
    }
    tracing::info!(title_id = id, "title deleted");
    Ok(StatusCode::NO_CONTENT)
}
