use std::{borrow::Cow, sync::LazyLock};

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Upper bound accepted for `?page_size=`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Username reserved for the self-service profile route (`/users/me`).
pub const RESERVED_USERNAME: &str = "me";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid"));
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid"));

fn validate_username_not_reserved(username: &str) -> Result<(), ValidationError> {
    if username.eq_ignore_ascii_case(RESERVED_USERNAME) {
        return Err(ValidationError::new("reserved_username")
            .with_message(Cow::Borrowed("The username \"me\" is reserved")));
    }
    Ok(())
}

fn validate_year_not_in_future(year: i32) -> Result<(), ValidationError> {
    if year > Utc::now().year() {
        return Err(ValidationError::new("year_in_future")
            .with_message(Cow::Borrowed("The release year cannot be in the future")));
    }
    Ok(())
}

/// Lets PATCH payloads tell "field absent" (`None`) from "field set to null" (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- Identity ---

/// Role
///
/// The RBAC field. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// User
///
/// The canonical identity record from the `users` table. Internal only: it carries
/// the confirmation secret, so responses go through `UserProfile`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_confirmed: bool,
    // Per-user salt mixed into confirmation codes. Rotating it revokes outstanding codes.
    pub confirmation_secret: String,
    pub date_joined: DateTime<Utc>,
}

/// UserProfile
///
/// Public representation of a user (admin user endpoints and `/users/me`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

/// NewUser
///
/// Insert payload for the repository. The id and join date are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
    pub confirmation_secret: String,
}

/// UserChanges
///
/// Partial update applied by the repository; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
}

/// SignupRequest
///
/// Input payload for `POST /auth/signup`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct SignupRequest {
    #[validate(
        length(min = 1, max = 150),
        regex(path = *USERNAME_RE, message = "Letters, digits and @/./+/-/_ only"),
        custom(function = "validate_username_not_reserved")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"), length(max = 254))]
    pub email: String,
}

/// TokenRequest
///
/// Input payload for `POST /auth/token`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct TokenRequest {
    #[validate(length(min = 1, max = 150, message = "This field may not be blank"))]
    pub username: String,
    #[validate(length(min = 1, message = "This field may not be blank"))]
    pub confirmation_code: String,
}

/// TokenResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// CreateUserRequest
///
/// Admin-only payload for `POST /users`. The role defaults to `user`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 150),
        regex(path = *USERNAME_RE, message = "Letters, digits and @/./+/-/_ only"),
        custom(function = "validate_username_not_reserved")
    )]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"), length(max = 254))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub role: Role,
}

/// UpdateUserRequest
///
/// Admin-only partial update (`PATCH /users/{username}`). May change the role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 150),
        regex(path = *USERNAME_RE, message = "Letters, digits and @/./+/-/_ only"),
        custom(function = "validate_username_not_reserved")
    )]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Enter a valid email address"), length(max = 254))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// UpdateOwnProfileRequest
///
/// Self-service partial update (`PATCH /users/me`). There is deliberately no `role`
/// field: a client-supplied role is dropped during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateOwnProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(min = 1, max = 150),
        regex(path = *USERNAME_RE, message = "Letters, digits and @/./+/-/_ only"),
        custom(function = "validate_username_not_reserved")
    )]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Enter a valid email address"), length(max = 254))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl From<UpdateOwnProfileRequest> for UserChanges {
    fn from(req: UpdateOwnProfileRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            bio: req.bio,
            role: None,
        }
    }
}

impl From<UpdateUserRequest> for UserChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            bio: req.bio,
            role: req.role,
        }
    }
}

// --- Catalog ---

/// Category
///
/// A row of `categories`. Serialized as `{name, slug}`; the numeric id stays internal
/// because categories are addressed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Category {
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Genre
///
/// A row of `genres`; same shape and addressing as `Category`.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Genre {
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// CreateSluggedRequest
///
/// Input payload for `POST /categories` and `POST /genres`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateSluggedRequest {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(
        length(min = 1, max = 50),
        regex(path = *SLUG_RE, message = "Letters, digits, hyphens and underscores only")
    )]
    pub slug: String,
}

/// Title
///
/// Read representation of a title: category and genres expanded, plus the derived
/// average `rating` (`None` when the title has no reviews).
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: String,
    pub genre: Vec<Genre>,
    pub category: Option<Category>,
}

/// NewTitle
///
/// Insert payload with slugs already resolved to ids.
#[derive(Debug, Clone)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category_id: Option<i64>,
    pub genre_ids: Vec<i64>,
}

/// TitleChanges
///
/// Partial update. `category_id: Some(None)` clears the category; `genre_ids: Some(_)`
/// replaces the whole genre set.
#[derive(Debug, Clone, Default)]
pub struct TitleChanges {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub genre_ids: Option<Vec<i64>>,
}

/// CreateTitleRequest
///
/// Input payload for `POST /titles`. Genres and category are given by slug.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateTitleRequest {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(custom(function = "validate_year_not_in_future"))]
    pub year: i32,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, message = "At least one genre is required"))]
    pub genre: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// UpdateTitleRequest
///
/// Partial update payload for `PATCH /titles/{id}`. `"category": null` clears the
/// category, an absent key leaves it unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_year_not_in_future"))]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "At least one genre is required"))]
    pub genre: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub category: Option<Option<String>>,
}

// --- Feedback ---

/// Review
///
/// A row of `reviews` joined with the author's username.
#[derive(Debug, Clone, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub title_id: i64,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub author_id: Uuid,
    pub text: String,
    // Username of the author, loaded via JOIN.
    pub author: String,
    pub score: i32,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub title_id: i64,
    pub author_id: Uuid,
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ReviewChanges {
    pub text: Option<String>,
    pub score: Option<i32>,
}

/// CreateReviewRequest
///
/// Input payload for posting a review. Author and title come from the request
/// context, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "This field may not be blank"))]
    pub text: String,
    #[validate(range(min = 1, max = 10, message = "Score must be between 1 and 10"))]
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "This field may not be blank"))]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10, message = "Score must be between 1 and 10"))]
    pub score: Option<i32>,
}

/// Comment
///
/// A row of `comments` joined with the author's username.
#[derive(Debug, Clone, Serialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub review_id: i64,
    #[serde(skip_serializing)]
    #[ts(skip)]
    pub author_id: Uuid,
    pub text: String,
    pub author: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub review_id: i64,
    pub author_id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "This field may not be blank"))]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "This field may not be blank"))]
    pub text: Option<String>,
}

// --- Listing ---

/// PageQuery
///
/// Pagination parameters shared by list endpoints without filters.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// SearchQuery
///
/// `?search=` plus pagination, for categories, genres and users.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive substring match on the name (username for users).
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// TitleFilter
///
/// Query parameters accepted by `GET /titles`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleFilter {
    /// Genre slug.
    pub genre: Option<String>,
    /// Category slug.
    pub category: Option<String>,
    pub year: Option<i32>,
    /// Case-insensitive substring match on the title name.
    pub name: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}
