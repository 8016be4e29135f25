use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::StoreResult,
    models::{
        Category, Comment, Genre, NewComment, NewReview, NewTitle, NewUser, Review,
        ReviewChanges, Title, TitleChanges, TitleFilter, User, UserChanges,
    },
    pagination::Pagination,
};

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers only see this trait,
/// so the Postgres store and the in-memory store are interchangeable.
///
/// Every implementation must enforce the same constraints: unique username, email,
/// category/genre slug, title `(name, year)` and review `(author, title)`, reported as
/// `StoreError::UniqueViolation` with the constraint names used in the migrations.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    // Ordered by username. `search` is a case-insensitive substring of the username.
    async fn list_users(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<User>, i64)>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>>;
    // Cascades to the user's reviews and comments.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;
    // Marks the user confirmed and swaps in a new confirmation secret, only if the
    // stored secret is still `expected_secret`. `None` when the user is gone or the
    // secret was already rotated by a concurrent exchange.
    async fn confirm_user(
        &self,
        id: Uuid,
        expected_secret: &str,
        next_secret: String,
    ) -> StoreResult<Option<User>>;

    // --- Categories & Genres ---
    async fn list_categories(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Category>, i64)>;
    async fn find_category(&self, slug: &str) -> StoreResult<Option<Category>>;
    async fn create_category(&self, name: String, slug: String) -> StoreResult<Category>;
    // Titles referencing the category keep existing with no category.
    async fn delete_category(&self, slug: &str) -> StoreResult<bool>;

    async fn list_genres(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Genre>, i64)>;
    // Returns the genres that exist among `slugs`; missing slugs are simply absent.
    async fn find_genres(&self, slugs: &[String]) -> StoreResult<Vec<Genre>>;
    async fn create_genre(&self, name: String, slug: String) -> StoreResult<Genre>;
    async fn delete_genre(&self, slug: &str) -> StoreResult<bool>;

    // --- Titles ---
    async fn list_titles(
        &self,
        filter: &TitleFilter,
        window: Pagination,
    ) -> StoreResult<(Vec<Title>, i64)>;
    async fn get_title(&self, id: i64) -> StoreResult<Option<Title>>;
    async fn create_title(&self, title: NewTitle) -> StoreResult<Title>;
    async fn update_title(&self, id: i64, changes: TitleChanges) -> StoreResult<Option<Title>>;
    // Cascades to reviews and their comments.
    async fn delete_title(&self, id: i64) -> StoreResult<bool>;

    // --- Reviews ---
    // Newest first.
    async fn list_reviews(
        &self,
        title_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Review>, i64)>;
    // Scoped to the title: a review of another title is `None`.
    async fn get_review(&self, title_id: i64, review_id: i64) -> StoreResult<Option<Review>>;
    async fn has_review_by(&self, title_id: i64, author_id: Uuid) -> StoreResult<bool>;
    async fn create_review(&self, review: NewReview) -> StoreResult<Review>;
    async fn update_review(&self, id: i64, changes: ReviewChanges) -> StoreResult<Option<Review>>;
    async fn delete_review(&self, id: i64) -> StoreResult<bool>;

    // --- Comments ---
    // Oldest first.
    async fn list_comments(
        &self,
        review_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)>;
    async fn get_comment(&self, review_id: i64, comment_id: i64) -> StoreResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment>;
    async fn update_comment(&self, id: i64, text: Option<String>) -> StoreResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> StoreResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, \
                            is_confirmed, confirmation_secret, date_joined";

const REVIEW_SELECT: &str = "SELECT r.id, r.title_id, r.author_id, r.text, u.username AS author, \
                             r.score, r.pub_date FROM reviews r JOIN users u ON u.id = r.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.review_id, c.author_id, c.text, \
                              u.username AS author, c.pub_date \
                              FROM comments c JOIN users u ON u.id = c.author_id";

const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           c.id AS category_id, c.name AS category_name, c.slug AS category_slug,
           (SELECT AVG(r.score)::float8 FROM reviews r WHERE r.title_id = t.id) AS rating
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    WHERE 1 = 1
"#;

const TITLE_COUNT: &str = r#"
    SELECT COUNT(*)
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    WHERE 1 = 1
"#;

/// Joined `titles` + `categories` row with the average score; genres are fetched
/// separately for the whole page.
#[derive(Debug, FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: String,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<f64>,
}

#[derive(Debug, FromRow)]
struct TitleGenreRow {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

/// Substring pattern for `ILIKE ... ESCAPE '\'`. The term is matched literally, so
/// `%` and `_` in a search do not act as wildcards.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Appends the `GET /titles` filters to a query that already ends in `WHERE 1 = 1`.
fn push_title_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    if let Some(genre) = &filter.genre {
        builder.push(
            " AND EXISTS (SELECT 1 FROM title_genres tg JOIN genres g ON g.id = tg.genre_id \
             WHERE tg.title_id = t.id AND g.slug = ",
        );
        builder.push_bind(genre.clone());
        builder.push(")");
    }
    if let Some(category) = &filter.category {
        builder.push(" AND c.slug = ");
        builder.push_bind(category.clone());
    }
    if let Some(year) = filter.year {
        builder.push(" AND t.year = ");
        builder.push_bind(year);
    }
    if let Some(name) = &filter.name {
        builder.push(" AND t.name ILIKE ");
        builder.push_bind(like_pattern(name));
        builder.push(" ESCAPE '\\'");
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches genres to title rows, preserving the row order.
    async fn hydrate_titles(&self, rows: Vec<TitleRow>) -> StoreResult<Vec<Title>> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let genre_rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT tg.title_id, g.id, g.name, g.slug
            FROM title_genres tg
            JOIN genres g ON g.id = tg.genre_id
            WHERE tg.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut genres: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in genre_rows {
            genres.entry(row.title_id).or_default().push(Genre {
                id: row.id,
                name: row.name,
                slug: row.slug,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let category = match (row.category_id, row.category_name, row.category_slug) {
                    (Some(id), Some(name), Some(slug)) => Some(Category { id, name, slug }),
                    _ => None,
                };
                Title {
                    id: row.id,
                    name: row.name,
                    year: row.year,
                    rating: row.rating,
                    description: row.description,
                    genre: genres.remove(&row.id).unwrap_or_default(),
                    category,
                }
            })
            .collect())
    }

    async fn list_slugged<T>(
        &self,
        table: &'static str,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<T>, i64)>
    where
        T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT id, name, slug FROM {table} WHERE 1 = 1"));
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE 1 = 1"));
        if let Some(term) = search {
            query
                .push(" AND name ILIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
            count
                .push(" AND name ILIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
        }
        query
            .push(" ORDER BY name, id LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());

        let items = query.build_query_as::<T>().fetch_all(&self.pool).await?;
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok((items, total))
    }

    async fn insert_title_genres(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        title_id: i64,
        genre_ids: &[i64],
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO title_genres (title_id, genre_id) \
             SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING",
        )
        .bind(title_id)
        .bind(genre_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<User>, i64)> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1 = 1"));
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM users WHERE 1 = 1");
        if let Some(term) = search {
            query
                .push(" AND username ILIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
            count
                .push(" AND username ILIKE ")
                .push_bind(like_pattern(&term))
                .push(" ESCAPE '\\'");
        }
        query
            .push(" ORDER BY username LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());

        let users = query.build_query_as::<User>().fetch_all(&self.pool).await?;
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok((users, total))
    }

    /// create_user
    ///
    /// New users start unconfirmed. Duplicate username/email surface as
    /// `users_username_key` / `users_email_key` violations.
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO users (id, username, email, first_name, last_name, bio, role,
                                  is_confirmed, confirmation_secret, date_joined)
               VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8, NOW())
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.bio)
        .bind(user.role.as_str())
        .bind(user.confirmation_secret)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(user_id = %created.id, username = %created.username, "user created");
        Ok(created)
    }

    /// update_user
    ///
    /// Partial update using `COALESCE`, like every other PATCH in this repository.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let updated = sqlx::query_as::<_, User>(&format!(
            r#"UPDATE users
               SET username = COALESCE($2, username),
                   email = COALESCE($3, email),
                   first_name = COALESCE($4, first_name),
                   last_name = COALESCE($5, last_name),
                   bio = COALESCE($6, bio),
                   role = COALESCE($7, role)
               WHERE id = $1
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.bio)
        .bind(changes.role.map(|role| role.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// confirm_user
    ///
    /// Compare-and-swap on the secret, so two racing exchanges of one code cannot
    /// both succeed.
    async fn confirm_user(
        &self,
        id: Uuid,
        expected_secret: &str,
        next_secret: String,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_confirmed = true, confirmation_secret = $2 \
             WHERE id = $1 AND confirmation_secret = $3 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(next_secret)
        .bind(expected_secret)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_categories(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Category>, i64)> {
        self.list_slugged("categories", search, window).await
    }

    async fn find_category(&self, slug: &str) -> StoreResult<Option<Category>> {
        let category =
            sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(category)
    }

    async fn create_category(&self, name: String, slug: String) -> StoreResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    /// delete_category
    ///
    /// `titles.category_id` is `ON DELETE SET NULL`, so titles survive.
    async fn delete_category(&self, slug: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_genres(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Genre>, i64)> {
        self.list_slugged("genres", search, window).await
    }

    async fn find_genres(&self, slugs: &[String]) -> StoreResult<Vec<Genre>> {
        let genres = sqlx::query_as::<_, Genre>(
            "SELECT id, name, slug FROM genres WHERE slug = ANY($1) ORDER BY name",
        )
        .bind(slugs)
        .fetch_all(&self.pool)
        .await?;
        Ok(genres)
    }

    async fn create_genre(&self, name: String, slug: String) -> StoreResult<Genre> {
        let genre = sqlx::query_as::<_, Genre>(
            "INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- TITLES ---

    /// list_titles
    ///
    /// Filtering with QueryBuilder for safe parameterization; the same filters feed
    /// the page query and the count query.
    async fn list_titles(
        &self,
        filter: &TitleFilter,
        window: Pagination,
    ) -> StoreResult<(Vec<Title>, i64)> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        push_title_filters(&mut query, filter);
        query
            .push(" ORDER BY t.id LIMIT ")
            .push_bind(window.limit())
            .push(" OFFSET ")
            .push_bind(window.offset());

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_COUNT);
        push_title_filters(&mut count, filter);

        let rows = query.build_query_as::<TitleRow>().fetch_all(&self.pool).await?;
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok((self.hydrate_titles(rows).await?, total))
    }

    async fn get_title(&self, id: i64) -> StoreResult<Option<Title>> {
        let row = sqlx::query_as::<_, TitleRow>(&format!("{TITLE_SELECT} AND t.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate_titles(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// create_title
    ///
    /// Inserts the title and its genre links in one transaction.
    async fn create_title(&self, title: NewTitle) -> StoreResult<Title> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&title.name)
        .bind(title.year)
        .bind(&title.description)
        .bind(title.category_id)
        .fetch_one(&mut *tx)
        .await?;
        Self::insert_title_genres(&mut tx, id, &title.genre_ids).await?;
        tx.commit().await?;

        tracing::info!(title_id = id, name = %title.name, "title created");
        self.get_title(id)
            .await?
            .ok_or(crate::error::StoreError::Database(sqlx::Error::RowNotFound))
    }

    /// update_title
    ///
    /// `category_id: Some(None)` writes NULL; `genre_ids: Some(_)` replaces the links.
    async fn update_title(&self, id: i64, changes: TitleChanges) -> StoreResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;
        let (set_category, category_id) = match changes.category_id {
            Some(category_id) => (true, category_id),
            None => (false, None),
        };
        let result = sqlx::query(
            r#"UPDATE titles
               SET name = COALESCE($2, name),
                   year = COALESCE($3, year),
                   description = COALESCE($4, description),
                   category_id = CASE WHEN $5 THEN $6 ELSE category_id END
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.year)
        .bind(changes.description)
        .bind(set_category)
        .bind(category_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(genre_ids) = changes.genre_ids {
            sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            Self::insert_title_genres(&mut tx, id, &genre_ids).await?;
        }
        tx.commit().await?;
        self.get_title(id).await
    }

    async fn delete_title(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(
        &self,
        title_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Review>, i64)> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.pub_date DESC, r.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(title_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((reviews, total))
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> StoreResult<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.id = $1 AND r.title_id = $2"
        ))
        .bind(review_id)
        .bind(title_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn has_review_by(&self, title_id: i64, author_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE title_id = $1 AND author_id = $2)",
        )
        .bind(title_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// create_review
    ///
    /// Insert and author join in one statement via a CTE. A concurrent duplicate trips
    /// `reviews_author_title_key`, which the `?` conversion classifies.
    async fn create_review(&self, review: NewReview) -> StoreResult<Review> {
        let created = sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score, pub_date)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id, i.author_id, i.text, u.username AS author, i.score, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review.title_id)
        .bind(review.author_id)
        .bind(review.text)
        .bind(review.score)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    /// update_review
    ///
    /// `pub_date` is never part of the SET list.
    async fn update_review(&self, id: i64, changes: ReviewChanges) -> StoreResult<Option<Review>> {
        let updated = sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text), score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT r.id, r.title_id, r.author_id, r.text, u.username AS author, r.score, r.pub_date
            FROM updated r JOIN users u ON u.id = r.author_id
            "#,
        )
        .bind(id)
        .bind(changes.text)
        .bind(changes.score)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_review(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(
        &self,
        review_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.pub_date ASC, c.id ASC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(review_id)
        .bind(window.limit())
        .bind(window.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;
        Ok((comments, total))
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> StoreResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.id = $1 AND c.review_id = $2"
        ))
        .bind(comment_id)
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let created = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text, pub_date)
                VALUES ($1, $2, $3, NOW())
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id, i.author_id, i.text, u.username AS author, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(comment.review_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> StoreResult<Option<Comment>> {
        let updated = sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = COALESCE($2, text)
                WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT c.id, c.review_id, c.author_id, c.text, u.username AS author, c.pub_date
            FROM updated c JOIN users u ON u.id = c.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_matches_wildcards_literally() {
        assert_eq!(like_pattern("heat"), "%heat%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("c:\\"), "%c:\\\\%");
    }
}
