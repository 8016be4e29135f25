use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    models::{
        Category, Comment, Genre, NewComment, NewReview, NewTitle, NewUser, Review,
        ReviewChanges, Title, TitleChanges, TitleFilter, User, UserChanges,
    },
    pagination::Pagination,
    repository::Repository,
};

#[derive(Debug, Clone)]
struct TitleRecord {
    id: i64,
    name: String,
    year: i32,
    description: String,
    category_id: Option<i64>,
    genre_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
struct ReviewRecord {
    id: i64,
    title_id: i64,
    author_id: Uuid,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: i64,
    review_id: i64,
    author_id: Uuid,
    text: String,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    users: BTreeMap<Uuid, User>,
    categories: BTreeMap<i64, Category>,
    genres: BTreeMap<i64, Genre>,
    titles: BTreeMap<i64, TitleRecord>,
    reviews: BTreeMap<i64, ReviewRecord>,
    comments: BTreeMap<i64, CommentRecord>,
    last_id: i64,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .get(&id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn check_user_unique(&self, id: Option<Uuid>, username: &str, email: &str) -> StoreResult<()> {
        for user in self.users.values().filter(|user| Some(user.id) != id) {
            if user.username == username {
                return Err(StoreError::UniqueViolation("users_username_key".to_string()));
            }
            if user.email.eq_ignore_ascii_case(email) {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
        }
        Ok(())
    }

    fn check_title_unique(&self, id: Option<i64>, name: &str, year: i32) -> StoreResult<()> {
        let taken = self
            .titles
            .values()
            .any(|title| Some(title.id) != id && title.name == name && title.year == year);
        if taken {
            return Err(StoreError::UniqueViolation("titles_name_year_key".to_string()));
        }
        Ok(())
    }

    fn title_view(&self, record: &TitleRecord) -> Title {
        let scores: Vec<i32> = self
            .reviews
            .values()
            .filter(|review| review.title_id == record.id)
            .map(|review| review.score)
            .collect();
        let rating = (!scores.is_empty())
            .then(|| scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64);

        let mut genre: Vec<Genre> = record
            .genre_ids
            .iter()
            .filter_map(|id| self.genres.get(id).cloned())
            .collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));

        Title {
            id: record.id,
            name: record.name.clone(),
            year: record.year,
            rating,
            description: record.description.clone(),
            genre,
            category: record
                .category_id
                .and_then(|id| self.categories.get(&id).cloned()),
        }
    }

    fn review_view(&self, record: &ReviewRecord) -> Review {
        Review {
            id: record.id,
            title_id: record.title_id,
            author_id: record.author_id,
            text: record.text.clone(),
            author: self.username_of(record.author_id),
            score: record.score,
            pub_date: record.pub_date,
        }
    }

    fn comment_view(&self, record: &CommentRecord) -> Comment {
        Comment {
            id: record.id,
            review_id: record.review_id,
            author_id: record.author_id,
            text: record.text.clone(),
            author: self.username_of(record.author_id),
            pub_date: record.pub_date,
        }
    }

    /// Removes reviews matching `doomed` together with their comments.
    fn remove_reviews(&mut self, doomed: impl Fn(&ReviewRecord) -> bool) {
        let ids: Vec<i64> = self
            .reviews
            .values()
            .filter(|review| doomed(review))
            .map(|review| review.id)
            .collect();
        for id in &ids {
            self.reviews.remove(id);
        }
        self.comments.retain(|_, comment| !ids.contains(&comment.review_id));
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn window_of<T>(items: Vec<T>, window: Pagination) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(window.offset() as usize)
        .take(window.limit() as usize)
        .collect();
    (page, total)
}

/// Name-ordered, optionally searched, slice of the categories or genres table.
fn list_slugged<T: Clone>(
    items: &BTreeMap<i64, T>,
    name: impl Fn(&T) -> &str,
    search: Option<String>,
) -> Vec<T> {
    let mut matching: Vec<T> = items
        .values()
        .filter(|item| search.as_deref().is_none_or(|term| contains_ci(name(item), term)))
        .cloned()
        .collect();
    // Stable sort over id order, so equal names stay ordered by id.
    matching.sort_by(|a, b| name(a).cmp(name(b)));
    matching
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Used by the test suite and by
/// local runs without `DATABASE_URL`. Enforces the same unique constraints (with the
/// same constraint names), cascades and `SET NULL` rules as the Postgres schema.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: Mutex<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panic mid-write cannot leave a partially applied change: every method
        // validates before mutating.
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<User>, i64)> {
        let store = self.lock();
        let mut users: Vec<User> = store
            .users
            .values()
            .filter(|user| {
                search
                    .as_deref()
                    .is_none_or(|term| contains_ci(&user.username, term))
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(window_of(users, window))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut store = self.lock();
        store.check_user_unique(None, &user.username, &user.email)?;
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
            is_confirmed: false,
            confirmation_secret: user.confirmation_secret,
            date_joined: Utc::now(),
        };
        store.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> StoreResult<Option<User>> {
        let mut store = self.lock();
        let Some(mut user) = store.users.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(bio) = changes.bio {
            user.bio = bio;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        store.check_user_unique(Some(id), &user.username, &user.email)?;
        store.users.insert(id, user.clone());
        Ok(Some(user))
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut store = self.lock();
        if store.users.remove(&id).is_none() {
            return Ok(false);
        }
        store.remove_reviews(|review| review.author_id == id);
        store.comments.retain(|_, comment| comment.author_id != id);
        Ok(true)
    }

    async fn confirm_user(
        &self,
        id: Uuid,
        expected_secret: &str,
        next_secret: String,
    ) -> StoreResult<Option<User>> {
        let mut store = self.lock();
        Ok(store
            .users
            .get_mut(&id)
            .filter(|user| user.confirmation_secret == expected_secret)
            .map(|user| {
                user.is_confirmed = true;
                user.confirmation_secret = next_secret;
                user.clone()
            }))
    }

    // --- CATEGORIES & GENRES ---

    async fn list_categories(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Category>, i64)> {
        let store = self.lock();
        let all = list_slugged(&store.categories, |c| c.name.as_str(), search);
        Ok(window_of(all, window))
    }

    async fn find_category(&self, slug: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .lock()
            .categories
            .values()
            .find(|category| category.slug == slug)
            .cloned())
    }

    async fn create_category(&self, name: String, slug: String) -> StoreResult<Category> {
        let mut store = self.lock();
        if store.categories.values().any(|category| category.slug == slug) {
            return Err(StoreError::UniqueViolation("categories_slug_key".to_string()));
        }
        let category = Category {
            id: store.next_id(),
            name,
            slug,
        };
        store.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn delete_category(&self, slug: &str) -> StoreResult<bool> {
        let mut store = self.lock();
        let Some(id) = store
            .categories
            .values()
            .find(|category| category.slug == slug)
            .map(|category| category.id)
        else {
            return Ok(false);
        };
        store.categories.remove(&id);
        for title in store.titles.values_mut() {
            if title.category_id == Some(id) {
                title.category_id = None;
            }
        }
        Ok(true)
    }

    async fn list_genres(
        &self,
        search: Option<String>,
        window: Pagination,
    ) -> StoreResult<(Vec<Genre>, i64)> {
        let store = self.lock();
        let all = list_slugged(&store.genres, |g| g.name.as_str(), search);
        Ok(window_of(all, window))
    }

    async fn find_genres(&self, slugs: &[String]) -> StoreResult<Vec<Genre>> {
        let store = self.lock();
        let mut genres: Vec<Genre> = store
            .genres
            .values()
            .filter(|genre| slugs.contains(&genre.slug))
            .cloned()
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }

    async fn create_genre(&self, name: String, slug: String) -> StoreResult<Genre> {
        let mut store = self.lock();
        if store.genres.values().any(|genre| genre.slug == slug) {
            return Err(StoreError::UniqueViolation("genres_slug_key".to_string()));
        }
        let genre = Genre {
            id: store.next_id(),
            name,
            slug,
        };
        store.genres.insert(genre.id, genre.clone());
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> StoreResult<bool> {
        let mut store = self.lock();
        let Some(id) = store
            .genres
            .values()
            .find(|genre| genre.slug == slug)
            .map(|genre| genre.id)
        else {
            return Ok(false);
        };
        store.genres.remove(&id);
        for title in store.titles.values_mut() {
            title.genre_ids.retain(|genre_id| *genre_id != id);
        }
        Ok(true)
    }

    // --- TITLES ---

    async fn list_titles(
        &self,
        filter: &TitleFilter,
        window: Pagination,
    ) -> StoreResult<(Vec<Title>, i64)> {
        let store = self.lock();
        let titles: Vec<Title> = store
            .titles
            .values()
            .map(|record| store.title_view(record))
            .filter(|title| {
                filter
                    .genre
                    .as_deref()
                    .is_none_or(|slug| title.genre.iter().any(|g| g.slug == slug))
                    && filter.category.as_deref().is_none_or(|slug| {
                        title.category.as_ref().is_some_and(|c| c.slug == slug)
                    })
                    && filter.year.is_none_or(|year| title.year == year)
                    && filter
                        .name
                        .as_deref()
                        .is_none_or(|term| contains_ci(&title.name, term))
            })
            .collect();
        Ok(window_of(titles, window))
    }

    async fn get_title(&self, id: i64) -> StoreResult<Option<Title>> {
        let store = self.lock();
        Ok(store.titles.get(&id).map(|record| store.title_view(record)))
    }

    async fn create_title(&self, title: NewTitle) -> StoreResult<Title> {
        let mut store = self.lock();
        store.check_title_unique(None, &title.name, title.year)?;
        let mut genre_ids = title.genre_ids;
        genre_ids.dedup();
        let record = TitleRecord {
            id: store.next_id(),
            name: title.name,
            year: title.year,
            description: title.description,
            category_id: title.category_id,
            genre_ids,
        };
        let view = store.title_view(&record);
        store.titles.insert(record.id, record);
        Ok(view)
    }

    async fn update_title(&self, id: i64, changes: TitleChanges) -> StoreResult<Option<Title>> {
        let mut store = self.lock();
        let Some(mut record) = store.titles.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            record.name = name;
        }
        if let Some(year) = changes.year {
            record.year = year;
        }
        if let Some(description) = changes.description {
            record.description = description;
        }
        if let Some(category_id) = changes.category_id {
            record.category_id = category_id;
        }
        if let Some(mut genre_ids) = changes.genre_ids {
            genre_ids.dedup();
            record.genre_ids = genre_ids;
        }
        store.check_title_unique(Some(id), &record.name, record.year)?;
        let view = store.title_view(&record);
        store.titles.insert(id, record);
        Ok(Some(view))
    }

    async fn delete_title(&self, id: i64) -> StoreResult<bool> {
        let mut store = self.lock();
        if store.titles.remove(&id).is_none() {
            return Ok(false);
        }
        store.remove_reviews(|review| review.title_id == id);
        Ok(true)
    }

    // --- REVIEWS ---

    async fn list_reviews(
        &self,
        title_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Review>, i64)> {
        let store = self.lock();
        let mut reviews: Vec<&ReviewRecord> = store
            .reviews
            .values()
            .filter(|review| review.title_id == title_id)
            .collect();
        reviews.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        let reviews = reviews.into_iter().map(|r| store.review_view(r)).collect();
        Ok(window_of(reviews, window))
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> StoreResult<Option<Review>> {
        let store = self.lock();
        Ok(store
            .reviews
            .get(&review_id)
            .filter(|review| review.title_id == title_id)
            .map(|review| store.review_view(review)))
    }

    async fn has_review_by(&self, title_id: i64, author_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .lock()
            .reviews
            .values()
            .any(|review| review.title_id == title_id && review.author_id == author_id))
    }

    async fn create_review(&self, review: NewReview) -> StoreResult<Review> {
        let mut store = self.lock();
        let duplicate = store
            .reviews
            .values()
            .any(|r| r.title_id == review.title_id && r.author_id == review.author_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                "reviews_author_title_key".to_string(),
            ));
        }
        let record = ReviewRecord {
            id: store.next_id(),
            title_id: review.title_id,
            author_id: review.author_id,
            text: review.text,
            score: review.score,
            pub_date: Utc::now(),
        };
        let view = store.review_view(&record);
        store.reviews.insert(record.id, record);
        Ok(view)
    }

    async fn update_review(&self, id: i64, changes: ReviewChanges) -> StoreResult<Option<Review>> {
        let mut store = self.lock();
        let Some(record) = store.reviews.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(text) = changes.text {
            record.text = text;
        }
        if let Some(score) = changes.score {
            record.score = score;
        }
        let record = record.clone();
        Ok(Some(store.review_view(&record)))
    }

    async fn delete_review(&self, id: i64) -> StoreResult<bool> {
        let mut store = self.lock();
        let existed = store.reviews.contains_key(&id);
        store.remove_reviews(|review| review.id == id);
        Ok(existed)
    }

    // --- COMMENTS ---

    async fn list_comments(
        &self,
        review_id: i64,
        window: Pagination,
    ) -> StoreResult<(Vec<Comment>, i64)> {
        let store = self.lock();
        let mut comments: Vec<&CommentRecord> = store
            .comments
            .values()
            .filter(|comment| comment.review_id == review_id)
            .collect();
        comments.sort_by(|a, b| a.pub_date.cmp(&b.pub_date).then(a.id.cmp(&b.id)));
        let comments = comments.into_iter().map(|c| store.comment_view(c)).collect();
        Ok(window_of(comments, window))
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> StoreResult<Option<Comment>> {
        let store = self.lock();
        Ok(store
            .comments
            .get(&comment_id)
            .filter(|comment| comment.review_id == review_id)
            .map(|comment| store.comment_view(comment)))
    }

    async fn create_comment(&self, comment: NewComment) -> StoreResult<Comment> {
        let mut store = self.lock();
        let record = CommentRecord {
            id: store.next_id(),
            review_id: comment.review_id,
            author_id: comment.author_id,
            text: comment.text,
            pub_date: Utc::now(),
        };
        let view = store.comment_view(&record);
        store.comments.insert(record.id, record);
        Ok(view)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> StoreResult<Option<Comment>> {
        let mut store = self.lock();
        let Some(record) = store.comments.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(text) = text {
            record.text = text;
        }
        let record = record.clone();
        Ok(Some(store.comment_view(&record)))
    }

    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        Ok(self.lock().comments.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn window() -> Pagination {
        Pagination::new(None, None, 10).unwrap()
    }

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@x.com"),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            role: Role::User,
            confirmation_secret: "s".to_string(),
        }
    }

    async fn seeded_title(repo: &InMemoryRepository) -> (Title, Category, Genre) {
        let category = repo
            .create_category("Movies".into(), "movie".into())
            .await
            .unwrap();
        let genre = repo.create_genre("Drama".into(), "drama".into()).await.unwrap();
        let title = repo
            .create_title(NewTitle {
                name: "Heat".into(),
                year: 1995,
                description: String::new(),
                category_id: Some(category.id),
                genre_ids: vec![genre.id],
            })
            .await
            .unwrap();
        (title, category, genre)
    }

    #[tokio::test]
    async fn confirm_user_swaps_only_the_expected_secret() {
        let repo = InMemoryRepository::new();
        let user = repo.create_user(new_user("bob")).await.unwrap();

        let confirmed = repo.confirm_user(user.id, "s", "next".into()).await.unwrap();
        assert_eq!(confirmed.map(|u| u.confirmation_secret), Some("next".to_string()));

        // The exchange that verified against the old secret lost the race.
        assert!(repo.confirm_user(user.id, "s", "other".into()).await.unwrap().is_none());
        let current = repo.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(current.confirmation_secret, "next");
    }

    #[tokio::test]
    async fn email_uniqueness_ignores_case() {
        let repo = InMemoryRepository::new();
        repo.create_user(new_user("bob")).await.unwrap();
        let mut clash = new_user("robert");
        clash.email = "BOB@x.com".into();
        let err = repo.create_user(clash).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(c) if c == "users_email_key"));
    }

    #[tokio::test]
    async fn deleting_a_category_keeps_its_titles() {
        let repo = InMemoryRepository::new();
        let (title, category, _) = seeded_title(&repo).await;
        assert!(repo.delete_category(&category.slug).await.unwrap());
        let title = repo.get_title(title.id).await.unwrap().unwrap();
        assert!(title.category.is_none());
    }

    #[tokio::test]
    async fn deleting_a_genre_unlinks_it() {
        let repo = InMemoryRepository::new();
        let (title, _, genre) = seeded_title(&repo).await;
        assert!(repo.delete_genre(&genre.slug).await.unwrap());
        let title = repo.get_title(title.id).await.unwrap().unwrap();
        assert!(title.genre.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_title_cascades_to_reviews_and_comments() {
        let repo = InMemoryRepository::new();
        let (title, _, _) = seeded_title(&repo).await;
        let author = repo.create_user(new_user("bob")).await.unwrap();
        let review = repo
            .create_review(NewReview {
                title_id: title.id,
                author_id: author.id,
                text: "good".into(),
                score: 8,
            })
            .await
            .unwrap();
        let comment = repo
            .create_comment(NewComment {
                review_id: review.id,
                author_id: author.id,
                text: "agreed".into(),
            })
            .await
            .unwrap();

        assert!(repo.delete_title(title.id).await.unwrap());
        assert!(repo.get_review(title.id, review.id).await.unwrap().is_none());
        assert!(repo.get_comment(review.id, comment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rating_is_the_mean_score() {
        let repo = InMemoryRepository::new();
        let (title, _, _) = seeded_title(&repo).await;
        assert_eq!(title.rating, None);
        for (name, score) in [("a", 7), ("b", 10)] {
            let user = repo.create_user(new_user(name)).await.unwrap();
            repo.create_review(NewReview {
                title_id: title.id,
                author_id: user.id,
                text: "t".into(),
                score,
            })
            .await
            .unwrap();
        }
        let title = repo.get_title(title.id).await.unwrap().unwrap();
        assert_eq!(title.rating, Some(8.5));
    }

    #[tokio::test]
    async fn duplicate_review_is_a_unique_violation() {
        let repo = InMemoryRepository::new();
        let (title, _, _) = seeded_title(&repo).await;
        let user = repo.create_user(new_user("bob")).await.unwrap();
        let review = NewReview {
            title_id: title.id,
            author_id: user.id,
            text: "t".into(),
            score: 5,
        };
        repo.create_review(review.clone()).await.unwrap();
        let err = repo.create_review(review).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(c) if c == "reviews_author_title_key"));
    }

    #[tokio::test]
    async fn title_filters_combine() {
        let repo = InMemoryRepository::new();
        seeded_title(&repo).await;
        let filter = TitleFilter {
            genre: Some("drama".into()),
            name: Some("HE".into()),
            ..Default::default()
        };
        let (titles, count) = repo.list_titles(&filter, window()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(titles[0].name, "Heat");

        let filter = TitleFilter {
            year: Some(2000),
            ..Default::default()
        };
        assert_eq!(repo.list_titles(&filter, window()).await.unwrap().1, 0);
    }
}
