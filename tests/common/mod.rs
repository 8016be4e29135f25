//! Shared harness for the HTTP-level tests: the real router over the in-memory
//! repository and a recording mailer, driven with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use title_reviews::{
    AppConfig, AppState, InMemoryRepository, MockMailer,
    auth::issue_access_token,
    confirmation::ConfirmationCodes,
    create_router,
    models::{NewUser, Role, User},
    repository::Repository,
};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<InMemoryRepository>,
    pub mailer: MockMailer,
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_mailer(MockMailer::new())
}

pub fn spawn_app_with_mailer(mailer: MockMailer) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(repo.clone(), Arc::new(mailer.clone()), AppConfig::default());
    TestApp {
        router: create_router(state.clone()),
        state,
        repo,
        mailer,
    }
}

impl TestApp {
    /// Sends one request; the body is parsed as JSON (`Null` when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Seeds a user directly in the store.
    pub async fn create_user(&self, username: &str, role: Role) -> User {
        self.repo
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                first_name: String::new(),
                last_name: String::new(),
                bio: String::new(),
                role,
                confirmation_secret: ConfirmationCodes::new_user_secret(),
            })
            .await
            .unwrap()
    }

    /// Seeds a user and returns an access token for it.
    pub async fn token_for(&self, username: &str, role: Role) -> String {
        let user = self.create_user(username, role).await;
        issue_access_token(&self.state.config, user.id).unwrap()
    }

    /// Seeds the `movie` category, the `drama` and `crime` genres, and one title.
    /// Returns the title id.
    pub async fn seed_title(&self, admin: &str) -> i64 {
        self.post(
            "/api/v1/categories",
            Some(admin),
            serde_json::json!({ "name": "Movie", "slug": "movie" }),
        )
        .await;
        for (name, slug) in [("Drama", "drama"), ("Crime", "crime")] {
            self.post(
                "/api/v1/genres",
                Some(admin),
                serde_json::json!({ "name": name, "slug": slug }),
            )
            .await;
        }
        let (status, body) = self
            .post(
                "/api/v1/titles",
                Some(admin),
                serde_json::json!({
                    "name": "Heat",
                    "year": 1995,
                    "description": "Heist",
                    "genre": ["drama", "crime"],
                    "category": "movie"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }
}
