mod common;

use std::collections::BTreeSet;

use axum::http::{Method, StatusCode};
use common::spawn_app;
use serde_json::{Value, json};
use title_reviews::models::Role;

fn slugs(genres: &Value) -> BTreeSet<String> {
    genres
        .as_array()
        .unwrap()
        .iter()
        .map(|genre| genre["slug"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_catalog_writes_are_admin_only() {
    let app = spawn_app();
    let user = app.token_for("bob", Role::User).await;
    let moderator = app.token_for("mod", Role::Moderator).await;
    let admin = app.token_for("root", Role::Admin).await;
    let payload = json!({ "name": "Books", "slug": "book" });

    let (status, _) = app.post("/api/v1/categories", None, payload.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = app
        .post("/api/v1/categories", Some(&user), payload.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");
    let (status, _) = app
        .post("/api/v1/categories", Some(&moderator), payload.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post("/api/v1/categories", Some(&admin), payload).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "name": "Books", "slug": "book" }));

    // Reads are open.
    let (status, body) = app.get("/api/v1/categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["slug"], "book");
}

#[tokio::test]
async fn test_duplicate_slug_is_rejected() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    let payload = json!({ "name": "Drama", "slug": "drama" });

    app.post("/api/v1/genres", Some(&admin), payload.clone()).await;
    let (status, body) = app.post("/api/v1/genres", Some(&admin), payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["slug"].is_array());

    let (status, body) = app
        .post(
            "/api/v1/genres",
            Some(&admin),
            json!({ "name": "Bad", "slug": "no spaces" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["slug"].is_array());
}

#[tokio::test]
async fn test_category_and_genre_have_no_detail_or_update() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    app.post(
        "/api/v1/genres",
        Some(&admin),
        json!({ "name": "Drama", "slug": "drama" }),
    )
    .await;

    let (status, body) = app.get("/api/v1/genres/drama", Some(&admin)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["code"], "METHOD_NOT_ALLOWED");
    let (status, _) = app
        .patch("/api/v1/categories/movie", Some(&admin), json!({ "name": "x" }))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = app.delete("/api/v1/genres/drama", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete("/api/v1/genres/drama", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_title_genres_round_trip_as_a_set() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    let title_id = app.seed_title(&admin).await;

    let (status, body) = app.get(&format!("/api/v1/titles/{title_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        slugs(&body["genre"]),
        BTreeSet::from(["crime".to_string(), "drama".to_string()])
    );
    assert_eq!(body["category"], json!({ "name": "Movie", "slug": "movie" }));
    assert_eq!(body["rating"], Value::Null);
    assert_eq!(body["description"], "Heist");
}

#[tokio::test]
async fn test_title_validation() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    app.seed_title(&admin).await;

    let cases = [
        (
            json!({ "name": "X", "year": 2000, "genre": ["western"] }),
            "genre",
        ),
        (json!({ "name": "X", "year": 2000, "genre": [] }), "genre"),
        (
            json!({ "name": "X", "year": 2000, "genre": ["drama"], "category": "opera" }),
            "category",
        ),
        (
            json!({ "name": "X", "year": 9999, "genre": ["drama"] }),
            "year",
        ),
        (
            json!({ "name": "Heat", "year": 1995, "genre": ["drama"] }),
            "non_field_errors",
        ),
    ];
    for (payload, field) in cases {
        let (status, body) = app.post("/api/v1/titles", Some(&admin), payload.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert!(body["errors"][field].is_array(), "{payload} -> {body}");
    }
}

#[tokio::test]
async fn test_title_partial_update() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    let title_id = app.seed_title(&admin).await;
    let uri = format!("/api/v1/titles/{title_id}");

    let (status, body) = app
        .patch(&uri, Some(&admin), json!({ "genre": ["drama"], "year": 1996 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slugs(&body["genre"]), BTreeSet::from(["drama".to_string()]));
    assert_eq!(body["year"], 1996);
    assert_eq!(body["name"], "Heat");
    assert_eq!(body["category"]["slug"], "movie");

    // Explicit null clears the category.
    let (status, body) = app.patch(&uri, Some(&admin), json!({ "category": null })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], Value::Null);

    let (status, _) = app
        .request(
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "name": "Heat", "year": 1995, "genre": ["drama"] })),
        )
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let user = app.token_for("bob", Role::User).await;
    let (status, _) = app.patch(&uri, Some(&user), json!({ "name": "Cold" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deleting_category_keeps_title() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    let title_id = app.seed_title(&admin).await;

    let (status, _) = app.delete("/api/v1/categories/movie", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("/api/v1/titles/{title_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], Value::Null);
}

#[tokio::test]
async fn test_title_filters() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    app.seed_title(&admin).await;
    app.post(
        "/api/v1/titles",
        Some(&admin),
        json!({ "name": "Amelie", "year": 2001, "genre": ["drama"] }),
    )
    .await;

    let count = |body: &Value| body["count"].as_i64().unwrap();
    assert_eq!(count(&app.get("/api/v1/titles", None).await.1), 2);
    assert_eq!(count(&app.get("/api/v1/titles?genre=crime", None).await.1), 1);
    assert_eq!(count(&app.get("/api/v1/titles?category=movie", None).await.1), 1);
    assert_eq!(count(&app.get("/api/v1/titles?year=2001", None).await.1), 1);
    assert_eq!(count(&app.get("/api/v1/titles?name=ame", None).await.1), 1);
    assert_eq!(
        count(&app.get("/api/v1/titles?genre=drama&year=1995", None).await.1),
        1
    );

    let (status, _) = app.get("/api/v1/titles?year=soon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pagination_metadata() {
    let app = spawn_app();
    let admin = app.token_for("root", Role::Admin).await;
    for slug in ["a", "b", "c"] {
        app.post(
            "/api/v1/genres",
            Some(&admin),
            json!({ "name": slug.to_uppercase(), "slug": slug }),
        )
        .await;
    }

    let (status, body) = app.get("/api/v1/genres?page_size=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["next"], 2);
    assert_eq!(body["previous"], Value::Null);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);

    let (_, body) = app.get("/api/v1/genres?page_size=2&page=2", None).await;
    assert_eq!(body["next"], Value::Null);
    assert_eq!(body["previous"], 1);
    assert_eq!(body["results"][0]["slug"], "c");

    let (status, _) = app.get("/api/v1/genres?page_size=2&page=3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/api/v1/genres?search=B", None).await;
    assert_eq!(body["count"], 1);

    // Wildcard characters are searched for literally.
    let (_, body) = app.get("/api/v1/genres?search=_", None).await;
    assert_eq!(body["count"], 0);
    let (_, body) = app.get("/api/v1/genres?search=%25", None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_unparseable_title_id_is_404() {
    let app = spawn_app();
    let (status, body) = app.get("/api/v1/titles/abc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
