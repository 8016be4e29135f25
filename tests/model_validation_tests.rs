use chrono::{Datelike, Utc};
use serde_json::json;
use title_reviews::models::{
    Category, CreateReviewRequest, CreateSluggedRequest, CreateTitleRequest, Role,
    SignupRequest, UpdateOwnProfileRequest, UpdateTitleRequest, UserChanges,
};
use validator::Validate;

fn invalid_fields<T: Validate>(value: &T) -> Vec<String> {
    match value.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => {
            let mut fields: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|field| field.to_string())
                .collect();
            fields.sort();
            fields
        }
    }
}

fn signup(username: &str, email: &str) -> SignupRequest {
    SignupRequest {
        username: username.to_string(),
        email: email.to_string(),
    }
}

// --- Identity ---

#[test]
fn test_username_rules() {
    assert!(invalid_fields(&signup("bob.smith+1@home", "bob@x.com")).is_empty());

    // "me" is reserved for the profile route, in any case.
    assert_eq!(invalid_fields(&signup("me", "me@x.com")), ["username"]);
    assert_eq!(invalid_fields(&signup("ME", "me@x.com")), ["username"]);

    assert_eq!(invalid_fields(&signup("bob smith", "bob@x.com")), ["username"]);
    assert_eq!(invalid_fields(&signup("", "bob@x.com")), ["username"]);
    assert_eq!(
        invalid_fields(&signup(&"a".repeat(151), "bob@x.com")),
        ["username"]
    );
}

#[test]
fn test_email_rules() {
    assert_eq!(invalid_fields(&signup("bob", "not-an-email")), ["email"]);
    assert_eq!(
        invalid_fields(&signup("bob bob", "not-an-email")),
        ["email", "username"]
    );
}

#[test]
fn test_role_wire_format() {
    assert_eq!(serde_json::to_value(Role::Moderator).unwrap(), json!("moderator"));
    let role: Role = serde_json::from_value(json!("admin")).unwrap();
    assert_eq!(role, Role::Admin);
    assert!(serde_json::from_value::<Role>(json!("superuser")).is_err());
    assert_eq!(Role::default(), Role::User);
    assert!(Role::try_from("owner".to_string()).is_err());
}

#[test]
fn test_self_update_cannot_carry_role() {
    let request: UpdateOwnProfileRequest =
        serde_json::from_value(json!({ "bio": "Hi", "role": "admin" })).unwrap();
    let changes = UserChanges::from(request);
    assert_eq!(changes.bio.as_deref(), Some("Hi"));
    assert_eq!(changes.role, None);
}

// --- Catalog ---

#[test]
fn test_slug_rules() {
    let slugged = |slug: &str| CreateSluggedRequest {
        name: "Name".to_string(),
        slug: slug.to_string(),
    };
    assert!(invalid_fields(&slugged("sci-fi_2")).is_empty());
    assert_eq!(invalid_fields(&slugged("sci fi")), ["slug"]);
    assert_eq!(invalid_fields(&slugged("")), ["slug"]);
    assert_eq!(invalid_fields(&slugged(&"s".repeat(51))), ["slug"]);
}

#[test]
fn test_title_year_and_genres() {
    let this_year = Utc::now().year();
    let title = |year: i32, genre: Vec<&str>| CreateTitleRequest {
        name: "Heat".to_string(),
        year,
        description: String::new(),
        genre: genre.into_iter().map(String::from).collect(),
        category: None,
    };

    assert!(invalid_fields(&title(this_year, vec!["drama"])).is_empty());
    assert_eq!(invalid_fields(&title(this_year + 1, vec!["drama"])), ["year"]);
    assert_eq!(invalid_fields(&title(1995, vec![])), ["genre"]);
}

#[test]
fn test_title_update_distinguishes_null_from_absent_category() {
    let absent: UpdateTitleRequest = serde_json::from_value(json!({ "name": "Heat" })).unwrap();
    assert_eq!(absent.category, None);

    let cleared: UpdateTitleRequest = serde_json::from_value(json!({ "category": null })).unwrap();
    assert_eq!(cleared.category, Some(None));

    let set: UpdateTitleRequest =
        serde_json::from_value(json!({ "category": "movie" })).unwrap();
    assert_eq!(set.category, Some(Some("movie".to_string())));

    let empty_genres: UpdateTitleRequest = serde_json::from_value(json!({ "genre": [] })).unwrap();
    assert_eq!(invalid_fields(&empty_genres), ["genre"]);
}

#[test]
fn test_category_serializes_without_id() {
    let category = Category {
        id: 7,
        name: "Movie".to_string(),
        slug: "movie".to_string(),
    };
    assert_eq!(
        serde_json::to_value(&category).unwrap(),
        json!({ "name": "Movie", "slug": "movie" })
    );
}

// --- Feedback ---

#[test]
fn test_review_score_bounds() {
    let review = |score: i32| CreateReviewRequest {
        text: "Fine".to_string(),
        score,
    };
    assert!(invalid_fields(&review(1)).is_empty());
    assert!(invalid_fields(&review(10)).is_empty());
    assert_eq!(invalid_fields(&review(0)), ["score"]);
    assert_eq!(invalid_fields(&review(11)), ["score"]);

    let blank = CreateReviewRequest {
        text: String::new(),
        score: 5,
    };
    assert_eq!(invalid_fields(&blank), ["text"]);
}
