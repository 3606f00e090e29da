//! End-to-end tests driving the router against an in-memory database.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use trailhead::config::Config;
use trailhead::{api, db, AppState};

async fn test_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let state = Arc::new(AppState::new(config, pool));
    (api::create_router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn signup(app: &Router, name: &str, email: &str, password: &str) -> (String, Value) {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/v1/users/signup",
            &json!({
                "name": name,
                "email": email,
                "password": password,
                "passwordConfirm": password,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap().to_string();
    (token, body)
}

fn sample_tour(name: &str, price: f64, duration: i64) -> Value {
    json!({
        "name": name,
        "duration": duration,
        "difficulty": "easy",
        "price": price,
        "maxGroupSize": 10,
        "summary": "Breathtaking hike",
        "imageCover": "cover.jpg",
    })
}

async fn create_tour(app: &Router, tour: &Value) -> Value {
    let (status, body) = send(app, json_request("POST", "/api/v1/tours", tour)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body
}

#[tokio::test]
async fn signup_issues_session_and_strips_secrets() {
    let (app, _state) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/users/signup",
            &json!({
                "name": "Forest Guide",
                "email": "guide@example.com",
                "password": "pass1234",
                "passwordConfirm": "pass1234",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("jwt="));
    assert!(cookie.contains("HttpOnly"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["status"], "success");
    assert!(!body["token"].as_str().unwrap().is_empty());

    let user = body["data"]["user"].as_object().unwrap();
    assert_eq!(user["email"], "guide@example.com");
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("passwordHash"));
    assert!(!user.contains_key("active"));
    assert!(!user.contains_key("passwordResetToken"));
}

#[tokio::test]
async fn signup_validates_fields() {
    let (app, _state) = test_app().await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/signup",
            &json!({
                "name": "x33",
                "email": "not-an-email",
                "password": "pass1234",
                "passwordConfirm": "different1",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "fail");
    assert!(body["message"].as_str().unwrap().starts_with("Invalid input"));
}

#[tokio::test]
async fn duplicate_email_is_a_bad_request() {
    let (app, _state) = test_app().await;
    signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/signup",
            &json!({
                "name": "Forest Guide",
                "email": "guide@example.com",
                "password": "pass1234",
                "passwordConfirm": "pass1234",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Duplicate"));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let (app, _state) = test_app().await;
    signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;

    let (wrong_pw_status, wrong_pw_body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/login",
            &json!({"email": "guide@example.com", "password": "wrong password"}),
        ),
    )
    .await;

    let (no_user_status, no_user_body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/login",
            &json!({"email": "nobody@example.com", "password": "pass1234"}),
        ),
    )
    .await;

    assert_eq!(wrong_pw_status, StatusCode::BAD_REQUEST);
    assert_eq!(no_user_status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_pw_body["message"], no_user_body["message"]);

    // Missing fields are also a 400, with their own message
    let (status, _) = send(
        &app,
        json_request("POST", "/api/v1/users/login", &json!({"email": "guide@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_returns_a_session() {
    let (app, _state) = test_app().await;
    signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/login",
            &json!({"email": "guide@example.com", "password": "pass1234"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(!body["token"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn listing_tours_requires_a_session() {
    let (app, _state) = test_app().await;

    let (status, body) = send(&app, get_request("/api/v1/tours", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "fail");

    let (status, _) = send(&app, get_request("/api/v1/tours", Some("not.a.token"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (token, _) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;
    let (status, body) = send(&app, get_request("/api/v1/tours", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["results"], 0);
}

#[tokio::test]
async fn create_tour_derives_slug() {
    let (app, _state) = test_app().await;

    let body = create_tour(&app, &sample_tour("Forest Hiker Adventure", 397.0, 5)).await;

    let tour = &body["data"]["tour"];
    assert_eq!(body["status"], "success");
    assert_eq!(tour["slug"], "forest-hiker-adventure");
    assert_eq!(tour["ratingsAverage"], 4.5);
    assert_eq!(tour["ratingsQuantity"], 0);
}

#[tokio::test]
async fn get_tour_handles_absence_and_bad_ids() {
    let (app, _state) = test_app().await;

    let (status, body) = send(
        &app,
        get_request("/api/v1/tours/9b2fdd6c-0c8a-4d1e-9f3a-1b2c3d4e5f60", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");

    let (status, _) = send(&app, get_request("/api/v1/tours/not-a-valid-id", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let created = create_tour(&app, &sample_tour("Forest Hiker Adventure", 397.0, 5)).await;
    let id = created["data"]["tour"]["id"].as_str().unwrap();
    let (status, body) = send(&app, get_request(&format!("/api/v1/tours/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tour"]["name"], "Forest Hiker Adventure");
}

#[tokio::test]
async fn patch_revalidates_and_recomputes_slug() {
    let (app, _state) = test_app().await;
    let created = create_tour(&app, &sample_tour("Forest Hiker Adventure", 397.0, 5)).await;
    let id = created["data"]["tour"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/api/v1/tours/{id}"),
            &json!({"name": "The Sea Explorer Voyage"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tour"]["slug"], "the-sea-explorer-voyage");
    assert_eq!(body["data"]["tour"]["price"], 397.0);

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/api/v1/tours/{id}"),
            &json!({"difficulty": "impossible"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            "/api/v1/tours/9b2fdd6c-0c8a-4d1e-9f3a-1b2c3d4e5f60",
            &json!({"price": 50.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_tour_is_admin_only() {
    let (app, state) = test_app().await;
    let created = create_tour(&app, &sample_tour("Forest Hiker Adventure", 397.0, 5)).await;
    let id = created["data"]["tour"]["id"].as_str().unwrap().to_string();

    // No session at all
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/tours/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A plain user is rejected too
    let (token, signup_body) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/tours/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Promote and retry
    let user_id = signup_body["data"]["user"]["id"].as_str().unwrap();
    sqlx::query("UPDATE users SET role = 'admin' WHERE id = ?")
        .bind(user_id)
        .execute(&state.db)
        .await
        .unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/tours/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    // Deleting it again is a 404, not a 204
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/tours/{id}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pagination_and_filters() {
    let (app, _state) = test_app().await;
    let (token, _) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;

    let mut ids = Vec::new();
    for i in 1..=5 {
        let body = create_tour(
            &app,
            &sample_tour(&format!("Pagination Walk Number {i}"), 50.0 * f64::from(i), i.into()),
        )
        .await;
        ids.push(body["data"]["tour"]["id"].as_str().unwrap().to_string());
    }

    // Newest first by default: page 2 of size 2 holds the 3rd and 4th newest
    let (status, body) = send(
        &app,
        get_request("/api/v1/tours?limit=2&page=2", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 2);
    let tours = body["data"]["tours"].as_array().unwrap();
    assert_eq!(tours[0]["id"], ids[2].as_str());
    assert_eq!(tours[1]["id"], ids[1].as_str());

    // price[gt]=100, URL-encoded brackets
    let (status, body) = send(
        &app,
        get_request("/api/v1/tours?price%5Bgt%5D=100", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tours = body["data"]["tours"].as_array().unwrap();
    assert_eq!(tours.len(), 3);
    assert!(tours.iter().all(|t| t["price"].as_f64().unwrap() > 100.0));

    // Exact-match filter
    let (status, body) = send(&app, get_request("/api/v1/tours?duration=5", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let tours = body["data"]["tours"].as_array().unwrap();
    assert_eq!(tours.len(), 1);
    assert_eq!(tours[0]["duration"], 5);

    // Unknown filter fields are rejected
    let (status, _) = send(&app, get_request("/api/v1/tours?role=admin", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn top_five_cheap_is_a_preset_projection() {
    let (app, _state) = test_app().await;

    for i in 1..=6 {
        create_tour(
            &app,
            &sample_tour(&format!("Pagination Walk Number {i}"), 100.0 * f64::from(i), 3),
        )
        .await;
    }

    let (status, body) = send(&app, get_request("/api/v1/tours/top-5-cheap", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 5);

    let tours = body["data"]["tours"].as_array().unwrap();
    // Cheapest first
    assert_eq!(tours[0]["price"], 100.0);
    assert_eq!(tours[4]["price"], 500.0);

    // Only the preset fields (plus id) survive projection
    let first = tours[0].as_object().unwrap();
    assert_eq!(first.len(), 6);
    for key in ["name", "price", "ratingsAverage", "duration", "difficulty", "id"] {
        assert!(first.contains_key(key), "missing {key}");
    }
}

#[tokio::test]
async fn tour_stats_reports_by_difficulty() {
    let (app, _state) = test_app().await;

    let mut easy_one = sample_tour("Cheap Meadow Walk Tour", 100.0, 2);
    easy_one["difficulty"] = json!("easy");
    create_tour(&app, &easy_one).await;

    let mut easy_two = sample_tour("Gentle Valley Stroll", 300.0, 3);
    easy_two["difficulty"] = json!("easy");
    create_tour(&app, &easy_two).await;

    let mut hard = sample_tour("Alpine Summit Push", 900.0, 9);
    hard["difficulty"] = json!("difficult");
    create_tour(&app, &hard).await;

    // Excluded from the report by the price cutoff
    let mut pricey = sample_tour("Luxury Glacier Cruise", 2500.0, 12);
    pricey["difficulty"] = json!("difficult");
    create_tour(&app, &pricey).await;

    let (status, body) = send(&app, get_request("/api/v1/tours/tour-stats", None)).await;
    assert_eq!(status, StatusCode::OK);

    let stats = body["data"]["tourStats"].as_array().unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0]["difficulty"], "EASY");
    assert_eq!(stats[0]["numTours"], 2);
    assert_eq!(stats[0]["avgPrice"], 200.0);
    assert_eq!(stats[1]["difficulty"], "DIFFICULT");
    assert_eq!(stats[1]["numTours"], 1);
}

#[tokio::test]
async fn password_change_revokes_existing_sessions() {
    let (app, state) = test_app().await;
    let (token, signup_body) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;
    let user_id = signup_body["data"]["user"]["id"].as_str().unwrap().to_string();

    // The token works now
    let (status, _) = send(&app, get_request("/api/v1/tours", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    // Token timestamps have second resolution and the change is stamped one
    // second in the past, so put the change clearly after issuance
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    db::users::update_password(&state.db, &user_id, "newpass123")
        .await
        .unwrap();

    let (status, body) = send(&app, get_request("/api/v1/tours", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("password"));

    // A fresh login with the new password works
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/login",
            &json!({"email": "guide@example.com", "password": "newpass123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn forgot_password_without_transport_clears_the_token() {
    let (app, state) = test_app().await;
    let (_, signup_body) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;
    let user_id = signup_body["data"]["user"]["id"].as_str().unwrap().to_string();

    // Unknown email is a 400
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/forgot-password",
            &json!({"email": "nobody@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // SMTP is not configured in tests, so delivery fails terminally and the
    // persisted token hash must be wiped
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/forgot-password",
            &json!({"email": "guide@example.com"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");

    let user = db::users::find_by_id(&state.db, &user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(user.password_reset_token.is_none());
    assert!(user.password_reset_expires.is_none());
}

#[tokio::test]
async fn reset_password_consumes_the_token() {
    let (app, state) = test_app().await;
    let (_, signup_body) = signup(&app, "Forest Guide", "guide@example.com", "pass1234").await;
    let user_id = signup_body["data"]["user"]["id"].as_str().unwrap().to_string();

    let raw_token = db::users::create_reset_token(&state.db, &user_id)
        .await
        .unwrap();

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/api/v1/users/reset-password/{raw_token}"),
            &json!({"password": "brandnew1", "passwordConfirm": "brandnew1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["token"].as_str().unwrap().is_empty());

    // Same raw token a second time: invalid or expired
    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/api/v1/users/reset-password/{raw_token}"),
            &json!({"password": "another12", "passwordConfirm": "another12"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("invalid or has expired"));

    // The new password is live
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/users/login",
            &json!({"email": "guide@example.com", "password": "brandnew1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_routes_get_the_fail_envelope() {
    let (app, _state) = test_app().await;

    let (status, body) = send(&app, get_request("/api/v1/bookings", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert!(body["message"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn health_check_is_public() {
    let (app, _state) = test_app().await;
    let response = app
        .clone()
        .oneshot(get_request("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
