use anyhow::Context;
use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::json;
use sqlx::SqlitePool;
use tower::util::ServiceExt;
use tempfile::tempdir;
use restaurant_ops::create_app;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_auth.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    // 1. Register with short password
    let short_pass_body = json!({
        "name": "Short Pass",
        "email": "short@example.com",
        "password": "short"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(short_pass_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "Should fail with bad request for short password");

    // 2. First valid registration bootstraps the admin
    let valid_body = json!({
        "name": "Valid User",
        "email": "Valid@Example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(valid_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(v.pointer("/user/role").and_then(|r| r.as_str()), Some("admin"));
    assert_eq!(v.pointer("/user/email").and_then(|r| r.as_str()), Some("valid@example.com"));

    // 3. Same email, different case
    let dup_body = json!({
        "name": "Dup User",
        "email": "VALID@example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(dup_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT, "Should fail with conflict for duplicate email");

    // 4. Everyone after the first starts as an associate
    let second_body = json!({
        "name": "Second User",
        "email": "second@example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(second_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    assert_eq!(v.pointer("/user/role").and_then(|r| r.as_str()), Some("associate"));
    let second_token = v.get("token").and_then(|t| t.as_str()).context("missing token")?.to_string();

    // 5. Login with wrong password
    let wrong_pass_body = json!({
        "email": "valid@example.com",
        "password": "wrongpassword"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(wrong_pass_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "Should fail with unauthorized for wrong password");

    // 6. Login with non-existent email
    let no_user_body = json!({
        "email": "nobody@example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(no_user_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "Should fail with unauthorized for non-existent user");

    // 7. Access protected route without token, and with a garbage one
    let req = Request::builder()
        .method("GET")
        .uri("/restaurants")
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "Should fail with unauthorized for missing token");

    let req = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "Should fail with unauthorized for bad token");

    // 8. Non-admins cannot administer users
    let req = Request::builder()
        .method("GET")
        .uri("/users")
        .header("authorization", format!("Bearer {}", second_token))
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN, "Should be forbidden for associates");

    // 9. Unknown role names are rejected
    let login_body = json!({
        "email": "valid@example.com",
        "password": "password123"
    });
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(login_body.to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let v: serde_json::Value = serde_json::from_slice(&body_bytes)?;
    let admin_token = v.get("token").and_then(|t| t.as_str()).context("missing token")?.to_string();
    let admin_id = v.pointer("/user/id").and_then(|t| t.as_str()).context("missing id")?.to_string();

    let req = Request::builder()
        .method("PUT")
        .uri(format!("/users/{}/role", admin_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", admin_token))
        .body(Body::from(json!({ "role": "manager" }).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "Should reject unknown role");

    // 10. The only admin cannot demote themselves
    let req = Request::builder()
        .method("PUT")
        .uri(format!("/users/{}/role", admin_id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", admin_token))
        .body(Body::from(json!({ "role": "associate" }).to_string()))?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "Should refuse self-demotion");

    Ok(())
}
