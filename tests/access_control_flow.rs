use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use restaurant_ops::create_app;

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

struct Account {
    id: String,
    token: String,
}

async fn register(app: &Router, name: &str) -> Result<Account> {
    let body = json!({
        "name": name,
        "email": format!("{}@example.com", name),
        "password": "password123"
    });
    let (status, v) = send(app, "POST", "/auth/register", None, Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "register {} failed: {}", name, v);
    Ok(Account {
        id: v.pointer("/user/id").and_then(Value::as_str).context("missing user id")?.to_string(),
        token: v.get("token").and_then(Value::as_str).context("missing token")?.to_string(),
    })
}

async fn set_role(app: &Router, admin: &Account, user: &Account, role: &str) -> Result<()> {
    let (status, v) = send(
        app,
        "PUT",
        &format!("/users/{}/role", user.id),
        Some(&admin.token),
        Some(json!({ "role": role })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "set role {} failed: {}", role, v);
    assert_eq!(v.get("role").and_then(Value::as_str), Some(role));
    Ok(())
}

async fn rename(app: &Router, who: &Account, restaurant_id: &str, name: &str) -> Result<StatusCode> {
    let (status, _) = send(
        app,
        "PUT",
        &format!("/restaurants/{}", restaurant_id),
        Some(&who.token),
        Some(json!({ "name": name })),
    )
    .await?;
    Ok(status)
}

async fn view(app: &Router, who: &Account, restaurant_id: &str) -> Result<StatusCode> {
    let (status, _) = send(app, "GET", &format!("/restaurants/{}", restaurant_id), Some(&who.token), None).await?;
    Ok(status)
}

async fn add_member(app: &Router, who: &Account, restaurant_id: &str, user: &Account) -> Result<StatusCode> {
    let (status, _) = send(
        app,
        "POST",
        &format!("/restaurants/{}/members", restaurant_id),
        Some(&who.token),
        Some(json!({ "user_id": user.id })),
    )
    .await?;
    Ok(status)
}

async fn setup() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");
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
    Ok((dir, pool, app))
}

#[tokio::test]
async fn restaurant_access_control_flow() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    let admin = register(&app, "admin").await?;
    let lead = register(&app, "lead").await?;
    let other_lead = register(&app, "otherlead").await?;
    let bs = register(&app, "blackshirt").await?;
    let other_bs = register(&app, "otherblackshirt").await?;
    let associate = register(&app, "associate").await?;
    let tablet = register(&app, "tablet").await?;

    set_role(&app, &admin, &lead, "ops_lead").await?;
    set_role(&app, &admin, &other_lead, "ops_lead").await?;
    set_role(&app, &admin, &bs, "black_shirt").await?;
    set_role(&app, &admin, &other_bs, "black_shirt").await?;
    set_role(&app, &admin, &tablet, "tablet").await?;

    // -- black shirt creates and owns a restaurant
    let (status, v) = send(&app, "POST", "/restaurants", Some(&bs.token), Some(json!({ "name": "Harbor Grill" }))).await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", v);
    assert_eq!(v.get("owner_user_id").and_then(Value::as_str), Some(bs.id.as_str()));
    let grill = v.get("id").and_then(Value::as_str).context("missing restaurant id")?.to_string();

    assert_eq!(view(&app, &bs, &grill).await?, StatusCode::OK);
    assert_eq!(rename(&app, &bs, &grill, "Harbor Grill & Bar").await?, StatusCode::OK);
    assert_eq!(rename(&app, &other_bs, &grill, "Mine now").await?, StatusCode::FORBIDDEN);

    // -- an ops lead outside the circle can neither view nor manage
    assert_eq!(view(&app, &lead, &grill).await?, StatusCode::FORBIDDEN);
    assert_eq!(rename(&app, &lead, &grill, "Lead Grill").await?, StatusCode::FORBIDDEN);

    // -- circle grant, twice
    for _ in 0..2 {
        let (status, v) = send(
            &app,
            "POST",
            "/circles",
            Some(&admin.token),
            Some(json!({ "lead_id": lead.id, "black_shirt_id": bs.id })),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "circle add failed: {}", v);
    }
    let (status, v) = send(&app, "GET", &format!("/circles/{}", lead.id), Some(&admin.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(Vec::len), Some(1), "duplicate circle edge: {}", v);

    // lead now governs but still cannot see it
    assert_eq!(rename(&app, &lead, &grill, "Lead Grill").await?, StatusCode::OK);
    assert_eq!(view(&app, &lead, &grill).await?, StatusCode::FORBIDDEN);
    assert_eq!(rename(&app, &other_lead, &grill, "Other Grill").await?, StatusCode::FORBIDDEN);

    // -- staffing
    assert_eq!(add_member(&app, &bs, &grill, &associate).await?, StatusCode::CREATED);
    assert_eq!(add_member(&app, &bs, &grill, &associate).await?, StatusCode::CREATED);
    assert_eq!(add_member(&app, &bs, &grill, &tablet).await?, StatusCode::FORBIDDEN);
    assert_eq!(add_member(&app, &bs, &grill, &other_bs).await?, StatusCode::FORBIDDEN);
    assert_eq!(add_member(&app, &lead, &grill, &tablet).await?, StatusCode::CREATED);
    assert_eq!(add_member(&app, &associate, &grill, &tablet).await?, StatusCode::FORBIDDEN);

    let (status, v) = send(&app, "GET", &format!("/restaurants/{}/members", grill), Some(&bs.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().map(Vec::len), Some(3), "expected owner, associate and tablet: {}", v);

    assert_eq!(view(&app, &associate, &grill).await?, StatusCode::OK);
    assert_eq!(rename(&app, &associate, &grill, "Nope").await?, StatusCode::FORBIDDEN);
    assert_eq!(view(&app, &tablet, &grill).await?, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/restaurants", Some(&associate.token), None).await?;
    assert_eq!(status, StatusCode::OK);

    // black shirt may drop an associate but not the tablet
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/restaurants/{}/members/{}", grill, tablet.id),
        Some(&bs.token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/restaurants/{}/members/{}", grill, associate.id),
        Some(&bs.token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(view(&app, &associate, &grill).await?, StatusCode::FORBIDDEN);

    // -- circle revocation takes effect immediately
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/circles/{}/{}", lead.id, bs.id),
        Some(&admin.token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/circles/{}/{}", lead.id, bs.id),
        Some(&admin.token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(rename(&app, &lead, &grill, "Lead Grill II").await?, StatusCode::FORBIDDEN);

    // -- deletion hides the restaurant
    let (status, _) = send(&app, "DELETE", &format!("/restaurants/{}", grill), Some(&bs.token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(view(&app, &admin, &grill).await?, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn orphaned_restaurants_and_ownership_transfer() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    let admin = register(&app, "admin").await?;
    let lead = register(&app, "lead").await?;
    let bs = register(&app, "blackshirt").await?;
    let associate = register(&app, "associate").await?;
    set_role(&app, &admin, &lead, "ops_lead").await?;
    set_role(&app, &admin, &bs, "black_shirt").await?;

    // only admins and black shirts create restaurants
    let (status, _) = send(&app, "POST", "/restaurants", Some(&associate.token), Some(json!({ "name": "Cafe" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "POST", "/restaurants", Some(&lead.token), Some(json!({ "name": "Cafe" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, v) = send(&app, "POST", "/restaurants", Some(&admin.token), Some(json!({ "name": "Corner Cafe" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert!(v.get("owner_user_id").map(Value::is_null).unwrap_or(true), "admin-created restaurant should be orphaned");
    let cafe = v.get("id").and_then(Value::as_str).context("missing restaurant id")?.to_string();

    // any ops lead may manage an orphan, black shirts may not
    assert_eq!(rename(&app, &lead, &cafe, "Lead Cafe").await?, StatusCode::OK);
    assert_eq!(rename(&app, &bs, &cafe, "Shirt Cafe").await?, StatusCode::FORBIDDEN);
    assert_eq!(add_member(&app, &lead, &cafe, &associate).await?, StatusCode::CREATED);

    // owner must be a black shirt
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/restaurants/{}/owner", cafe),
        Some(&admin.token),
        Some(json!({ "owner_user_id": associate.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, v) = send(
        &app,
        "PUT",
        &format!("/restaurants/{}/owner", cafe),
        Some(&admin.token),
        Some(json!({ "owner_user_id": bs.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "owner change failed: {}", v);
    assert_eq!(v.get("owner_user_id").and_then(Value::as_str), Some(bs.id.as_str()));

    // adopted: the new owner manages it, the lead outside the circle no longer does
    assert_eq!(rename(&app, &bs, &cafe, "Shirt Cafe").await?, StatusCode::OK);
    assert_eq!(view(&app, &bs, &cafe).await?, StatusCode::OK);
    assert_eq!(rename(&app, &lead, &cafe, "Lead Cafe II").await?, StatusCode::FORBIDDEN);

    // owner orphans it again
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/restaurants/{}/owner", cafe),
        Some(&bs.token),
        Some(json!({ "owner_user_id": null })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rename(&app, &lead, &cafe, "Lead Cafe III").await?, StatusCode::OK);
    assert_eq!(rename(&app, &bs, &cafe, "Shirt Cafe II").await?, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn circle_endpoints_are_admin_only_and_validate_roles() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;

    let admin = register(&app, "admin").await?;
    let lead = register(&app, "lead").await?;
    let bs = register(&app, "blackshirt").await?;
    set_role(&app, &admin, &lead, "ops_lead").await?;

    // bs is still an associate
    let (status, _) = send(
        &app,
        "POST",
        "/circles",
        Some(&admin.token),
        Some(json!({ "lead_id": lead.id, "black_shirt_id": bs.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    set_role(&app, &admin, &bs, "black_shirt").await?;

    let (status, _) = send(
        &app,
        "POST",
        "/circles",
        Some(&lead.token),
        Some(json!({ "lead_id": lead.id, "black_shirt_id": bs.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "POST",
        "/circles",
        Some(&admin.token),
        Some(json!({ "lead_id": bs.id, "black_shirt_id": lead.id })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "circle edges are directed lead -> black shirt");

    let (status, _) = send(&app, "GET", &format!("/circles/{}", lead.id), Some(&lead.token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
