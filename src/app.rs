use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AuthorizationEngine, AuthzConfig, SqliteStore};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, circles, health, restaurants, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub engine: AuthorizationEngine<SqliteStore>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, authz: AuthzConfig, event_bus: EventBus) -> Self {
        let store = Arc::new(SqliteStore::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            engine: AuthorizationEngine::new(store, authz.timeout),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let authz_config = AuthzConfig::from_env()?;

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, authz_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", put(users::update_role));

    let restaurant_routes = Router::new()
        .route("/", get(restaurants::list_restaurants).post(restaurants::create_restaurant))
        .route(
            "/:id",
            get(restaurants::get_restaurant)
                .put(restaurants::update_restaurant)
                .delete(restaurants::delete_restaurant),
        )
        .route("/:id/owner", put(restaurants::update_owner))
        .route("/:id/members", get(restaurants::list_members).post(restaurants::add_member))
        .route("/:id/members/:user_id", delete(restaurants::remove_member));

    let circle_routes = Router::new()
        .route("/", post(circles::add_to_circle))
        .route("/:lead_id", get(circles::get_circle))
        .route("/:lead_id/:black_shirt_id", delete(circles::remove_from_circle));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/restaurants", restaurant_routes)
        .nest("/circles", circle_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
