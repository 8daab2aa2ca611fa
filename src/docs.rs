use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::users::list_users,
		routes::users::update_role,
		routes::restaurants::list_restaurants,
		routes::restaurants::create_restaurant,
		routes::restaurants::get_restaurant,
		routes::restaurants::update_restaurant,
		routes::restaurants::delete_restaurant,
		routes::restaurants::update_owner,
		routes::restaurants::list_members,
		routes::restaurants::add_member,
		routes::restaurants::remove_member,
		routes::circles::get_circle,
		routes::circles::add_to_circle,
		routes::circles::remove_from_circle
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::user::Role,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::RoleUpdateRequest,
			models::restaurant::Restaurant,
			models::restaurant::RestaurantCreateRequest,
			models::restaurant::RestaurantUpdateRequest,
			models::restaurant::OwnerUpdateRequest,
			models::relation::Membership,
			models::relation::AddMemberRequest,
			models::relation::CircleRelation,
			models::relation::AddCircleRequest
		)
	),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Users", description = "User and role administration"),
		(name = "Restaurants", description = "Restaurants, ownership and memberships"),
		(name = "Circles", description = "Ops lead oversight of black shirts")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc)?;
	ensure_openapi_version(&mut doc)?;
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).context("failed to serialize OpenAPI document")?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn root_object(doc: &mut Value) -> anyhow::Result<&mut Map<String, Value>> {
	doc.as_object_mut().context("OpenAPI root must be an object")
}

fn ensure_security_components(doc: &mut Value) -> anyhow::Result<()> {
	let components = root_object(doc)?
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.context("components must be an object")?;

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.context("securitySchemes must be an object")?;

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);

	Ok(())
}

fn ensure_openapi_version(doc: &mut Value) -> anyhow::Result<()> {
	root_object(doc)?
		.entry("openapi")
		.or_insert_with(|| Value::String("3.1.0".to_string()));
	Ok(())
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
