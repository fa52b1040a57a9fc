use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::auth::change_password,
		routes::auth::forgot_password,
		routes::auth::reset_password,
		routes::rbac::list_permissions,
		routes::rbac::create_permission,
		routes::rbac::get_permission,
		routes::rbac::update_permission,
		routes::rbac::delete_permission,
		routes::rbac::list_roles,
		routes::rbac::create_role,
		routes::rbac::get_role,
		routes::rbac::update_role,
		routes::rbac::delete_role,
		routes::rbac::set_role_permissions,
		routes::rbac::add_role_permission,
		routes::rbac::remove_role_permission,
		routes::rbac::get_user_roles,
		routes::rbac::set_user_roles,
		routes::rbac::add_user_role,
		routes::rbac::remove_user_role,
		routes::rbac::list_resources,
		routes::rbac::list_actions,
		routes::users::update_user
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::MeResponse,
			models::user::ChangePasswordRequest,
			models::user::ForgotPasswordRequest,
			models::user::ResetPasswordRequest,
			models::user::MessageResponse,
			models::user::AdminUserUpdateRequest,
			models::rbac::Permission,
			models::rbac::PermissionCreateRequest,
			models::rbac::PermissionUpdateRequest,
			models::rbac::Role,
			models::rbac::RoleDetail,
			models::rbac::RoleCreateRequest,
			models::rbac::RoleUpdateRequest,
			models::rbac::SetRolePermissionsRequest,
			models::rbac::UserRole,
			models::rbac::SetUserRolesRequest,
			models::rbac::UserRolesResponse,
			models::rbac::ResourceList,
			models::rbac::ActionList
		)
	),
	tags(
		(name = "Health", description = "Service status"),
		(name = "Auth", description = "Registration, sessions and password reset"),
		(name = "RBAC", description = "Permission and role registries, user role assignments"),
		(name = "Users", description = "Administrative account flags")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

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

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root_object(doc: &mut Value) -> anyhow::Result<&mut Map<String, Value>> {
	doc.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))
}

/// Lowercases method keys, merging operations that differ only by case.
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

fn ensure_security_components(doc: &mut Value) -> anyhow::Result<()> {
	let components = root_object(doc)?
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));

	let schemes = components
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("components must be an object"))?
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	schemes
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("securitySchemes must be an object"))?
		.insert(
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
	let server_url = format!("http://localhost:{port}");

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
