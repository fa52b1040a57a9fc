use serde_json::Value;

#[test]
fn openapi_documents_admin_routes_with_bearer_auth() -> anyhow::Result<()> {
    let doc = warden::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for path in [
        "/auth/me",
        "/auth/change-password",
        "/auth/forgot-password",
        "/auth/reset-password",
        "/admin/rbac/roles/{id}/permissions",
        "/admin/rbac/users/{id}/roles/{role_id}",
        "/admin/users/{id}",
    ] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{path}'");
    }

    let scheme = &v["components"]["securitySchemes"]["bearerAuth"];
    assert_eq!(scheme["scheme"], "bearer");

    let role_detail = v["components"]["schemas"]["RoleDetail"].to_string();
    assert!(role_detail.contains("user_count"), "RoleDetail schema lacks user_count: {role_detail}");

    Ok(())
}

#[test]
fn reset_token_schema_is_not_exposed() -> anyhow::Result<()> {
    let doc = warden::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;
    assert!(v["components"]["schemas"].get("ResetToken").is_none());
    Ok(())
}
