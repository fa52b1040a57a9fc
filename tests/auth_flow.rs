use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use warden::jwt::JwtConfig;
use warden::store::principals;

mod common;

use common::{TestApp, PASSWORD};

#[tokio::test]
async fn register_login_and_me() -> Result<()> {
    let app = TestApp::new(true).await?;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "ada@example.com", "password": PASSWORD, "first_name": "Ada", "last_name": "Lovelace"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["token_type"], "bearer");
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["token"].as_str().map(|t| t.split('.').count()), Some(3));

    let (status, body) = app
        .send(Method::POST, "/auth/login", None, Some(json!({"email": "ada@example.com", "password": PASSWORD})))
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    let token = body["token"].as_str().unwrap_or_default().to_string();

    let (status, me) = app.send(Method::GET, "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "{me}");
    assert_eq!(me["user"]["email"], "ada@example.com");
    assert_eq!(me["roles"], json!(["user"]));
    assert_eq!(me["permissions"], json!([]));

    let (status, _) = app.send(Method::POST, "/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts() -> Result<()> {
    let app = TestApp::new(true).await?;
    app.register("dup@example.com").await?;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "dup@example.com", "password": PASSWORD, "first_name": "A", "last_name": "B"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    Ok(())
}

#[tokio::test]
async fn bad_credentials_look_the_same() -> Result<()> {
    let app = TestApp::new(true).await?;
    app.register("known@example.com").await?;

    let (s1, b1) = app
        .send(Method::POST, "/auth/login", None, Some(json!({"email": "known@example.com", "password": "wrong password"})))
        .await?;
    let (s2, b2) = app
        .send(Method::POST, "/auth/login", None, Some(json!({"email": "nobody@example.com", "password": "wrong password"})))
        .await?;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!((s1, b1), (s2, b2));
    Ok(())
}

#[tokio::test]
async fn expired_and_tampered_tokens_fail_alike() -> Result<()> {
    let app = TestApp::new(true).await?;
    let (user_id, token) = app.register("tokens@example.com").await?;

    let expired = JwtConfig::new("test-secret", -5).encode(user_id)?;
    let forged = JwtConfig::new("other-secret", 60).encode(user_id)?;
    let mut tampered = token.clone();
    tampered.push('x');

    let mut bodies = Vec::new();
    for bad in [&expired, &forged, &tampered] {
        let (status, body) = app.send(Method::GET, "/auth/me", Some(bad), None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        bodies.push(body);
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]), "{bodies:?}");

    let (status, _) = app.send(Method::GET, "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn deactivated_user_is_rejected_at_request_time() -> Result<()> {
    let app = TestApp::new(true).await?;
    let (user_id, token) = app.register("gone@example.com").await?;

    principals::set_flags(&app.pool, user_id, Some(false), None).await?;

    let (status, body) = app.send(Method::GET, "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = app
        .send(Method::POST, "/auth/login", None, Some(json!({"email": "gone@example.com", "password": PASSWORD})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn forgot_password_does_not_reveal_accounts() -> Result<()> {
    let app = TestApp::new(true).await?;
    app.register("exists@example.com").await?;

    let (s1, b1) = app
        .send(Method::POST, "/auth/forgot-password", None, Some(json!({"email": "exists@example.com"})))
        .await?;
    let (s2, b2) = app
        .send(Method::POST, "/auth/forgot-password", None, Some(json!({"email": "missing@example.com"})))
        .await?;

    assert_eq!(s1, StatusCode::OK);
    assert_eq!((s1, b1), (s2, b2));

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "exists@example.com");
    assert_eq!(sent[0].expire_minutes, 30);
    Ok(())
}

#[tokio::test]
async fn reset_password_flow() -> Result<()> {
    let app = TestApp::new(true).await?;
    app.register("forgetful@example.com").await?;

    app.send(Method::POST, "/auth/forgot-password", None, Some(json!({"email": "forgetful@example.com"})))
        .await?;
    let token = app.notifier.sent().pop().map(|n| n.token).unwrap_or_default();

    let (status, body) = app
        .send(Method::POST, "/auth/reset-password", None, Some(json!({"token": token, "new_password": "fresh password 1"})))
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Password has been reset successfully");

    let (status, _) = app
        .send(Method::POST, "/auth/login", None, Some(json!({"email": "forgetful@example.com", "password": "fresh password 1"})))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (reused_status, reused) = app
        .send(Method::POST, "/auth/reset-password", None, Some(json!({"token": token, "new_password": "second password"})))
        .await?;
    let (unknown_status, unknown) = app
        .send(Method::POST, "/auth/reset-password", None, Some(json!({"token": "bogus", "new_password": "second password"})))
        .await?;
    assert_eq!(reused_status, StatusCode::BAD_REQUEST);
    assert_eq!((reused_status, reused), (unknown_status, unknown));
    Ok(())
}

#[tokio::test]
async fn change_password_requires_the_current_one() -> Result<()> {
    let app = TestApp::new(true).await?;
    let (_, token) = app.register("rotate@example.com").await?;
    let login = |password: &'static str| json!({"email": "rotate@example.com", "password": password});

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/change-password",
            None,
            Some(json!({"current_password": PASSWORD, "new_password": "rotated secret"})),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": "not my password", "new_password": "rotated secret"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap_or_default().contains("invalid credentials"), "{body}");

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": PASSWORD, "new_password": "short"})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap_or_default().contains("at least 8"), "{body}");

    let (status, _) = app.send(Method::POST, "/auth/login", None, Some(login(PASSWORD))).await?;
    assert_eq!(status, StatusCode::OK, "rejected changes must keep the old password");

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/change-password",
            Some(&token),
            Some(json!({"current_password": PASSWORD, "new_password": "rotated secret"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Password changed successfully");

    let (status, _) = app.send(Method::POST, "/auth/login", None, Some(login(PASSWORD))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(Method::POST, "/auth/login", None, Some(login("rotated secret"))).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
