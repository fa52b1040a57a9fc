#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use warden::app::{router, AppState};
use warden::config::{AppConfig, ResetConfig, SuperadminConfig};
use warden::errors::AppError;
use warden::events::init_event_bus;
use warden::jwt::JwtConfig;
use warden::models::user::NewUser;
use warden::notify::{ResetNotice, ResetNotifier};
use warden::store::principals;
use warden::utils::hash_password;

pub const PASSWORD: &str = "correct horse battery";

/// Temp-file database with migrations applied. Keep the `TempDir` alive for
/// as long as the pool is used.
pub async fn test_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

/// Keeps every reset notice instead of delivering it.
#[derive(Default)]
pub struct CapturingNotifier {
    pub notices: Mutex<Vec<ResetNotice>>,
}

impl CapturingNotifier {
    pub fn sent(&self) -> Vec<ResetNotice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn send_password_reset(&self, notice: ResetNotice) -> Result<(), AppError> {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
        Ok(())
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub router: Router,
    pub notifier: Arc<CapturingNotifier>,
}

impl TestApp {
    /// Router over a fresh database. The catalog is seeded unless `seeded` is false.
    pub async fn new(seeded: bool) -> Result<Self> {
        let (dir, pool) = test_pool().await?;
        if seeded {
            warden::seed::run_seed(&pool, None).await?;
        }

        let config = AppConfig {
            jwt: JwtConfig::new("test-secret", 60),
            reset: ResetConfig::default(),
            superadmin: None,
        };
        let (event_bus, _rx) = init_event_bus();
        let notifier = Arc::new(CapturingNotifier::default());
        let state = AppState::new(pool.clone(), config, event_bus, notifier.clone());

        Ok(Self { dir, pool, router: router(state.clone()), state, notifier })
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }

        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let resp = self.router.clone().oneshot(req).await?;
        let status = resp.status();
        let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    /// Registers through the API and returns the new id and session token.
    pub async fn register(&self, email: &str) -> Result<(Uuid, String)> {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({"email": email, "password": PASSWORD, "first_name": "Test", "last_name": "User"})),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        let id = body["user"]["id"].as_str().unwrap_or_default().parse()?;
        let token = body["token"].as_str().unwrap_or_default().to_string();
        Ok((id, token))
    }

    /// Creates a superadmin directly in the store and mints a session token for it.
    pub async fn superadmin(&self, email: &str) -> Result<(Uuid, String)> {
        let config = SuperadminConfig {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            first_name: "Super".to_string(),
            last_name: "Admin".to_string(),
        };
        let (user, _) = warden::seed::create_admin(&self.pool, &config).await?;
        let token = self.state.config.jwt.encode(user.id)?;
        Ok((user.id, token))
    }

    pub fn token_for(&self, user_id: Uuid) -> Result<String> {
        Ok(self.state.config.jwt.encode(user_id)?)
    }
}

/// Inserts a plain principal without any role.
pub async fn insert_user(pool: &SqlitePool, email: &str) -> Result<Uuid> {
    let user = principals::create(
        pool,
        NewUser {
            email: email.to_string(),
            password_hash: hash_password(PASSWORD)?,
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email_verified: false,
            is_superadmin: false,
        },
    )
    .await?;
    Ok(user.id)
}
