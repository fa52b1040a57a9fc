use anyhow::Result;
use chrono::Duration;

use warden::errors::AppError;
use warden::store::{principals, reset_tokens};
use warden::utils::{utc_now, verify_password};

mod common;

const NEW_PASSWORD: &str = "a brand new secret";

#[tokio::test]
async fn token_is_single_use() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "reset@example.com").await?;
    let now = utc_now();

    let issued = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;
    assert_eq!(reset_tokens::validate(&pool, &issued.token, now).await?, user_id);

    let consumed = reset_tokens::consume(&pool, &issued.token, NEW_PASSWORD, now).await?;
    assert!(consumed.used);
    assert!(consumed.used_at.is_some());

    let stored = principals::find_by_id(&pool, user_id).await?.expect("user");
    assert!(verify_password(NEW_PASSWORD, &stored.password_hash));

    let err = reset_tokens::consume(&pool, &issued.token, "another password", now).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyConsumed(_)), "got {err:?}");

    let unchanged = principals::find_by_id(&pool, user_id).await?.expect("user");
    assert_eq!(unchanged.password_hash, stored.password_hash);
    assert!(matches!(
        reset_tokens::validate(&pool, &issued.token, now).await,
        Err(AppError::AlreadyConsumed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected_and_stays_unused() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "late@example.com").await?;
    let issued_at = utc_now();

    let issued = reset_tokens::issue(&pool, user_id, Duration::minutes(30), issued_at).await?;
    let later = issued_at + Duration::minutes(31);

    assert!(matches!(reset_tokens::validate(&pool, &issued.token, later).await, Err(AppError::Expired(_))));
    let err = reset_tokens::consume(&pool, &issued.token, NEW_PASSWORD, later).await.unwrap_err();
    assert!(matches!(err, AppError::Expired(_)), "got {err:?}");

    let used: bool = sqlx::query_scalar("SELECT used FROM password_reset_tokens WHERE token = ?")
        .bind(&issued.token)
        .fetch_one(&pool)
        .await?;
    assert!(!used);

    let stored = principals::find_by_id(&pool, user_id).await?.expect("user");
    assert!(verify_password(common::PASSWORD, &stored.password_hash));
    Ok(())
}

#[tokio::test]
async fn unknown_token_is_not_found() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let err = reset_tokens::consume(&pool, "no-such-token", NEW_PASSWORD, utc_now()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn issuing_again_supersedes_the_outstanding_token() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "twice@example.com").await?;
    let now = utc_now();

    let first = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;
    let second = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;
    assert_ne!(first.token, second.token);

    assert!(matches!(reset_tokens::validate(&pool, &first.token, now).await, Err(AppError::NotFound(_))));
    reset_tokens::consume(&pool, &second.token, NEW_PASSWORD, now).await?;

    let outstanding: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_tokens WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(&pool)
        .await?;
    assert_eq!(outstanding, 1);
    Ok(())
}

#[tokio::test]
async fn weak_password_leaves_the_token_usable() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "weak@example.com").await?;
    let now = utc_now();
    let issued = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;

    let err = reset_tokens::consume(&pool, &issued.token, "short", now).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");
    assert_eq!(reset_tokens::validate(&pool, &issued.token, now).await?, user_id);
    Ok(())
}

#[tokio::test]
async fn concurrent_consumers_have_exactly_one_winner() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "race@example.com").await?;
    let now = utc_now();
    let issued = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;

    let (a, b) = tokio::join!(
        reset_tokens::consume(&pool, &issued.token, "first racer password", now),
        reset_tokens::consume(&pool, &issued.token, "second racer password", now),
    );

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "outcomes: {outcomes:?}");
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::AlreadyConsumed(_)))));
    Ok(())
}

#[tokio::test]
async fn unrepresentable_expiry_is_rejected_without_touching_tokens() -> Result<()> {
    let (_dir, pool) = common::test_pool().await?;
    let user_id = common::insert_user(&pool, "far-future@example.com").await?;
    let now = utc_now();
    let existing = reset_tokens::issue(&pool, user_id, Duration::minutes(30), now).await?;

    let err = reset_tokens::issue(&pool, user_id, Duration::days(100_000_000), now).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)), "got {err:?}");

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_tokens").fetch_one(&pool).await?;
    assert_eq!(stored, 1);
    assert_eq!(reset_tokens::validate(&pool, &existing.token, now).await?, user_id);
    Ok(())
}
