//! Checks against live PostgreSQL and Redis instances.
//!
//! Ignored by default; run with `cargo test -p common -- --ignored` once
//! `DATABASE_URL` and `REDIS_URL` point at disposable services.

use std::time::Duration;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Probe {
    session: String,
    code: String,
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn postgres_pool_answers_health_check() -> anyhow::Result<()> {
    let pool = init_pool(&DatabaseConfig::from_env()?).await?;
    assert!(health_check(&pool).await?);

    let (now_is_set,): (bool,) = sqlx::query_as("SELECT now() IS NOT NULL")
        .fetch_one(&pool)
        .await?;
    assert!(now_is_set);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Redis instance"]
async fn redis_round_trips_json_with_expiry() -> anyhow::Result<()> {
    let redis = RedisPool::connect(&RedisConfig::from_env()?).await?;
    assert!(redis.health_check().await?);

    let probe = Probe {
        session: "integration".to_string(),
        code: "042117".to_string(),
    };
    redis
        .put_json("checkin:integration:pin", &probe, Duration::from_secs(10))
        .await?;

    let stored: Option<Probe> = redis.get_json("checkin:integration:pin").await?;
    assert_eq!(stored, Some(probe));

    let missing: Option<Probe> = redis.get_json("checkin:never-written:pin").await?;
    assert!(missing.is_none());
    Ok(())
}
