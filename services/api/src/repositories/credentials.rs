//! Check-in credentials shared through Redis
//!
//! Each credential is stored as JSON under `checkin:{session_id}:{method}`
//! with a TTL matching its remaining validity, so Redis evicts it on its own.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::cache::RedisPool;
use tracing::debug;
use tutoring::credentials::CredentialStore;
use tutoring::models::{CheckInCredential, CheckInMethod};
use tutoring::{TutoringError, TutoringResult};
use uuid::Uuid;

fn credential_key(session_id: Uuid, method: CheckInMethod) -> String {
    format!("checkin:{}:{}", session_id, method.as_str())
}

/// Credential store backed by Redis keys with a TTL
#[derive(Clone)]
pub struct RedisCredentialStore {
    redis: RedisPool,
}

impl RedisCredentialStore {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }
}

fn redis_error(err: anyhow::Error) -> TutoringError {
    TutoringError::Store(format!("Redis: {}", err))
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn put(&self, credential: CheckInCredential) -> TutoringResult<()> {
        let ttl = credential.remaining_seconds(credential.created_at).max(1) as u64;
        self.redis
            .put_json(
                &credential_key(credential.session_id, credential.method),
                &credential,
                Duration::from_secs(ttl),
            )
            .await
            .map_err(redis_error)
    }

    async fn get(
        &self,
        session_id: Uuid,
        method: CheckInMethod,
    ) -> TutoringResult<Option<CheckInCredential>> {
        self.redis
            .get_json(&credential_key(session_id, method))
            .await
            .map_err(redis_error)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> TutoringResult<usize> {
        debug!("Redis expires check-in credentials by TTL, nothing to purge");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_include_session_and_method() {
        let session_id = Uuid::nil();
        assert_eq!(
            credential_key(session_id, CheckInMethod::Qr),
            "checkin:00000000-0000-0000-0000-000000000000:qr"
        );
    }
}
