//! Check-in credential generation and storage
//!
//! Credentials live for [`CREDENTIAL_TTL_SECONDS`] and are keyed by
//! `(session_id, method)`. Issuing a new one replaces the previous one; a
//! successful check-in does not consume it, so every student of the session
//! can use the same code while it is valid.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::TutoringResult;
use crate::models::{CheckInCredential, CheckInMethod};

/// Validity window of a freshly issued credential
pub const CREDENTIAL_TTL_SECONDS: i64 = 300;

/// Length of the hex token encoded in QR codes
pub const QR_TOKEN_LENGTH: usize = 16;

/// Expiring key-value storage for check-in credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a credential, replacing any previous one for the same key
    async fn put(&self, credential: CheckInCredential) -> TutoringResult<()>;

    async fn get(
        &self,
        session_id: Uuid,
        method: CheckInMethod,
    ) -> TutoringResult<Option<CheckInCredential>>;

    /// Drop credentials that expired before `now`. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> TutoringResult<usize>;
}

/// Credential store for a single process
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: Arc<Mutex<HashMap<(Uuid, CheckInMethod), CheckInCredential>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn put(&self, credential: CheckInCredential) -> TutoringResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert((credential.session_id, credential.method), credential);
        Ok(())
    }

    async fn get(
        &self,
        session_id: Uuid,
        method: CheckInMethod,
    ) -> TutoringResult<Option<CheckInCredential>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&(session_id, method)).cloned())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> TutoringResult<usize> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, credential| !credential.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired check-in credentials");
        }
        Ok(purged)
    }
}

/// Uniformly random 6-digit decimal code, leading zeros kept
pub fn generate_pin<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

/// First 16 hex characters of SHA-256 over the session id and issue time
pub fn generate_qr_token(session_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(
        issued_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| issued_at.timestamp_millis())
            .to_be_bytes(),
    );
    let digest = format!("{:x}", hasher.finalize());
    digest[..QR_TOKEN_LENGTH].to_string()
}

/// Build a credential of the given kind, valid from `now`
pub fn issue_credential(
    session_id: Uuid,
    method: CheckInMethod,
    now: DateTime<Utc>,
) -> CheckInCredential {
    let code = match method {
        CheckInMethod::Pin => generate_pin(&mut rand::thread_rng()),
        CheckInMethod::Qr => generate_qr_token(session_id, now),
    };

    CheckInCredential {
        session_id,
        method,
        code,
        created_at: now,
        expires_at: now + Duration::seconds(CREDENTIAL_TTL_SECONDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 14, 0, 0).unwrap()
    }

    #[test]
    fn pins_are_six_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let pin = generate_pin(&mut rng);
            assert_eq!(pin.len(), 6);
            assert!(pin.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn qr_tokens_are_short_hex_and_time_dependent() {
        let session = Uuid::new_v4();
        let first = generate_qr_token(session, t0());
        let second = generate_qr_token(session, t0() + Duration::milliseconds(1));

        assert_eq!(first.len(), QR_TOKEN_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
        assert_eq!(first, generate_qr_token(session, t0()));
    }

    #[test]
    fn issued_credentials_expire_after_five_minutes() {
        let credential = issue_credential(Uuid::new_v4(), CheckInMethod::Pin, t0());
        assert_eq!(credential.expires_at - credential.created_at, Duration::seconds(300));
        assert!(!credential.is_expired(t0() + Duration::seconds(299)));
        assert!(credential.is_expired(t0() + Duration::seconds(301)));
        assert_eq!(credential.remaining_seconds(t0()), 300);
    }

    #[tokio::test]
    async fn put_overwrites_and_purge_drops_expired() {
        let store = InMemoryCredentialStore::new();
        let session = Uuid::new_v4();

        store
            .put(issue_credential(session, CheckInMethod::Pin, t0()))
            .await
            .unwrap();
        let replacement = issue_credential(session, CheckInMethod::Pin, t0() + Duration::seconds(60));
        store.put(replacement.clone()).await.unwrap();
        store
            .put(issue_credential(session, CheckInMethod::Qr, t0()))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.get(session, CheckInMethod::Pin).await.unwrap(),
            Some(replacement)
        );

        let purged = store
            .purge_expired(t0() + Duration::seconds(330))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get(session, CheckInMethod::Qr).await.unwrap().is_none());
        assert!(store.get(session, CheckInMethod::Pin).await.unwrap().is_some());
    }
}
