//! Authentication middleware for JWT token validation

use anyhow::{Result, anyhow};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// User roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
}

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub roles: Vec<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Token verification settings, built once at start-up
#[derive(Clone)]
pub struct JwtConfig {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_PUBLIC_KEY`: RS256 public key (PEM format) or path to the key file
    /// - `JWT_SECRET`: HS256 shared secret, used when no public key is set
    pub fn from_env() -> Result<Self> {
        if let Ok(public_key) = env::var("JWT_PUBLIC_KEY") {
            // If the public key looks like a file path, read from file (try CWD, then project root)
            let public_key = if public_key.starts_with("-----BEGIN") {
                public_key
            } else {
                std::fs::read_to_string(&public_key)
                    .or_else(|_| {
                        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
                        path.push(&public_key);
                        std::fs::read_to_string(path)
                    })
                    .map_err(|e| anyhow!("Failed to read public key file: {}", e))?
                    .trim()
                    .to_string()
            };
            return Self::rs256(&public_key);
        }

        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow!("Neither JWT_PUBLIC_KEY nor JWT_SECRET is set"))?;
        Ok(Self::hs256(secret.as_bytes()))
    }

    pub fn rs256(public_key_pem: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow!("Failed to create decoding key: {}", e))?;
        Ok(Self::with_key(decoding_key, Algorithm::RS256))
    }

    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    fn with_key(decoding_key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        Self {
            decoding_key,
            validation,
        }
    }

    /// Validate a bearer token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(|| {
        debug!(path = %req.uri().path(), "Missing bearer token");
        ApiError::Unauthorized
    })?;

    let claims = state.jwt.verify(bearer.token()).map_err(|e| {
        warn!("Failed to validate token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        roles: claims.roles,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn token(secret: &[u8], exp: u64) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let claims = Claims {
            sub,
            roles: vec!["student".to_string()],
            iat: now(),
            exp,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap();
        (sub, token)
    }

    #[test]
    fn test_verify_accepts_valid_token() {
        let config = JwtConfig::hs256(b"test-secret");
        let (sub, token) = token(b"test-secret", now() + 600);

        let claims = config.verify(&token).unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.roles, vec!["student"]);
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let config = JwtConfig::hs256(b"test-secret");
        let (_, token) = token(b"other-secret", now() + 600);
        assert!(config.verify(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let config = JwtConfig::hs256(b"test-secret");
        let (_, token) = token(b"test-secret", now() - 3600);
        assert!(config.verify(&token).is_err());
    }
}
