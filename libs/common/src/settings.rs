//! Service settings loaded through the `config` crate
//!
//! Every setting has a default and can be overridden by a `GENOVA_*`
//! environment variable, e.g. `GENOVA_BIND_ADDRESS=0.0.0.0:8080` or
//! `GENOVA_CREDENTIAL_BACKEND=redis`.

use std::collections::HashMap;

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::SettingsError;

/// Where sessions, attendance and payments are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store, intended for local development and demos
    Memory,
    /// PostgreSQL through sqlx
    Postgres,
}

/// Where short-lived check-in credentials are held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// Mutex-guarded map, only valid for a single API instance
    Memory,
    /// Redis keys with a TTL, shared between instances
    Redis,
}

/// Settings for the API service
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Socket address the HTTP server binds to
    pub bind_address: String,
    pub storage_backend: StorageBackend,
    pub credential_backend: CredentialBackend,
    /// Cron expression (with seconds) for the attendance sweep
    pub attendance_sweep_schedule: String,
    /// Cron expression (with seconds) for the expired-credential janitor
    pub credential_gc_schedule: String,
    /// Hide internal error details from clients
    pub production: bool,
    /// Share of every payment hold retained by the platform, in `[0, 1)`
    pub platform_commission: f64,
}

impl ServiceSettings {
    /// Load settings from `GENOVA_*` environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::load(None)
    }

    /// Load settings from an explicit variable map instead of the process
    /// environment. Keys use the same `GENOVA_*` names.
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self, SettingsError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .set_default("bind_address", "0.0.0.0:3001")?
            .set_default("storage_backend", "postgres")?
            .set_default("credential_backend", "memory")?
            .set_default("attendance_sweep_schedule", "0 */5 * * * *")?
            .set_default("credential_gc_schedule", "30 */5 * * * *")?
            .set_default("production", false)?
            .set_default("platform_commission", 0.15)?
            .add_source(
                Environment::with_prefix("GENOVA")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let settings: ServiceSettings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(0.0..1.0).contains(&self.platform_commission) {
            return Err(SettingsError::Invalid {
                key: "platform_commission",
                reason: format!("{} is outside [0, 1)", self.platform_commission),
            });
        }

        for (key, schedule) in [
            ("attendance_sweep_schedule", &self.attendance_sweep_schedule),
            ("credential_gc_schedule", &self.credential_gc_schedule),
        ] {
            if schedule.trim().is_empty() {
                return Err(SettingsError::Invalid {
                    key,
                    reason: "schedule must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = ServiceSettings::from_map(HashMap::new()).unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:3001");
        assert_eq!(settings.storage_backend, StorageBackend::Postgres);
        assert_eq!(settings.credential_backend, CredentialBackend::Memory);
        assert_eq!(settings.attendance_sweep_schedule, "0 */5 * * * *");
        assert!(!settings.production);
        assert!((settings.platform_commission - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides() {
        let settings = ServiceSettings::from_map(vars(&[
            ("GENOVA_BIND_ADDRESS", "127.0.0.1:8080"),
            ("GENOVA_STORAGE_BACKEND", "memory"),
            ("GENOVA_CREDENTIAL_BACKEND", "redis"),
            ("GENOVA_PRODUCTION", "true"),
            ("GENOVA_PLATFORM_COMMISSION", "0.2"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_address, "127.0.0.1:8080");
        assert_eq!(settings.storage_backend, StorageBackend::Memory);
        assert_eq!(settings.credential_backend, CredentialBackend::Redis);
        assert!(settings.production);
        assert!((settings.platform_commission - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_commission_out_of_range() {
        let result = ServiceSettings::from_map(vars(&[("GENOVA_PLATFORM_COMMISSION", "1.5")]));
        assert!(matches!(
            result,
            Err(SettingsError::Invalid {
                key: "platform_commission",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = ServiceSettings::from_map(vars(&[("GENOVA_STORAGE_BACKEND", "sqlite")]));
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }
}
