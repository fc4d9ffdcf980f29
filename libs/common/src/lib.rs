//! Infrastructure shared by the Genova services
//!
//! - [`database`]: PostgreSQL pool and health probe
//! - [`cache`]: Redis JSON values with expiry
//! - [`settings`]: service settings from `GENOVA_*` variables
//! - [`error`]: infrastructure error types
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! # async fn probe() -> Result<(), common::error::DatabaseError> {
//! let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//! assert!(health_check(&pool).await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod settings;
