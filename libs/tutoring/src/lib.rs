//! Tutoring session domain: lifecycle, attendance and settlement
//!
//! The engines are storage agnostic. They talk to the store through the
//! traits in [`repository`] and emit side effects through an [`events::Outbox`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutoring::clock::SystemClock;
//! use tutoring::credentials::InMemoryCredentialStore;
//! use tutoring::events::RecordingOutbox;
//! use tutoring::memory::InMemoryStore;
//! use tutoring::repository::Repositories;
//! use tutoring::service::TutoringService;
//! use tutoring::settlement::SettlementPolicy;
//!
//! let service = TutoringService::new(
//!     Repositories::from_store(Arc::new(InMemoryStore::new())),
//!     Arc::new(InMemoryCredentialStore::new()),
//!     Arc::new(RecordingOutbox::new()),
//!     Arc::new(SystemClock),
//!     SettlementPolicy::default(),
//! );
//! # let _ = service;
//! ```

pub mod attendance;
pub mod availability;
pub mod badges;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod money;
pub mod repository;
pub mod service;
pub mod settlement;
pub mod sweep;

pub use error::{TutoringError, TutoringResult};
pub use money::Money;
pub use service::TutoringService;
