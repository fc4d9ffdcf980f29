//! HTTP API for tutoring sessions, attendance and settlement
//!
//! The binary in `main.rs` wires the storage backend, the credential backend,
//! the side-effect worker and the sweep scheduler around [`routes::create_router`].

pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod validation;

pub use routes::create_router;
pub use state::AppState;
