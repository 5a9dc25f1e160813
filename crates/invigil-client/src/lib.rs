//! invigil-client — backend implementations for the attempt engine.
//!
//! Implements the `QuizBackend` trait over the course platform's REST API
//! and as an in-memory mock, so attempt sessions can run against a live
//! server or entirely offline.

pub mod config;
pub mod mock;
pub mod rest;

pub use config::{create_backend, load_config, load_config_from, session_context, ClientConfig};
pub use mock::MockBackend;
pub use rest::RestBackend;
