//! # Webhook Delivery Common Library
//!
//! Shared infrastructure used by the delivery core.
//!
//! This crate provides:
//! - Database connection pooling (PostgreSQL via sqlx)
//! - Custom error types
//! - HMAC signature primitive for webhooks
//! - Structured logging setup

// Module declarations
pub mod db;
pub mod error;
pub mod logging;
pub mod signer;

// Re-export commonly used types
pub use db::create_pool;
pub use error::{Error, Result};
pub use logging::init_tracing;
pub use signer::{sign_hmac, verify_hmac};
