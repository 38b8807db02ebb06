//! Pitwall Core Library
//!
//! Shared functionality for Pitwall components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and timestamp utilities
//! - Tracing initialization
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
