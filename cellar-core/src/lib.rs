//! # Cellar Core
//!
//! Shared building blocks for the cellar store:
//! - Error types
//! - Configuration
//! - Core value types

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::Options;
pub use error::{Error, Result};
pub use types::{Entry, Seq};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
