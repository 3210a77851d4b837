//! Core types and abstractions for the studio element library.
//!
//! This crate provides the element data model, the registration state
//! machine's states, identity resolution, error handling and configuration
//! shared by the element library components.

pub mod error;
pub mod types;
pub mod config;

pub use error::{ElementError, Result};
pub use types::*;
pub use config::{ApiConfig, BackoffStrategy, LibraryConfig, RegistrationConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ElementError, Result};
    pub use crate::types::*;
    pub use crate::config::{ApiConfig, BackoffStrategy, LibraryConfig, RegistrationConfig};
}
