//! Contract for the idempotent register-or-check endpoint.

use async_trait::async_trait;
use element_core::{AssetRef, Result};
use serde::{Deserialize, Serialize};

/// Options for a single registration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOptions {
    /// Bypass remote deduplication and register an already registered asset again
    pub force: bool,
}

impl RegisterOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Answer of the register-or-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RegistrationResult {
    /// Registration finished and the provider issued an id
    Completed { id: String },
    /// A registration job exists and is still running
    Processing { job_token: Option<String> },
    /// The provider rejected the registration
    Failed { reason: String },
}

/// Client for the remote register-or-check operation.
///
/// Implementations hold no state between calls. Repeating a call for the
/// same asset is safe: the endpoint either starts a job, reports the running
/// one, or returns the finished registration.
#[async_trait]
pub trait RegistrationClient: Send + Sync {
    /// Create or check the registration of `asset`.
    ///
    /// An `Err` means the call itself failed (transport, unexpected status);
    /// a provider-side rejection is reported as [`RegistrationResult::Failed`].
    async fn register(&self, asset: &AssetRef, options: RegisterOptions)
        -> Result<RegistrationResult>;
}
