//! Error types for the element library.

/// Result type alias for element library operations.
pub type Result<T> = std::result::Result<T, ElementError>;

/// Main error type for the element library.
#[derive(Debug, thiserror::Error)]
pub enum ElementError {
    /// The registration endpoint reported a failed registration
    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// The backend answered with a non-success status
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Network or transport failure before a response was received
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ElementError {
    /// Create a new registration failure
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new remote error from a status code and response text
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a registration failure
    pub fn is_registration_failed(&self) -> bool {
        matches!(self, Self::RegistrationFailed { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error came from the network or the backend
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Transport(_))
    }

    /// Short, actionable message suitable for showing to a user.
    ///
    /// Status codes and raw payloads are left out; they belong in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::RegistrationFailed { reason } => {
                format!("Registration failed: {}. Please try again.", reason)
            }
            Self::Remote { status, .. } if *status == 404 => {
                "The element no longer exists. Refresh the library.".to_string()
            }
            Self::Remote { status, .. } if *status == 401 || *status == 403 => {
                "You are not allowed to do this. Sign in again.".to_string()
            }
            Self::Remote { .. } | Self::Transport(_) => {
                "The server could not be reached. Please try again shortly.".to_string()
            }
            Self::InvalidInput(msg) => msg.clone(),
            Self::NotFound { resource, .. } => format!("The {} could not be found.", resource),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}
