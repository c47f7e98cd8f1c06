//! Errors reported by platform collaborators.
//!
//! A GPIO controller, interrupt controller or task spawner reports one of
//! these; the driver maps each into the domain error of the step that
//! failed.

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    /// Pin or interrupt is held by another consumer.
    #[error("{resource} is busy")]
    Busy { resource: String },

    /// Pin or interrupt was never acquired, or does not exist.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// The controller has no such capability (e.g. hardware debounce).
    #[error("{operation} not supported by controller")]
    Unsupported { operation: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Controller did not respond or answered garbage.
    #[error("controller error: {message}")]
    CommunicationError { message: String },

    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    pub fn busy(resource: impl Into<String>) -> Self {
        Self::Busy {
            resource: resource.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the controller simply lacks the operation.
    ///
    /// Callers may carry on without an optional capability; every other
    /// error is a real failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}
