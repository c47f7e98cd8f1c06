use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Resource errors
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Interrupt registration failed: {0}")]
    RegistrationFailed(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Missing attribute: {0}")]
    MissingAttribute(String),

    // Power management errors
    #[error("Wake configuration failed: {0}")]
    WakeConfigurationFailed(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    /// Build an `InvalidStateTransition` from any two displayable states.
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ResourceUnavailable("gpio 17 already claimed".into()).to_string(),
            "Resource unavailable: gpio 17 already claimed"
        );
        assert_eq!(
            Error::MissingAttribute("label".into()).to_string(),
            "Missing attribute: label"
        );
    }

    #[test]
    fn test_invalid_transition_helper() {
        let error = Error::invalid_transition("Suspended", "Suspended");
        assert_eq!(
            error,
            Error::InvalidStateTransition {
                from: "Suspended".into(),
                to: "Suspended".into(),
            }
        );
        assert_eq!(
            error.to_string(),
            "Invalid state transition from Suspended to Suspended"
        );
    }
}
