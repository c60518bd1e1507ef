use thiserror::Error;

/// Error taxonomy shared by the client core.
///
/// Validation errors never leave the caller's form; auth, network and server
/// errors are returned as values so views can render them inline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Invalid transition: cannot {operation} while {from}")]
    Transition {
        from: &'static str,
        operation: &'static str,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Request failed ({status}): {detail}")]
    Server { status: u16, detail: String },
    #[error("Response error: {0}")]
    Parse(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    /// Message suitable for an inline alert.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { detail, .. } => detail.clone(),
            Self::Auth(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
