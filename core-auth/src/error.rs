use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Secure random source unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("No login attempt is in progress")]
    NoPendingAuthAttempt,

    #[error("Authorization denied: {}", describe(.error, .description))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Malformed redirect: {0}")]
    MalformedRedirect(String),

    #[error("Redirect state does not match the pending login attempt")]
    StateMismatch,

    #[error("Token exchange failed: {}", describe(.error, .description))]
    TokenExchangeFailed {
        error: String,
        description: Option<String>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Token storage failed: {0}")]
    Storage(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    /// Whether retrying the same user action can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::AuthorizationDenied { .. }
                | AuthError::TokenExchangeFailed { .. }
                | AuthError::NotAuthenticated
        )
    }
}

fn describe(error: &str, description: &Option<String>) -> String {
    match description {
        Some(description) if !description.is_empty() => {
            format!("{} ({})", description, error)
        }
        _ => error.to_string(),
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(e: core_runtime::Error) -> Self {
        AuthError::InvalidConfig(e.to_string())
    }
}

impl From<bridge_traits::BridgeError> for AuthError {
    fn from(e: bridge_traits::BridgeError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
