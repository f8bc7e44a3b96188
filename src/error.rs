// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Maps account, token and authorization failures to exit codes

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid account id: {0}")]
    InvalidId(String),

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Could not sign in after {attempts} attempts, please try again{}", retry_suffix(.last_error))]
    RetryExhausted {
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::InvalidId(_) => 3,
            Error::ExchangeFailed(_) => 4,
            Error::AuthorizationFailed(_) => 5,
            Error::RetryExhausted { .. } => 6,
            Error::Network(_) => 7,
            Error::Api { .. } => 8,
            Error::Parse(_) => 9,
            Error::Filesystem(_) => 10,
            Error::Config(_) => 11,
        }
    }
}

fn retry_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(message) => format!(" ({})", message),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
