use thiserror::Error;

/// Why a push delivery failed.
///
/// `Unregistered` means the provider permanently rejected the token and the
/// subscriber should be removed. Everything else is `Transient`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("delivery target is no longer registered: {0}")]
    Unregistered(String),

    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Unregistered(_))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Insufficient data: have {have} bars, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Indicator computation failed: {0}")]
    Indicator(String),

    #[error("Scorer error: {0}")]
    Scorer(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unregistered_is_permanent() {
        assert!(DeliveryError::Unregistered("gone".into()).is_permanent());
        assert!(!DeliveryError::Transient("503".into()).is_permanent());
    }

    #[test]
    fn insufficient_data_message_names_both_counts() {
        let e = Error::InsufficientData { have: 12, need: 52 };
        assert_eq!(e.to_string(), "Insufficient data: have 12 bars, need 52");
    }
}
