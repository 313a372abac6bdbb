//! Error types for CyberX

use thiserror::Error;

use crate::capability::Failure;

/// Result type alias using CyberX's Error
pub type Result<T> = std::result::Result<T, Error>;

/// CyberX error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Service errors (E100-E199)
    #[error("Capability '{0}' failed: {1}")]
    Capability(String, Failure),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Fallback errors (E200-E299)
    #[error("No fallback match found for '{0}'")]
    NoMatchFound(String),

    #[error("Insufficient context to answer '{0}'")]
    InsufficientContext(String),

    // Knowledge base errors (E300-E399)
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Record errors (E400-E499)
    #[error("Invalid intelligence record: {0}")]
    InvalidRecord(String),

    // Session errors (E500-E599)
    #[error("Required collaborator '{0}' is not initialized")]
    MissingCollaborator(&'static str),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // Audit errors (E600-E699)
    #[error("Artifact '{0}' already exists. Artifacts are write-once.")]
    ArtifactExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors (E700-E799)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Capability(..) => "E100",
            Self::NetworkError(_) => "E101",
            Self::NoMatchFound(_) => "E200",
            Self::InsufficientContext(_) => "E201",
            Self::EmbeddingFailed(_) => "E300",
            Self::DimensionMismatch { .. } => "E301",
            Self::InvalidRecord(_) => "E400",
            Self::MissingCollaborator(_) => "E500",
            Self::InvalidTransition { .. } => "E501",
            Self::ArtifactExists(_) => "E600",
            Self::Serialization(_) => "E601",
            Self::ConfigError(_) => "E700",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Capability(_, Failure::QuotaExceeded(_)) => {
                Some("Check the quota of COLLECTION_API_KEY / EXTRACTION_API_KEY".to_string())
            }
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::ArtifactExists(_) => {
                Some("Remove the stale artifact or pick another output directory".to_string())
            }
            Self::ConfigError(_) => Some("Inspect config.toml in $CYBERX_CONFIG_DIR".to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NoMatchFound("apt99".into()).code(), "E200");
        assert_eq!(Error::InsufficientContext("q".into()).code(), "E201");
        assert_eq!(Error::MissingCollaborator("knowledge_base").code(), "E500");
        assert_eq!(Error::Other("x".into()).code(), "E9999");
    }

    #[test]
    fn test_quota_suggestion() {
        let err = Error::Capability(
            "collector".into(),
            Failure::QuotaExceeded("429".into()),
        );
        assert!(err.suggestion().unwrap().contains("COLLECTION_API_KEY"));
        assert!(Error::Other("x".into()).suggestion().is_none());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch: index holds 384-dimensional vectors, got 3"
        );
    }
}
