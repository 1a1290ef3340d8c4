//! Error types for Pokecast

use thiserror::Error;

use crate::types::CandidateId;

pub type Result<T> = std::result::Result<T, PokecastError>;

#[derive(Error, Debug)]
pub enum PokecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Content fetch failed: {0}")]
    Content(#[from] ContentError),

    #[error("Composition failed: {0}")]
    Composition(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Every id in [1, {universe}] has already been published")]
    Exhausted { universe: u32 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PokecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PokecastError::Protocol(ProtocolError::Authentication(_)) => 2,
            PokecastError::Config(_) | PokecastError::InvalidInput(_) => 3,
            PokecastError::Exhausted { .. } => 4,
            PokecastError::History(_)
            | PokecastError::Content(_)
            | PokecastError::Composition(_)
            | PokecastError::Protocol(_) => 1,
        }
    }

    /// True when the PDS refused the credentials or the session token
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            PokecastError::Protocol(ProtocolError::Authentication(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures of the publish-history backends
///
/// `Lookup` and `Write` are never fatal to a run; the publisher logs them
/// and carries on. `Load` and `Backend` surface while opening a store.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to check whether #{id} was already published ({backend}): {reason}")]
    Lookup {
        backend: String,
        id: CandidateId,
        reason: String,
    },

    #[error("failed to record #{id} as published ({backend}): {reason}")]
    Write {
        backend: String,
        id: CandidateId,
        reason: String,
    },

    #[error("failed to load history from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {backend} history backend: {reason}")]
    Backend { backend: String, reason: String },
}

/// Failures while gathering post content from the data API or sprite host
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("request for {operation} ({target}) failed: {reason}")]
    Request {
        operation: &'static str,
        target: String,
        reason: String,
    },

    #[error("{operation} ({target}) returned HTTP {status}")]
    Status {
        operation: &'static str,
        target: String,
        status: u16,
    },

    #[error("{operation} ({target}) returned an invalid body: {reason}")]
    Decode {
        operation: &'static str,
        target: String,
        reason: String,
    },

    #[error("{operation} ({target}) returned an empty record")]
    Empty {
        operation: &'static str,
        target: String,
    },

    #[error("no English flavor text for species #{id}")]
    MissingEnglishFlavorText { id: CandidateId },

    #[error("image is {size} bytes, limit is {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },
}

#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Blob upload failed: {0}")]
    Upload(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_authentication_error() {
        let error = PokecastError::Protocol(ProtocolError::Authentication("bad password".into()));
        assert_eq!(error.exit_code(), 2);
        assert!(error.is_authentication());
    }

    #[test]
    fn test_exit_code_posting_error() {
        let error = PokecastError::Protocol(ProtocolError::Posting("HTTP 500".into()));
        assert_eq!(error.exit_code(), 1);
        assert!(!error.is_authentication());
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = PokecastError::Config(ConfigError::MissingField("bluesky.handle".into()));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_exhausted() {
        let error = PokecastError::Exhausted { universe: 1025 };
        assert_eq!(error.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_content_and_composition() {
        let content = PokecastError::Content(ContentError::MissingEnglishFlavorText {
            id: CandidateId::new(25),
        });
        assert_eq!(content.exit_code(), 1);

        let composition = PokecastError::Composition("species name is empty".into());
        assert_eq!(composition.exit_code(), 1);
    }

    #[test]
    fn test_history_error_carries_id_and_backend() {
        let error = HistoryError::Write {
            backend: "s3".into(),
            id: CandidateId::new(7),
            reason: "AccessDenied".into(),
        };
        let message = error.to_string();
        assert!(message.contains("#7"));
        assert!(message.contains("s3"));
        assert!(message.contains("AccessDenied"));
    }

    #[test]
    fn test_content_error_chain_formatting() {
        let error: PokecastError = ContentError::Status {
            operation: "fetch species",
            target: "pokemon/9999".into(),
            status: 404,
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Content fetch failed: fetch species (pokemon/9999) returned HTTP 404"
        );
    }

    #[test]
    fn test_image_too_large_formatting() {
        let error = ContentError::ImageTooLarge {
            size: 1_000_001,
            limit: 1_000_000,
        };
        assert_eq!(
            error.to_string(),
            "image is 1000001 bytes, limit is 1000000 bytes"
        );
    }

    #[test]
    fn test_protocol_error_clone() {
        let original = ProtocolError::Network("connection reset".into());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}
