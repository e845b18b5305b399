//! Error types for the envars webhook

use kube::core::admission::SerializePatchError;
use thiserror::Error;

/// Main error type for admission handling
#[derive(Debug, Error)]
pub enum Error {
    /// The admitted object is missing or could not be decoded
    #[error("could not deserialize {kind} object: {reason}")]
    Decode {
        /// Kind of object that was expected
        kind: &'static str,
        /// Why decoding failed
        reason: String,
    },

    /// Kubernetes API error while reading or writing nodes, pods or secrets
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A patch value could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The JSON patch could not be attached to the admission response
    #[error("patch error: {0}")]
    Patch(#[from] SerializePatchError),
}

impl Error {
    /// Create a decode error for an object of the given kind
    pub fn decode(kind: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            kind,
            reason: reason.to_string(),
        }
    }

    /// Whether the error is an API "not found" response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

/// Result alias for envars webhook operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
