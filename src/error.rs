//! Error types for murmur operations.

use thiserror::Error;

/// Result type alias for murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

/// Main error type for murmur operations.
///
/// Every mutating operation that returns one of these has left persisted state
/// exactly as it was before the call.
#[derive(Error, Debug)]
pub enum MurmurError {
    /// Malformed input, rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// An actor tried to follow itself
    #[error("Self reference: {0}")]
    SelfReference(String),

    /// No authenticated actor on the request
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Wrong role for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A currently banned actor attempted a mutation
    #[error("Actor banned: {0}")]
    ActorBanned(String),

    /// Unknown actor, content, report or notification
    #[error("Not found: {0}")]
    NotFound(String),

    /// Report is already in a terminal state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Ban or delete aimed at an administrator
    #[error("Privileged target: {0}")]
    PrivilegedTarget(String),

    /// Live stream push failed; recovered by the next pull
    #[error("Transient delivery failure: {0}")]
    TransientDelivery(String),

    /// Database errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MurmurError {
    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new self-reference error.
    pub fn self_reference<T: ToString>(msg: T) -> Self {
        Self::SelfReference(msg.to_string())
    }

    /// Creates a new unauthenticated error.
    pub fn unauthenticated<T: ToString>(msg: T) -> Self {
        Self::Unauthenticated(msg.to_string())
    }

    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new actor-banned error.
    pub fn actor_banned<T: ToString>(msg: T) -> Self {
        Self::ActorBanned(msg.to_string())
    }

    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new invalid-transition error.
    pub fn invalid_transition<T: ToString>(msg: T) -> Self {
        Self::InvalidTransition(msg.to_string())
    }

    /// Creates a new privileged-target error.
    pub fn privileged_target<T: ToString>(msg: T) -> Self {
        Self::PrivilegedTarget(msg.to_string())
    }

    /// Creates a new transient delivery error.
    pub fn transient_delivery<T: ToString>(msg: T) -> Self {
        Self::TransientDelivery(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Short machine-readable name of the error kind, used in API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::SelfReference(_) => "SelfReference",
            Self::Unauthenticated(_) => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::ActorBanned(_) => "ActorBanned",
            Self::NotFound(_) => "NotFound",
            Self::InvalidTransition(_) => "InvalidTransition",
            Self::PrivilegedTarget(_) => "PrivilegedTarget",
            Self::TransientDelivery(_) => "TransientDelivery",
            Self::Storage(_) => "Storage",
            Self::Serialization(_) => "Serialization",
            Self::Config(_) => "Config",
            Self::Io(_) => "Io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(MurmurError::privileged_target("admin").kind(), "PrivilegedTarget");
        assert_eq!(MurmurError::invalid_transition("x").kind(), "InvalidTransition");
        assert_eq!(MurmurError::self_reference("x").kind(), "SelfReference");
    }

    #[test]
    fn test_display_includes_message() {
        let err = MurmurError::not_found("Report 7");
        assert_eq!(err.to_string(), "Not found: Report 7");
    }
}
