//! Error types for the datamover operator.

use thiserror::Error;

/// Errors that can occur while reconciling datamover sessions.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The session spec failed validation. Maps to the terminal
    /// `ValidationFailed` progress when hit during the initial transition.
    #[error("Session validation failed: {0}")]
    Validation(String),

    /// The session resource itself is unusable (for example not namespaced
    /// or missing its uid).
    #[error("Invalid session {name}: {reason}")]
    InvalidSession {
        /// Session name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// More than one pod matched a session that must own at most one.
    #[error("Found multiple pods for session {0}")]
    MultiplePods(String),

    /// A child resource exists under the expected name but belongs to
    /// someone else. Never adopted.
    #[error("{kind} {name} does not match owner reference of session {session}")]
    ForeignResource {
        /// Kind of the colliding resource.
        kind: String,
        /// Name of the colliding resource.
        name: String,
        /// Session that expected to own it.
        session: String,
    },

    /// Observed cluster state contradicts the session's reported progress.
    #[error("Invalid state for session {name}: {reason}")]
    InvariantViolation {
        /// Session name.
        name: String,
        /// The contradiction.
        reason: String,
    },

    /// The session reached a terminal failure while a client was waiting
    /// for it to become ready.
    #[error("Session {0} terminated before becoming ready")]
    SessionTerminated(String),

    /// A client gave up waiting for the session to become ready.
    #[error("Timeout waiting for session {0} to be ready")]
    WaitTimeout(String),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;
