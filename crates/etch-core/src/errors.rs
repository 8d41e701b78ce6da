//! Unified error system for the upload pipeline
//!
//! One error type covers every pipeline stage. Retryability is a property
//! of the variant, not of the call site, so the orchestrator and the retry
//! policy classify failures the same way everywhere.

use serde::{Deserialize, Serialize};

/// Funding verification failures that are worth retrying.
///
/// The relay reports a freshly-requested payment with these messages while
/// the payment is still settling. Any other verification failure is treated
/// as permanent.
const FUNDING_TRANSIENT_MARKERS: [&str; 2] =
    ["insufficient balance", "failed to fetch payment transaction"];

/// Unified error type for all pipeline operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum EtchError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Session establishment or renewal failed
    #[error("Session error: {message}")]
    Session {
        /// Error message describing the session failure
        message: String,
    },

    /// Funding request or verification failed
    #[error("Funding error: {message}")]
    Funding {
        /// Error message describing the funding failure
        message: String,
    },

    /// Reading the store failed (distinct from a definitive not-found)
    #[error("Read error: {message}")]
    Read {
        /// Error message describing the read failure
        message: String,
    },

    /// Batch or write submission failed
    #[error("Submit error: {message}")]
    Submit {
        /// Error message describing the submission failure
        message: String,
    },

    /// A submitted transaction failed to confirm
    #[error("Confirmation error: {message}")]
    Confirmation {
        /// Error message describing the confirmation failure
        message: String,
    },

    /// An operation exceeded its deadline
    #[error("Timeout: {message}")]
    Timeout {
        /// Error message describing what timed out
        message: String,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// The operation was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl EtchError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a session error
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a funding error
    pub fn funding(message: impl Into<String>) -> Self {
        Self::Funding {
            message: message.into(),
        }
    }

    /// Create a read error
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Create a submission error
    pub fn submit(message: impl Into<String>) -> Self {
        Self::Submit {
            message: message.into(),
        }
    }

    /// Create a confirmation error
    pub fn confirmation(message: impl Into<String>) -> Self {
        Self::Confirmation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a failed write carrying this error is worth resubmitting.
    ///
    /// Submission, confirmation, timeout, and transport failures are
    /// transient. Invalid input, session, funding, and read failures are
    /// not resolved by trying the same write again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Submit { .. }
                | Self::Confirmation { .. }
                | Self::Timeout { .. }
                | Self::Network { .. }
        )
    }

    /// Whether this is a funding verification failure that settles on its
    /// own, per the transient-marker allowlist.
    pub fn is_transient_funding(&self) -> bool {
        let message = match self {
            Self::Funding { message } | Self::Network { message } => message,
            _ => return false,
        };
        let lowered = message.to_lowercase();
        FUNDING_TRANSIENT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
    }
}

/// Standard Result type for pipeline operations
pub type Result<T> = std::result::Result<T, EtchError>;

// Conversion traits for common error types
impl From<std::io::Error> for EtchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(err.to_string()),
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::network(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for EtchError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::internal(err.to_string())
    }
}
