//! Error types for the licensing module.

use std::path::PathBuf;
use thiserror::Error;

/// Licensing-specific errors.
///
/// Callers are expected to treat every variant the same way (deny use); the
/// variants exist so the reason can be logged precisely.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The armored container or the license text is not well formed.
    #[error("malformed license document: {0}")]
    MalformedDocument(String),

    /// The signature does not match the normalized text under the trusted key.
    #[error("license signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// A required property is missing or cannot be parsed.
    #[error("invalid license field {field}: {reason}")]
    InvalidField {
        /// Property name, e.g. `Order`.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The verification server rejected the license or could not be reached.
    #[error("remote license verification failed: {0}")]
    RemoteVerificationFailed(String),

    /// The license file could not be read.
    #[error("license file missing: {path}: {reason}")]
    FileMissing {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The license is authentic but past its Valid-Until date.
    #[error("license expired: {0}")]
    Expired(String),

    /// The revalidation cache store could not be opened.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LicenseError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
