//! Error types for LNURL operations.
//!
//! Every caller-visible failure carries a classification and a user-facing
//! message only; internal detail (which authentication check failed, the
//! backend's raw error) belongs in logs, not in responses.

use serde_json::json;

/// Comprehensive error type for LNURL operations.
#[derive(Debug, thiserror::Error)]
pub enum LnurlError {
    /// Malformed or out-of-range protocol parameters. Always attributable to
    /// caller input and never retried.
    #[error("{0}")]
    Validation(String),

    /// Signature mismatch, unknown API key, or missing signed-query field.
    ///
    /// The display form is deliberately generic; `reason` records which check
    /// failed and is only ever logged.
    #[error("invalid API key signature")]
    Authentication {
        /// Internal reason, for logs.
        reason: String,
    },

    /// No URL record exists for the presented secret.
    #[error("invalid secret")]
    UnknownSecret,

    /// The URL's use limit has been reached.
    #[error("maximum number of uses already reached")]
    UsesExhausted,

    /// A record for this hash already exists.
    #[error("duplicate secret")]
    DuplicateSecret,

    /// The Lightning operation itself failed.
    #[error("{backend} backend failure: {reason}")]
    Backend {
        /// Backend name (e.g. "lnd").
        backend: String,
        /// Originating error message.
        reason: String,
    },

    /// Secret generation kept colliding and gave up. Fatal for the request,
    /// not for the process.
    #[error("failed to generate a unique secret after {attempts} attempts")]
    SecretExhaustion {
        /// How many attempts were made.
        attempts: u32,
    },

    /// Missing or invalid construction-time option. Raised before serving
    /// traffic; fatal to startup, not per-request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store failed an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The backend does not implement an optional capability.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// The engine has not finished (or failed) initialization.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal/unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LnurlError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authentication error with an internal reason.
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is attributable to caller input (HTTP 400-class).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Authentication { .. }
                | Self::UnknownSecret
                | Self::UsesExhausted
                | Self::DuplicateSecret
        )
    }

    /// The user-facing reason string.
    ///
    /// Backend errors expose only the backend name, never the raw message.
    pub fn reason(&self) -> String {
        match self {
            Self::Backend { backend, .. } => {
                format!("{} backend failed to complete the operation", backend)
            }
            other => other.to_string(),
        }
    }

    /// Render the protocol-standard error response object.
    ///
    /// ```
    /// use lnurl_lib::LnurlError;
    ///
    /// let body = LnurlError::UnknownSecret.to_response();
    /// assert_eq!(body["status"], "ERROR");
    /// assert_eq!(body["reason"], "invalid secret");
    /// ```
    pub fn to_response(&self) -> serde_json::Value {
        json!({
            "status": "ERROR",
            "reason": self.reason(),
        })
    }
}

impl From<serde_json::Error> for LnurlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed JSON: {}", err))
    }
}
