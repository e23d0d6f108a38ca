//! LNURL server engine.
//!
//! This crate implements the server side of the LNURL protocol: the signed-query
//! codec that lets remote operators authorize URL creation, the URL lifecycle with
//! limited-use enforcement, the per-tag subprotocol state machine, and the
//! capability contract that drives any Lightning node implementation uniformly.
//!
//! The HTTP transport is intentionally out of scope: callers wire
//! [`LnurlEngine`](engine::LnurlEngine) into whatever routing layer they run and
//! translate [`LnurlError`](errors::LnurlError) into `{status:"ERROR", reason}`
//! responses via [`LnurlError::to_response`](errors::LnurlError::to_response).
//!
//! # Example
//!
//! ```ignore
//! use lnurl_lib::{engine::{EngineOptions, LnurlEngine}, store::memory::MemoryStore, Tag};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let engine = LnurlEngine::new(EngineOptions::new("https://example.com"), store);
//!
//! // let created = engine.generate_url(Tag::withdraw_request(), params, Default::default()).await?;
//! // let info = engine.resolve_info(&created.secret).await?;
//! ```

pub mod apikey;
pub mod backends;
pub mod codec;
pub mod engine;
pub mod errors;
pub mod hooks;
pub mod lifecycle;
pub mod readiness;
pub mod store;
pub mod subprotocols;

pub use apikey::{ApiKey, ApiKeyRegistry, SecretEncoding};
pub use errors::LnurlError;

/// Common result alias for LNURL operations.
pub type Result<T> = std::result::Result<T, LnurlError>;

/// Subprotocol parameters as an ordered JSON object.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Identifier for an LNURL subprotocol.
///
/// The four protocol tags are built in, but the engine's subprotocol registry is
/// keyed by tag string so integrators can register their own.
///
/// # Example
///
/// ```
/// use lnurl_lib::Tag;
///
/// let tag: Tag = "withdrawRequest".into();
/// assert_eq!(tag, Tag::withdraw_request());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tag(pub String);

impl Tag {
    /// Create a new tag from a string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Get the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Well-known tag for channel open requests.
    pub const CHANNEL_REQUEST: &'static str = "channelRequest";

    /// Well-known tag for pay requests.
    pub const PAY_REQUEST: &'static str = "payRequest";

    /// Well-known tag for withdraw requests.
    pub const WITHDRAW_REQUEST: &'static str = "withdrawRequest";

    /// Well-known tag for passwordless login.
    pub const LOGIN: &'static str = "login";

    /// Create the channelRequest tag.
    pub fn channel_request() -> Self {
        Self::new(Self::CHANNEL_REQUEST)
    }

    /// Create the payRequest tag.
    pub fn pay_request() -> Self {
        Self::new(Self::PAY_REQUEST)
    }

    /// Create the withdrawRequest tag.
    pub fn withdraw_request() -> Self {
        Self::new(Self::WITHDRAW_REQUEST)
    }

    /// Create the login tag.
    pub fn login() -> Self {
        Self::new(Self::LOGIN)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a [`Params`] map from key/value pairs.
///
/// Convenience for tests and call sites that assemble creation parameters by hand.
pub fn params_from<I, K>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
