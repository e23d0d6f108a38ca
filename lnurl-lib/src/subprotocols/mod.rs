//! Subprotocol state machine.
//!
//! Each LNURL tag is a [`Subprotocol`]: parameter validation at creation time,
//! an `info` phase answering the wallet's first GET, and an `action` phase
//! performing the Lightning operation. Implementations are looked up through a
//! string-keyed [`SubprotocolRegistry`] so integrators can register custom
//! tags alongside the four built-ins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::LightningBackend;
use crate::hooks::HookPipeline;
use crate::{LnurlError, Params, Result, Tag};

pub mod channel;
pub mod login;
pub mod pay;
pub mod withdraw;

pub use channel::ChannelRequest;
pub use login::Login;
pub use pay::PayRequest;
pub use withdraw::WithdrawRequest;

/// Per-request dependencies handed to every subprotocol phase.
#[derive(Clone)]
pub struct RequestContext {
    /// Hook pipeline for the engine this request runs in.
    pub hooks: Arc<HookPipeline>,
    /// The Lightning backend serving this request, if one is configured.
    pub backend: Option<Arc<dyn LightningBackend>>,
    /// Absolute URL wallets should call back, without query string.
    pub callback_url: String,
}

impl RequestContext {
    /// The backend, or a configuration error if none is wired up.
    pub fn backend(&self) -> Result<&Arc<dyn LightningBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| LnurlError::Configuration("no lightning backend configured".into()))
    }
}

/// One LNURL subprotocol: validation, info phase, action phase.
#[async_trait]
pub trait Subprotocol: Send + Sync {
    /// The tag this subprotocol serves.
    fn tag(&self) -> Tag;

    /// Convert string-typed query parameters into their natural JSON types.
    ///
    /// Signed queries arrive with every value as a string; this runs before
    /// validation so numeric fields validate as numbers. Unknown or already
    /// typed values are left alone.
    fn coerce_params(&self, _params: &mut Params) {}

    /// Parameter names the wallet may supply on the action callback.
    ///
    /// Everything else in the caller's query is dropped before the stored
    /// creation parameters are merged in, so policy fields the creator
    /// omitted (commentAllowed, successAction, amount bounds) can never be
    /// injected at action time.
    fn action_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// Check creation parameters. Rejection here means no record is stored.
    async fn validate(&self, params: &Params, ctx: &RequestContext) -> Result<()>;

    /// Answer the wallet's first GET for a resolved URL.
    async fn info(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value>;

    /// Perform the subprotocol's Lightning operation.
    async fn action(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value>;
}

/// String-keyed registry of subprotocols.
pub struct SubprotocolRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Subprotocol>>>,
}

impl SubprotocolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the four built-in subprotocols.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(ChannelRequest);
        registry.register(PayRequest);
        registry.register(WithdrawRequest);
        registry.register(Login);
        registry
    }

    /// Register a subprotocol under its tag, replacing any existing one.
    pub fn register<S: Subprotocol + 'static>(&self, subprotocol: S) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(subprotocol.tag().0.clone(), Arc::new(subprotocol));
    }

    /// Look up a subprotocol by tag.
    pub fn get(&self, tag: &Tag) -> Option<Arc<dyn Subprotocol>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(tag.as_str()).cloned()
    }

    /// Look up a subprotocol, rejecting unknown tags as caller input.
    pub fn get_required(&self, tag: &Tag) -> Result<Arc<dyn Subprotocol>> {
        self.get(tag)
            .ok_or_else(|| LnurlError::validation(format!("unknown subprotocol: {}", tag)))
    }

    /// Registered tags, unordered.
    pub fn tags(&self) -> Vec<Tag> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().map(|k| Tag::new(k.clone())).collect()
    }
}

impl Default for SubprotocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Shared parameter accessors. Protocol amounts are u64 millisatoshis/satoshis;
// JSON floats and negatives are rejected rather than truncated.

pub(crate) fn require_u64(params: &Params, key: &str) -> Result<u64> {
    optional_u64(params, key)?
        .ok_or_else(|| LnurlError::validation(format!("missing required parameter: {}", key)))
}

pub(crate) fn optional_u64(params: &Params, key: &str) -> Result<Option<u64>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| {
                LnurlError::validation(format!("{} must be a non-negative integer", key))
            })
            .map(Some),
    }
}

pub(crate) fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(LnurlError::validation(format!("{} must be a string", key))),
        None => Err(LnurlError::validation(format!(
            "missing required parameter: {}",
            key
        ))),
    }
}

/// Accepts JSON booleans and the string/numeric spellings queries use.
pub(crate) fn optional_flag(params: &Params, key: &str) -> Result<bool> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_u64() == Some(1)),
        Some(Value::String(s)) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(LnurlError::validation(format!("{} must be a boolean", key))),
        },
        Some(_) => Err(LnurlError::validation(format!("{} must be a boolean", key))),
    }
}

/// Rewrite a string-typed numeric parameter as a JSON number, in place.
///
/// Leaves the value untouched if it is absent, already a number, or not
/// parseable; validation reports the latter with a proper message.
pub(crate) fn coerce_u64(params: &mut Params, key: &str) {
    if let Some(Value::String(s)) = params.get(key) {
        if let Ok(n) = s.parse::<u64>() {
            params.insert(key.to_string(), Value::from(n));
        }
    }
}
