//! Hook pipeline.
//!
//! Ordered, cancelable extension points invoked around protocol phases. Hooks
//! are registered against fixed names ("payRequest:action", "url:signed",
//! "status", ...) and run sequentially in registration order; the first failure
//! aborts the remaining hooks in that chain and its message becomes the
//! user-visible error. Already-completed chains are never rolled back.
//!
//! Registration is expected to happen at startup, before steady-state traffic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{Params, Result, Tag};

/// Phase-specific arguments handed to every hook in a chain.
#[derive(Clone, Debug, Default)]
pub struct HookContext {
    /// The subprotocol in play, when known.
    pub tag: Option<Tag>,
    /// The secret being resolved, for resolution-phase hooks.
    pub secret: Option<String>,
    /// The API key that authorized the request, for signed-creation hooks.
    pub api_key_id: Option<String>,
    /// Phase parameters (creation params, action params, or signed query).
    pub params: Params,
}

impl HookContext {
    /// Context for a creation/validation phase.
    pub fn for_tag(tag: Tag, params: Params) -> Self {
        Self {
            tag: Some(tag),
            params,
            ..Default::default()
        }
    }

    /// Context for a resolution phase keyed by secret.
    pub fn for_secret(tag: Tag, secret: impl Into<String>, params: Params) -> Self {
        Self {
            tag: Some(tag),
            secret: Some(secret.into()),
            params,
            ..Default::default()
        }
    }
}

/// A single extension point callback.
///
/// Plain closures of type `Fn(&HookContext) -> Result<()>` implement this
/// automatically; implement the trait directly when the hook needs to await.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run the hook. Returning an error aborts the rest of the chain.
    async fn call(&self, ctx: &HookContext) -> Result<()>;
}

#[async_trait]
impl<F> Hook for F
where
    F: Fn(&HookContext) -> Result<()> + Send + Sync,
{
    async fn call(&self, ctx: &HookContext) -> Result<()> {
        self(ctx)
    }
}

/// Ordered lists of hooks per named extension point.
#[derive(Default)]
pub struct HookPipeline {
    chains: RwLock<HashMap<String, Vec<Arc<dyn Hook>>>>,
}

impl HookPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook at the end of the named chain.
    pub fn register<H: Hook + 'static>(&self, name: impl Into<String>, hook: H) {
        let mut chains = self.chains.write().unwrap_or_else(|e| e.into_inner());
        chains.entry(name.into()).or_default().push(Arc::new(hook));
    }

    /// Number of hooks registered for a name.
    pub fn count(&self, name: &str) -> usize {
        let chains = self.chains.read().unwrap_or_else(|e| e.into_inner());
        chains.get(name).map(Vec::len).unwrap_or(0)
    }

    /// Run the named chain, aborting on the first failure.
    pub async fn run(&self, name: &str, ctx: &HookContext) -> Result<()> {
        for (index, hook) in self.chain(name).iter().enumerate() {
            if let Err(err) = hook.call(ctx).await {
                tracing::debug!(hook = name, index, error = %err, "hook chain aborted");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Notify the named chain, running every hook regardless of failures.
    ///
    /// Used for events ("<tag>:action:processed", "login", ...); a failing
    /// listener is logged, never surfaced.
    pub async fn emit(&self, name: &str, ctx: &HookContext) {
        for (index, hook) in self.chain(name).iter().enumerate() {
            if let Err(err) = hook.call(ctx).await {
                tracing::warn!(event = name, index, error = %err, "event listener failed");
            }
        }
    }

    fn chain(&self, name: &str) -> Vec<Arc<dyn Hook>> {
        let chains = self.chains.read().unwrap_or_else(|e| e.into_inner());
        chains.get(name).cloned().unwrap_or_default()
    }
}
