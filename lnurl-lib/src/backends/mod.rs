//! Lightning backend capability contract.
//!
//! The engine drives any Lightning node implementation through the
//! [`LightningBackend`] trait. `get_invoice_status` is an optional capability:
//! the default implementation reports a typed "unsupported" failure rather
//! than crashing, and callers must tolerate it.
//!
//! Backends are constructed through a string-keyed [`BackendRegistry`] so a
//! deployment can select its node software by configuration, and so each API
//! key can carry its own backend override.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{LnurlError, Result};

pub mod config;
pub mod lnd;

pub use config::{BackendConfig, LndConfig};
pub use lnd::LndBackend;

/// Result of opening a channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenedChannel {
    /// Funding transaction id, when the backend reports one.
    pub funding_txid: Option<String>,
}

/// Result of paying an invoice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaidInvoice {
    /// Backend identifier for the payment (typically the payment hash).
    pub id: String,
}

/// Result of creating an invoice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatedInvoice {
    /// Backend identifier for the invoice (typically the payment hash).
    pub id: String,
    /// The bolt11 payment request.
    pub invoice: String,
}

/// Status of a created invoice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvoiceStatus {
    /// Payment preimage, once settled.
    pub preimage: Option<String>,
    /// Whether the invoice has been paid.
    pub settled: bool,
}

/// Options for creating an invoice.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InvoiceOptions {
    /// Plain-text description.
    pub description: Option<String>,
    /// SHA-256 of the description, hex-encoded (LNURL-pay uses this).
    pub description_hash: Option<String>,
}

/// Uniform operations against a Lightning node.
#[async_trait]
pub trait LightningBackend: Send + Sync {
    /// The backend's registry name, used in error reports.
    fn name(&self) -> &str;

    /// The node's public URI (`pubkey@host:port`).
    async fn get_node_uri(&self) -> Result<String>;

    /// Open a channel to `peer_id` funding `local_amt` sats and pushing
    /// `push_amt` sats to the peer.
    async fn open_channel(
        &self,
        peer_id: &str,
        local_amt: u64,
        push_amt: u64,
        private: bool,
    ) -> Result<OpenedChannel>;

    /// Pay a bolt11 invoice.
    async fn pay_invoice(&self, invoice: &str) -> Result<PaidInvoice>;

    /// Create a bolt11 invoice for `amount_msat`.
    async fn add_invoice(&self, amount_msat: u64, options: &InvoiceOptions)
        -> Result<CreatedInvoice>;

    /// Look up the status of a created invoice. Optional capability.
    async fn get_invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatus> {
        tracing::debug!(
            backend = self.name(),
            payment_hash,
            "get_invoice_status not supported by this backend"
        );
        Err(LnurlError::Unsupported("get_invoice_status"))
    }
}

/// Factory building a backend from its JSON options.
pub type BackendFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn LightningBackend>> + Send + Sync>;

/// String-keyed registry of backend factories.
///
/// Built-ins are registered at startup; applications can register their own
/// node integrations and select them by name in [`BackendConfig`].
pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry with the built-in backends.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("lnd", |options: &serde_json::Value| {
            let config: LndConfig = serde_json::from_value(options.clone())
                .map_err(|e| LnurlError::Configuration(format!("invalid lnd options: {}", e)))?;
            Ok(Arc::new(LndBackend::new(config)?) as Arc<dyn LightningBackend>)
        });
        registry
    }

    /// Registers a backend factory under a name, replacing any existing one.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn LightningBackend>> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.insert(name.into(), Arc::new(factory));
    }

    /// Checks if a backend name is registered.
    pub fn has(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.contains_key(name)
    }

    /// Constructs a backend from a configuration.
    ///
    /// Construction happens before any network activity; missing required
    /// options fail fast here.
    pub fn construct(&self, config: &BackendConfig) -> Result<Arc<dyn LightningBackend>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
            factories.get(&config.backend).cloned()
        };
        let factory = factory.ok_or_else(|| {
            LnurlError::Configuration(format!("unknown lightning backend: {}", config.backend))
        })?;
        factory(&config.options)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
