//! API keys for signed URL creation.
//!
//! Remote operators hold an `(id, secret)` pair; the id travels in the query,
//! the secret only ever signs it. Key secrets can be configured in hex, base64,
//! or raw UTF-8, and each key may carry its own Lightning backend so one
//! deployment can serve URLs against several nodes.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::backends::{BackendConfig, BackendRegistry, LightningBackend};
use crate::{LnurlError, Result};

/// How a configured key secret string is decoded into bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// Lowercase or uppercase hex.
    #[default]
    Hex,
    /// Standard base64 with padding.
    Base64,
    /// The string's UTF-8 bytes as-is.
    Utf8,
}

impl SecretEncoding {
    fn decode(&self, secret: &str) -> Result<Vec<u8>> {
        match self {
            Self::Hex => hex::decode(secret)
                .map_err(|_| LnurlError::Configuration("API key secret is not valid hex".into())),
            Self::Base64 => BASE64.decode(secret).map_err(|_| {
                LnurlError::Configuration("API key secret is not valid base64".into())
            }),
            Self::Utf8 => Ok(secret.as_bytes().to_vec()),
        }
    }
}

/// An API key as it appears in configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Public identifier, sent in signed queries.
    pub id: String,
    /// Signing secret, encoded per `encoding`.
    pub secret: String,
    /// How `secret` is encoded.
    #[serde(default)]
    pub encoding: SecretEncoding,
    /// Optional backend override for URLs created with this key.
    #[serde(default)]
    pub backend: Option<BackendConfig>,
}

/// A resolved API key: decoded secret bytes plus an optional backend override.
pub struct ApiKey {
    id: String,
    secret: Vec<u8>,
    backend: Option<Arc<dyn LightningBackend>>,
}

impl ApiKey {
    /// Create a key from raw secret bytes.
    pub fn new(id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            backend: None,
        }
    }

    /// Generate a fresh random key (8-byte hex id, 32-byte secret).
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut id = [0u8; 8];
        rng.fill_bytes(&mut id);
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::new(hex::encode(id), secret.to_vec())
    }

    /// Attach a backend override.
    pub fn with_backend(mut self, backend: Arc<dyn LightningBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// The public key id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The decoded signing secret.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// The key's backend override, if any.
    pub fn backend(&self) -> Option<Arc<dyn LightningBackend>> {
        self.backend.clone()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret must never reach logs.
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

/// Lookup table of API keys by id.
#[derive(Default)]
pub struct ApiKeyRegistry {
    keys: HashMap<String, Arc<ApiKey>>,
}

impl ApiKeyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, constructing backend overrides.
    ///
    /// Fails fast on a duplicate id, an undecodable secret, or an invalid
    /// backend configuration.
    pub fn from_configs(configs: &[ApiKeyConfig], backends: &BackendRegistry) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            if registry.keys.contains_key(&config.id) {
                return Err(LnurlError::Configuration(format!(
                    "duplicate API key id: {}",
                    config.id
                )));
            }
            let secret = config.encoding.decode(&config.secret)?;
            let mut key = ApiKey::new(config.id.clone(), secret);
            if let Some(backend_config) = &config.backend {
                key = key.with_backend(backends.construct(backend_config)?);
            }
            registry.insert(key);
        }
        Ok(registry)
    }

    /// Add a key, replacing any existing key with the same id.
    pub fn insert(&mut self, key: ApiKey) {
        self.keys.insert(key.id().to_string(), Arc::new(key));
    }

    /// Look up a key by id.
    pub fn get(&self, id: &str) -> Option<Arc<ApiKey>> {
        self.keys.get(id).cloned()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_encodings() {
        assert_eq!(SecretEncoding::Hex.decode("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(SecretEncoding::Base64.decode("3q2+7w==").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(SecretEncoding::Utf8.decode("abc").unwrap(), b"abc".to_vec());
        assert!(SecretEncoding::Hex.decode("not hex").is_err());
    }

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = ApiKey::generate();
        let b = ApiKey::generate();
        assert_eq!(a.id().len(), 16);
        assert_eq!(a.secret().len(), 32);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.secret(), b.secret());
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = ApiKey::new("k1", b"super-secret".to_vec());
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("k1"));
    }

    #[test]
    fn test_from_configs_rejects_duplicates() {
        let configs = vec![
            ApiKeyConfig {
                id: "dup".into(),
                secret: "aa".into(),
                encoding: SecretEncoding::Hex,
                backend: None,
            },
            ApiKeyConfig {
                id: "dup".into(),
                secret: "bb".into(),
                encoding: SecretEncoding::Hex,
                backend: None,
            },
        ];
        let err = ApiKeyRegistry::from_configs(&configs, &BackendRegistry::new())
            .err()
            .unwrap();
        assert!(matches!(err, LnurlError::Configuration(_)));
    }

    #[test]
    fn test_from_configs_builds_backend_override() {
        use crate::backends::{CreatedInvoice, InvoiceOptions, OpenedChannel, PaidInvoice};
        use async_trait::async_trait;

        struct NullBackend;

        #[async_trait]
        impl LightningBackend for NullBackend {
            fn name(&self) -> &str {
                "null"
            }
            async fn get_node_uri(&self) -> Result<String> {
                Ok(String::new())
            }
            async fn open_channel(
                &self,
                _: &str,
                _: u64,
                _: u64,
                _: bool,
            ) -> Result<OpenedChannel> {
                Ok(OpenedChannel { funding_txid: None })
            }
            async fn pay_invoice(&self, _: &str) -> Result<PaidInvoice> {
                Ok(PaidInvoice { id: String::new() })
            }
            async fn add_invoice(&self, _: u64, _: &InvoiceOptions) -> Result<CreatedInvoice> {
                Ok(CreatedInvoice {
                    id: String::new(),
                    invoice: String::new(),
                })
            }
        }

        let backends = BackendRegistry::new();
        backends.register("null", |_: &serde_json::Value| {
            Ok(Arc::new(NullBackend) as Arc<dyn LightningBackend>)
        });

        let configs = vec![ApiKeyConfig {
            id: "routed".into(),
            secret: "aabb".into(),
            encoding: SecretEncoding::Hex,
            backend: Some(BackendConfig::new("null", serde_json::Value::Null)),
        }];
        let registry = ApiKeyRegistry::from_configs(&configs, &backends).unwrap();
        let key = registry.get("routed").unwrap();
        assert_eq!(key.backend().unwrap().name(), "null");
        assert_eq!(key.secret(), &[0xaa, 0xbb]);
    }
}
