//! Configuration types for Lightning backends.

use serde::{Deserialize, Serialize};

/// Configuration for the LND REST backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LndConfig {
    /// REST API endpoint URL (e.g., "https://localhost:8080").
    pub rest_url: String,

    /// Macaroon for authentication (hex-encoded).
    pub macaroon_hex: String,

    /// TLS certificate (PEM format, optional for self-signed).
    pub tls_cert_pem: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl LndConfig {
    /// Create a new LND configuration.
    pub fn new(rest_url: impl Into<String>, macaroon_hex: impl Into<String>) -> Self {
        Self {
            rest_url: rest_url.into(),
            macaroon_hex: macaroon_hex.into(),
            tls_cert_pem: None,
            timeout_secs: default_timeout(),
        }
    }

    /// Set the TLS certificate.
    pub fn with_tls_cert(mut self, cert_pem: impl Into<String>) -> Self {
        self.tls_cert_pem = Some(cert_pem.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// A backend selection by registry name plus its backend-specific options.
///
/// API keys may carry one of these to route their URLs to a different
/// Lightning node than the engine default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registry name of the backend ("lnd" is built in).
    pub backend: String,

    /// Backend-specific options, parsed by the backend's factory.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl BackendConfig {
    /// Create a config for a named backend.
    pub fn new(backend: impl Into<String>, options: serde_json::Value) -> Self {
        Self {
            backend: backend.into(),
            options,
        }
    }

    /// Create an LND backend config.
    pub fn lnd(config: LndConfig) -> Self {
        Self {
            backend: "lnd".to_string(),
            options: serde_json::to_value(config)
                .expect("LndConfig is plain data and serializes to JSON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lnd_config_builder() {
        let config = LndConfig::new("https://localhost:8080", "0201...").with_timeout(60);
        assert_eq!(config.rest_url, "https://localhost:8080");
        assert_eq!(config.timeout_secs, 60);
        assert!(config.tls_cert_pem.is_none());
    }

    #[test]
    fn test_backend_config_roundtrip() {
        let config = BackendConfig::lnd(LndConfig::new("https://localhost:8080", "abcd"));
        assert_eq!(config.backend, "lnd");
        let parsed: LndConfig = serde_json::from_value(config.options).unwrap();
        assert_eq!(parsed.macaroon_hex, "abcd");
        assert_eq!(parsed.timeout_secs, 30);
    }
}
