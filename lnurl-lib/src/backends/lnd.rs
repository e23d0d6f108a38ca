//! LND REST backend.
//!
//! Drives an LND node over its REST API, authenticating with a macaroon.
//! Requires the `http-backend` feature for actual HTTP requests; without it
//! every operation reports an unsupported-capability failure.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
#[cfg(feature = "http-backend")]
use std::time::Duration;

use super::config::LndConfig;
use super::{CreatedInvoice, InvoiceOptions, InvoiceStatus, LightningBackend, OpenedChannel, PaidInvoice};
use crate::{LnurlError, Result};

/// LND REST API backend.
pub struct LndBackend {
    config: LndConfig,
    #[cfg(feature = "http-backend")]
    client: reqwest::Client,
}

impl LndBackend {
    /// Create a new LND backend with the given configuration.
    ///
    /// Required options are checked here, before any network activity.
    #[cfg(feature = "http-backend")]
    pub fn new(config: LndConfig) -> Result<Self> {
        Self::check_config(&config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LnurlError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create a new LND backend with the given configuration (stub when the
    /// feature is disabled).
    #[cfg(not(feature = "http-backend"))]
    pub fn new(config: LndConfig) -> Result<Self> {
        Self::check_config(&config)?;
        Ok(Self { config })
    }

    fn check_config(config: &LndConfig) -> Result<()> {
        if config.rest_url.is_empty() {
            return Err(LnurlError::Configuration(
                "lnd: rest_url cannot be empty".to_string(),
            ));
        }
        if config.macaroon_hex.is_empty() {
            return Err(LnurlError::Configuration(
                "lnd: macaroon_hex cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configuration.
    pub fn config(&self) -> &LndConfig {
        &self.config
    }

    /// Build the full URL for an API endpoint.
    #[cfg(any(feature = "http-backend", test))]
    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.rest_url.trim_end_matches('/'), path)
    }

    /// Make an authenticated GET request.
    #[cfg(feature = "http-backend")]
    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .header("Grpc-Metadata-macaroon", &self.config.macaroon_hex)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        self.handle_response(response).await
    }

    /// Make an authenticated GET request (stub when the feature is disabled).
    #[cfg(not(feature = "http-backend"))]
    async fn get<T: for<'de> Deserialize<'de>>(&self, _path: &str) -> Result<T> {
        Err(LnurlError::Unsupported(
            "lnd HTTP client (enable the 'http-backend' feature)",
        ))
    }

    /// Make an authenticated POST request.
    #[cfg(feature = "http-backend")]
    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .header("Grpc-Metadata-macaroon", &self.config.macaroon_hex)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;
        self.handle_response(response).await
    }

    /// Make an authenticated POST request (stub when the feature is disabled).
    #[cfg(not(feature = "http-backend"))]
    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        _path: &str,
        _body: &B,
    ) -> Result<T> {
        Err(LnurlError::Unsupported(
            "lnd HTTP client (enable the 'http-backend' feature)",
        ))
    }

    #[cfg(feature = "http-backend")]
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LnurlError::backend(
                "lnd",
                format!("request failed ({}): {}", status.as_u16(), body),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| LnurlError::backend("lnd", format!("malformed response: {}", e)))
    }

    #[cfg(feature = "http-backend")]
    fn map_reqwest_error(&self, e: reqwest::Error) -> LnurlError {
        if e.is_timeout() {
            LnurlError::backend(
                "lnd",
                format!("request timed out after {}s", self.config.timeout_secs),
            )
        } else {
            LnurlError::backend("lnd", e.to_string())
        }
    }
}

#[async_trait]
impl LightningBackend for LndBackend {
    fn name(&self) -> &str {
        "lnd"
    }

    async fn get_node_uri(&self) -> Result<String> {
        let info: LndGetInfoResponse = self.get("getinfo").await?;
        info.uris
            .into_iter()
            .next()
            .or({
                if info.identity_pubkey.is_empty() {
                    None
                } else {
                    Some(info.identity_pubkey)
                }
            })
            .ok_or_else(|| LnurlError::backend("lnd", "node reported no URI"))
    }

    async fn open_channel(
        &self,
        peer_id: &str,
        local_amt: u64,
        push_amt: u64,
        private: bool,
    ) -> Result<OpenedChannel> {
        let request = LndOpenChannelRequest {
            node_pubkey_string: peer_id.to_string(),
            local_funding_amount: local_amt.to_string(),
            push_sat: push_amt.to_string(),
            private,
        };
        let response: LndChannelPoint = self.post("channels", &request).await?;
        Ok(OpenedChannel {
            funding_txid: if response.funding_txid_str.is_empty() {
                None
            } else {
                Some(response.funding_txid_str)
            },
        })
    }

    async fn pay_invoice(&self, invoice: &str) -> Result<PaidInvoice> {
        let request = LndSendPaymentRequest {
            payment_request: invoice.to_string(),
        };
        let response: LndSendPaymentResponse = self.post("channels/transactions", &request).await?;
        if !response.payment_error.is_empty() {
            return Err(LnurlError::backend("lnd", response.payment_error));
        }
        Ok(PaidInvoice {
            id: response.payment_hash,
        })
    }

    async fn add_invoice(
        &self,
        amount_msat: u64,
        options: &InvoiceOptions,
    ) -> Result<CreatedInvoice> {
        // LND expects the description hash as base64-encoded bytes.
        let description_hash = match &options.description_hash {
            Some(hash_hex) => {
                let bytes = hex::decode(hash_hex).map_err(|_| {
                    LnurlError::Validation("description hash must be hex-encoded".to_string())
                })?;
                Some(BASE64.encode(bytes))
            }
            None => None,
        };
        let request = LndAddInvoiceRequest {
            value_msat: amount_msat.to_string(),
            memo: options.description.clone(),
            description_hash,
        };
        let response: LndAddInvoiceResponse = self.post("invoices", &request).await?;
        let id = BASE64
            .decode(&response.r_hash)
            .map(hex::encode)
            .unwrap_or(response.r_hash);
        Ok(CreatedInvoice {
            id,
            invoice: response.payment_request,
        })
    }

    async fn get_invoice_status(&self, payment_hash: &str) -> Result<InvoiceStatus> {
        let response: LndInvoice = self.get(&format!("invoice/{}", payment_hash)).await?;
        let preimage = if response.r_preimage.is_empty() {
            None
        } else {
            Some(
                BASE64
                    .decode(&response.r_preimage)
                    .map(hex::encode)
                    .unwrap_or(response.r_preimage),
            )
        };
        Ok(InvoiceStatus {
            preimage,
            settled: response.settled,
        })
    }
}

// LND REST API types

#[derive(Deserialize)]
struct LndGetInfoResponse {
    #[serde(default)]
    uris: Vec<String>,
    #[serde(default)]
    identity_pubkey: String,
}

#[derive(Serialize)]
struct LndOpenChannelRequest {
    node_pubkey_string: String,
    local_funding_amount: String,
    push_sat: String,
    private: bool,
}

#[derive(Deserialize)]
struct LndChannelPoint {
    #[serde(default)]
    funding_txid_str: String,
}

#[derive(Serialize)]
struct LndSendPaymentRequest {
    payment_request: String,
}

#[derive(Deserialize)]
struct LndSendPaymentResponse {
    #[serde(default)]
    payment_error: String,
    #[serde(default)]
    payment_hash: String,
}

#[derive(Serialize)]
struct LndAddInvoiceRequest {
    value_msat: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description_hash: Option<String>,
}

#[derive(Deserialize)]
struct LndAddInvoiceResponse {
    #[serde(default)]
    r_hash: String,
    #[serde(default)]
    payment_request: String,
}

#[derive(Deserialize)]
struct LndInvoice {
    #[serde(default)]
    r_preimage: String,
    #[serde(default)]
    settled: bool,
}
