//! The LNURL engine.
//!
//! Ties the pieces together: URL creation (local and signed-remote), secret
//! resolution into the info and action phases, per-key backend routing, and
//! the startup readiness gate. The engine is transport-agnostic; an HTTP layer
//! feeds it parsed queries and renders its `serde_json::Value` responses.

use std::sync::Arc;

use serde_json::Value;

use crate::apikey::ApiKeyRegistry;
use crate::backends::{BackendRegistry, LightningBackend};
use crate::codec::{self, Query, SignatureAlgorithm};
use crate::hooks::{Hook, HookContext, HookPipeline};
use crate::lifecycle::{derive_signed_secret, CreateUrlOptions, UrlLifecycle};
use crate::readiness::ReadinessGate;
use crate::store::SecretStore;
use crate::subprotocols::{RequestContext, SubprotocolRegistry};
use crate::{LnurlError, Params, Result, Tag};

/// Engine construction options.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Public base URL of the host application (scheme + authority).
    pub url: String,
    /// Path the LNURL endpoint is mounted at.
    pub endpoint: String,
}

impl EngineOptions {
    /// Options for a host at `url` with the default `/lnurl` endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            endpoint: "/lnurl".to_string(),
        }
    }

    /// Mount the endpoint at a different path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The absolute callback URL, without query string.
    pub fn callback_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.endpoint)
    }
}

/// A freshly created URL and the secret embedded in it.
#[derive(Clone, Debug, PartialEq)]
pub struct NewUrl {
    /// The full URL a wallet should fetch.
    pub url: String,
    /// The secret (k1) the URL resolves by.
    pub secret: String,
}

/// The transport-agnostic LNURL server engine.
pub struct LnurlEngine {
    options: EngineOptions,
    lifecycle: UrlLifecycle,
    subprotocols: Arc<SubprotocolRegistry>,
    hooks: Arc<HookPipeline>,
    backends: BackendRegistry,
    api_keys: ApiKeyRegistry,
    default_backend: Option<Arc<dyn LightningBackend>>,
    readiness: ReadinessGate,
    signature_algorithm: SignatureAlgorithm,
}

impl LnurlEngine {
    /// Create an engine over a store, ready to serve immediately.
    pub fn new(options: EngineOptions, store: Arc<dyn SecretStore>) -> Self {
        let subprotocols = Arc::new(SubprotocolRegistry::with_defaults());
        Self {
            options,
            lifecycle: UrlLifecycle::new(store, subprotocols.clone()),
            subprotocols,
            hooks: Arc::new(HookPipeline::new()),
            backends: BackendRegistry::with_defaults(),
            api_keys: ApiKeyRegistry::new(),
            default_backend: None,
            readiness: ReadinessGate::ready(),
            signature_algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Set the default Lightning backend.
    pub fn with_backend(mut self, backend: Arc<dyn LightningBackend>) -> Self {
        self.default_backend = Some(backend);
        self
    }

    /// Set the API keys accepted for signed creation.
    pub fn with_api_keys(mut self, api_keys: ApiKeyRegistry) -> Self {
        self.api_keys = api_keys;
        self
    }

    /// Set the signature algorithm accepted for signed queries.
    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Hold protocol traffic until [`mark_ready`](Self::mark_ready) is called.
    ///
    /// For hosts whose store or backend initializes asynchronously; requests
    /// arriving in the meantime park and are released in arrival order.
    pub fn with_deferred_readiness(mut self) -> Self {
        self.readiness = ReadinessGate::pending();
        self
    }

    /// Release parked requests; initialization has succeeded.
    pub fn mark_ready(&self) {
        self.readiness.set_ready();
    }

    /// Fail parked and future requests; initialization has failed.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.readiness.set_failed(reason);
    }

    /// Whether the engine is serving traffic.
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Register a hook on a named chain.
    pub fn register_hook<H: Hook + 'static>(&self, name: impl Into<String>, hook: H) {
        self.hooks.register(name, hook);
    }

    /// The subprotocol registry, for registering custom tags.
    pub fn subprotocols(&self) -> &SubprotocolRegistry {
        &self.subprotocols
    }

    /// The backend factory registry, for registering custom node integrations.
    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// The engine's construction options.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn context(&self, api_key_id: Option<&str>) -> RequestContext {
        let backend = api_key_id
            .and_then(|id| self.api_keys.get(id))
            .and_then(|key| key.backend())
            .or_else(|| self.default_backend.clone());
        RequestContext {
            hooks: self.hooks.clone(),
            backend,
            callback_url: self.options.callback_url(),
        }
    }

    fn url_for(&self, secret: &str) -> String {
        format!("{}?q={}", self.options.callback_url(), secret)
    }

    /// Create a URL with a freshly generated random secret.
    pub async fn generate_url(
        &self,
        tag: Tag,
        params: Params,
        options: CreateUrlOptions,
    ) -> Result<NewUrl> {
        self.readiness.wait().await?;
        let secret = self.lifecycle.generate_secret().await?;
        let ctx = self.context(options.api_key_id.as_deref());
        self.lifecycle
            .create_url(&secret, &tag, &params, &ctx, &options)
            .await?;
        Ok(NewUrl {
            url: self.url_for(&secret),
            secret,
        })
    }

    /// Create a URL under a caller-provided secret.
    ///
    /// Login flows need this: the host application issues the k1 challenge
    /// itself and registers it here before showing the QR code.
    pub async fn create_url(
        &self,
        secret: &str,
        tag: Tag,
        params: Params,
        options: CreateUrlOptions,
    ) -> Result<NewUrl> {
        self.readiness.wait().await?;
        let ctx = self.context(options.api_key_id.as_deref());
        self.lifecycle
            .create_url(secret, &tag, &params, &ctx, &options)
            .await?;
        Ok(NewUrl {
            url: self.url_for(secret),
            secret: secret.to_string(),
        })
    }

    /// Handle a signed (remote) URL-creation query.
    ///
    /// Accepts both full-form and shortened queries. The derived secret is
    /// deterministic per (key, signature), so retries of the same signed query
    /// return the same URL rather than a duplicate error.
    pub async fn handle_signed_request(&self, query: &Query) -> Result<NewUrl> {
        self.readiness.wait().await?;
        let query = codec::unshorten(query);

        let id = signed_field(&query, "id")?;
        signed_field(&query, "nonce")?;
        let tag = Tag::new(signed_field(&query, "tag")?);
        let signature = signed_field(&query, "signature")?.to_string();

        let api_key = self
            .api_keys
            .get(id)
            .ok_or_else(|| LnurlError::authentication(format!("unknown API key: {}", id)))?;
        if !codec::verify(&query, api_key.secret(), self.signature_algorithm) {
            return Err(LnurlError::authentication(format!(
                "signature mismatch for API key: {}",
                id
            )));
        }

        let uses = match codec::get(&query, "uses") {
            None => 1,
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| LnurlError::validation("uses must be a non-negative integer"))?,
        };

        let mut params: Params = query
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "id" | "nonce" | "tag" | "signature" | "uses"))
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect();
        self.subprotocols
            .get_required(&tag)?
            .coerce_params(&mut params);

        let mut hook_ctx = HookContext::for_tag(tag.clone(), params.clone());
        hook_ctx.api_key_id = Some(api_key.id().to_string());
        self.hooks.run("url:signed", &hook_ctx).await?;

        let secret = derive_signed_secret(api_key.id(), &signature);
        let options = CreateUrlOptions {
            api_key_id: Some(api_key.id().to_string()),
            uses,
            tolerate_existing: true,
        };
        let ctx = self.context(Some(api_key.id()));
        self.lifecycle
            .create_url(&secret, &tag, &params, &ctx, &options)
            .await?;
        tracing::debug!(api_key = api_key.id(), %tag, uses, "signed url created");
        Ok(NewUrl {
            url: self.url_for(&secret),
            secret,
        })
    }

    /// Resolve a secret into its subprotocol's info response.
    pub async fn resolve_info(&self, secret: &str) -> Result<Value> {
        self.readiness.wait().await?;
        let record = self.lifecycle.resolve(secret).await?;
        let subprotocol = self.subprotocols.get_required(&record.tag)?;
        let ctx = self.context(record.api_key_id.as_deref());

        self.hooks
            .run(
                "status",
                &HookContext::for_secret(record.tag.clone(), secret, record.params.clone()),
            )
            .await?;
        subprotocol.info(secret, &record.params, &ctx).await
    }

    /// Resolve a secret and perform its action with the caller's parameters.
    ///
    /// Consumes one use before acting; a failed action returns the use and the
    /// original error stays primary. Only the tag's callback parameters are
    /// accepted from the caller, and stored creation parameters always win
    /// over caller-supplied values of the same name.
    pub async fn resolve_action(&self, secret: &str, caller_params: Params) -> Result<Value> {
        self.readiness.wait().await?;
        let record = self.lifecycle.resolve(secret).await?;
        let subprotocol = self.subprotocols.get_required(&record.tag)?;
        let ctx = self.context(record.api_key_id.as_deref());

        // Only the tag's designated callback fields are taken from the
        // caller; everything else (including any creation-time policy field
        // the creator omitted) comes from the stored record alone.
        let allowed = subprotocol.action_params();
        let mut params: Params = caller_params
            .into_iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .collect();
        for (key, value) in &record.params {
            params.insert(key.clone(), value.clone());
        }

        self.hooks
            .run(
                "status",
                &HookContext::for_secret(record.tag.clone(), secret, params.clone()),
            )
            .await?;

        self.lifecycle.consume_use(&record.hash).await?;
        let event = HookContext::for_secret(record.tag.clone(), secret, params.clone());
        match subprotocol.action(secret, &params, &ctx).await {
            Ok(response) => {
                self.hooks
                    .emit(&format!("{}:action:processed", record.tag), &event)
                    .await;
                Ok(response)
            }
            Err(err) => {
                self.lifecycle.compensate_use(&record.hash).await;
                self.hooks
                    .emit(&format!("{}:action:failed", record.tag), &event)
                    .await;
                Err(err)
            }
        }
    }

    /// Release the engine's store.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.store().close().await
    }
}

fn signed_field<'a>(query: &'a Query, key: &str) -> Result<&'a str> {
    codec::get(query, key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LnurlError::authentication(format!("missing signed query field: {}", key)))
}
