//! URL lifecycle.
//!
//! Owns the path from secret to stored record: generating unique secrets,
//! validating creation parameters through the tag's subprotocol, writing the
//! record keyed by the secret's hash, resolving incoming secrets back to
//! records, and the consume/compensate pair around limited-use enforcement.

use std::sync::Arc;

use rand::RngCore;

use crate::codec;
use crate::store::{CreateOptions, CreateOutcome, SecretStore, UrlRecord};
use crate::subprotocols::{RequestContext, SubprotocolRegistry};
use crate::{LnurlError, Params, Result, Tag};

/// How many random secrets are drawn before giving up on a collision streak.
pub const DEFAULT_SECRET_ATTEMPTS: u32 = 5;

/// Options for creating a URL.
#[derive(Clone, Debug)]
pub struct CreateUrlOptions {
    /// The API key that authorized creation, if the URL was created remotely.
    pub api_key_id: Option<String>,
    /// Use limit; 0 means unlimited.
    pub uses: u32,
    /// Treat an existing record for the same hash as success.
    ///
    /// Signed creation is idempotent per (key, signature); retries must not
    /// surface a duplicate error.
    pub tolerate_existing: bool,
}

impl Default for CreateUrlOptions {
    fn default() -> Self {
        Self {
            api_key_id: None,
            uses: 1,
            tolerate_existing: false,
        }
    }
}

/// Creation, resolution and use accounting for URL records.
pub struct UrlLifecycle {
    store: Arc<dyn SecretStore>,
    subprotocols: Arc<SubprotocolRegistry>,
}

impl UrlLifecycle {
    /// Create a lifecycle over a store and subprotocol registry.
    pub fn new(store: Arc<dyn SecretStore>, subprotocols: Arc<SubprotocolRegistry>) -> Self {
        Self {
            store,
            subprotocols,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// Draw a fresh 32-byte random secret whose hash is not yet stored.
    pub async fn generate_secret(&self) -> Result<String> {
        for _ in 0..DEFAULT_SECRET_ATTEMPTS {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            let secret = hex::encode(bytes);
            if !self.store.exists(&codec::hash(&secret)).await? {
                return Ok(secret);
            }
            tracing::warn!("generated secret collided with an existing record");
        }
        Err(LnurlError::SecretExhaustion {
            attempts: DEFAULT_SECRET_ATTEMPTS,
        })
    }

    /// Validate parameters for `tag` and store a record under `secret`'s hash.
    ///
    /// The secret itself never reaches the store. An existing record is an
    /// error unless `tolerate_existing` is set.
    pub async fn create_url(
        &self,
        secret: &str,
        tag: &Tag,
        params: &Params,
        ctx: &RequestContext,
        options: &CreateUrlOptions,
    ) -> Result<()> {
        let subprotocol = self.subprotocols.get_required(tag)?;
        subprotocol.validate(params, ctx).await?;

        let hash = codec::hash(secret);
        let create = CreateOptions {
            api_key_id: options.api_key_id.clone(),
            uses: options.uses,
        };
        match self.store.create(&hash, tag, params, &create).await? {
            CreateOutcome::Created => {
                tracing::debug!(%tag, uses = options.uses, "url record created");
                Ok(())
            }
            CreateOutcome::AlreadyExists if options.tolerate_existing => {
                tracing::debug!(%tag, "url record already exists, treating as success");
                Ok(())
            }
            CreateOutcome::AlreadyExists => Err(LnurlError::DuplicateSecret),
        }
    }

    /// Resolve a presented secret to its record.
    pub async fn resolve(&self, secret: &str) -> Result<UrlRecord> {
        self.store
            .fetch(&codec::hash(secret))
            .await?
            .ok_or(LnurlError::UnknownSecret)
    }

    /// Consume one use for `hash`, failing if none remain.
    pub async fn consume_use(&self, hash: &str) -> Result<()> {
        if self.store.use_once(hash).await? {
            Ok(())
        } else {
            Err(LnurlError::UsesExhausted)
        }
    }

    /// Return one use after a downstream failure. Best effort: a failing store
    /// is logged, never surfaced, so the original error stays primary.
    pub async fn compensate_use(&self, hash: &str) -> bool {
        match self.store.unuse(hash).await {
            Ok(restored) => restored,
            Err(err) => {
                tracing::warn!(hash, error = %err, "failed to return use after action failure");
                false
            }
        }
    }
}

/// Derive the secret for a signed creation request.
///
/// Deterministic per (key id, signature), which is what makes retried signed
/// requests land on the same record.
pub fn derive_signed_secret(api_key_id: &str, signature: &str) -> String {
    codec::hash(&format!("{}-{}", api_key_id, signature))
}
