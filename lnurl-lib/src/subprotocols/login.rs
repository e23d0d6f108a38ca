//! login: passwordless authentication by signing the k1 challenge.
//!
//! The wallet signs the 32-byte challenge (the URL's secret) with its linking
//! key and presents the DER signature plus the compressed public key. There is
//! no info phase and no Lightning operation; a verified signature emits a
//! "login" event carrying the key so the host application can establish its
//! session.

use async_trait::async_trait;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use serde_json::{json, Value};

use super::{require_str, RequestContext, Subprotocol};
use crate::hooks::HookContext;
use crate::{LnurlError, Params, Result, Tag};

/// The login subprotocol.
pub struct Login;

#[async_trait]
impl Subprotocol for Login {
    fn tag(&self) -> Tag {
        Tag::login()
    }

    fn action_params(&self) -> &'static [&'static str] {
        &["sig", "key"]
    }

    async fn validate(&self, params: &Params, ctx: &RequestContext) -> Result<()> {
        ctx.hooks
            .run(
                "login:validate",
                &HookContext::for_tag(self.tag(), params.clone()),
            )
            .await
    }

    async fn info(&self, _secret: &str, _params: &Params, _ctx: &RequestContext) -> Result<Value> {
        Err(LnurlError::validation(
            "login does not support an info request",
        ))
    }

    async fn action(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "login:action",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;

        let sig = require_str(params, "sig")?;
        let key = require_str(params, "key")?;

        let challenge = hex::decode(secret)
            .map_err(|_| LnurlError::validation("k1 must be hex-encoded"))?;
        let message = Message::from_digest_slice(&challenge)
            .map_err(|_| LnurlError::validation("k1 must be 32 bytes"))?;
        let signature = hex::decode(sig)
            .ok()
            .and_then(|der| Signature::from_der(&der).ok())
            .ok_or_else(|| LnurlError::validation("sig must be a hex-encoded DER signature"))?;
        let public_key = hex::decode(key)
            .ok()
            .and_then(|bytes| PublicKey::from_slice(&bytes).ok())
            .ok_or_else(|| LnurlError::validation("key must be a hex-encoded public key"))?;

        let secp = Secp256k1::verification_only();
        secp.verify_ecdsa(&message, &signature, &public_key)
            .map_err(|_| LnurlError::validation("signature verification failed"))?;

        tracing::info!(key, "login verified");
        let mut event = HookContext::for_secret(self.tag(), secret, params.clone());
        event.params.insert("key".into(), json!(key));
        ctx.hooks.emit("login", &event).await;

        Ok(json!({ "status": "OK" }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use secp256k1::SecretKey;

    use super::*;
    use crate::hooks::HookPipeline;
    use crate::params_from;

    fn ctx() -> RequestContext {
        RequestContext {
            hooks: Arc::new(HookPipeline::new()),
            backend: None,
            callback_url: "https://example.com/lnurl".to_string(),
        }
    }

    /// A valid (k1, sig, key) triple signed with a fixed linking key.
    fn signed_challenge() -> (String, String, String) {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);

        let k1 = [0x07u8; 32];
        let message = Message::from_digest_slice(&k1).unwrap();
        let signature = secp.sign_ecdsa(&message, &secret_key);

        (
            hex::encode(k1),
            hex::encode(signature.serialize_der()),
            hex::encode(public_key.serialize()),
        )
    }

    #[tokio::test]
    async fn test_info_is_rejected() {
        let err = Login.info("k1", &Params::new(), &ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "login does not support an info request");
    }

    #[tokio::test]
    async fn test_action_verifies_signature_and_emits_event() {
        let (k1, sig, key) = signed_challenge();
        let ctx = ctx();
        let logins = Arc::new(AtomicUsize::new(0));
        let counter = logins.clone();
        ctx.hooks.register("login", move |event: &HookContext| {
            assert!(event.params.get("key").is_some());
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let params = params_from([
            ("sig", serde_json::json!(sig)),
            ("key", serde_json::json!(key)),
        ]);
        let result = Login.action(&k1, &params, &ctx).await.unwrap();
        assert_eq!(result["status"], "OK");
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_action_rejects_wrong_key() {
        let (k1, sig, _) = signed_challenge();
        let secp = Secp256k1::new();
        let other = PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[0x43; 32]).unwrap());

        let params = params_from([
            ("sig", serde_json::json!(sig)),
            ("key", serde_json::json!(hex::encode(other.serialize()))),
        ]);
        let err = Login.action(&k1, &params, &ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "signature verification failed");
    }

    #[tokio::test]
    async fn test_action_rejects_wrong_challenge() {
        let (_, sig, key) = signed_challenge();
        let params = params_from([
            ("sig", serde_json::json!(sig)),
            ("key", serde_json::json!(key)),
        ]);
        let other_k1 = hex::encode([0x08u8; 32]);
        let err = Login.action(&other_k1, &params, &ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "signature verification failed");
    }

    #[tokio::test]
    async fn test_action_rejects_malformed_input() {
        let (k1, _, key) = signed_challenge();
        let params = params_from([
            ("sig", serde_json::json!("zz")),
            ("key", serde_json::json!(key)),
        ]);
        assert!(Login.action(&k1, &params, &ctx()).await.is_err());

        let params = params_from([("key", serde_json::json!(key))]);
        assert!(Login.action(&k1, &params, &ctx()).await.is_err());
    }
}
