//! payRequest: the service issues an invoice for the wallet to pay.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{coerce_u64, optional_u64, require_str, require_u64, RequestContext, Subprotocol};
use crate::backends::InvoiceOptions;
use crate::hooks::HookContext;
use crate::{codec, LnurlError, Params, Result, Tag};

/// Upper bound a service may advertise for comment length.
const MAX_COMMENT_ALLOWED: u64 = 1000;

/// The payRequest subprotocol.
pub struct PayRequest;

impl PayRequest {
    /// Parse and check the metadata parameter: a JSON-encoded array of
    /// `[mime, value]` entries with exactly one `text/plain` entry.
    fn checked_metadata<'a>(params: &'a Params) -> Result<&'a str> {
        let raw = require_str(params, "metadata")?;
        let entries: Vec<Value> = serde_json::from_str(raw)
            .map_err(|_| LnurlError::validation("metadata must be a JSON-encoded array"))?;
        let mut text_plain = 0usize;
        for entry in &entries {
            let pair = entry
                .as_array()
                .filter(|pair| pair.len() == 2 && pair[0].is_string() && pair[1].is_string())
                .ok_or_else(|| {
                    LnurlError::validation("metadata entries must be [type, value] string pairs")
                })?;
            if pair[0].as_str() == Some("text/plain") {
                text_plain += 1;
            }
        }
        if text_plain != 1 {
            return Err(LnurlError::validation(
                "metadata must contain exactly one text/plain entry",
            ));
        }
        Ok(raw)
    }

    /// Parse and check the optional successAction parameter.
    ///
    /// Accepts an object or its JSON-encoded string form (signed queries carry
    /// every value as a string).
    fn checked_success_action(params: &Params) -> Result<Option<Value>> {
        let value = match params.get("successAction") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .map_err(|_| LnurlError::validation("successAction must be a JSON object"))?,
            Some(other) => other.clone(),
        };
        let object = value
            .as_object()
            .ok_or_else(|| LnurlError::validation("successAction must be a JSON object"))?;
        match object.get("tag").and_then(Value::as_str) {
            Some("message") => {
                if !object.get("message").map(Value::is_string).unwrap_or(false) {
                    return Err(LnurlError::validation(
                        "successAction of type message requires a message string",
                    ));
                }
            }
            Some("url") => {
                if !object.get("url").map(Value::is_string).unwrap_or(false) {
                    return Err(LnurlError::validation(
                        "successAction of type url requires a url string",
                    ));
                }
                if let Some(description) = object.get("description") {
                    if !description.is_string() {
                        return Err(LnurlError::validation(
                            "successAction description must be a string",
                        ));
                    }
                }
            }
            _ => {
                return Err(LnurlError::validation(
                    "successAction tag must be message or url",
                ))
            }
        }
        Ok(Some(value))
    }
}

#[async_trait]
impl Subprotocol for PayRequest {
    fn tag(&self) -> Tag {
        Tag::pay_request()
    }

    fn coerce_params(&self, params: &mut Params) {
        coerce_u64(params, "minSendable");
        coerce_u64(params, "maxSendable");
        coerce_u64(params, "commentAllowed");
    }

    fn action_params(&self) -> &'static [&'static str] {
        &["amount", "comment"]
    }

    async fn validate(&self, params: &Params, ctx: &RequestContext) -> Result<()> {
        let min = require_u64(params, "minSendable")?;
        let max = require_u64(params, "maxSendable")?;
        if min == 0 {
            return Err(LnurlError::validation("minSendable must be greater than zero"));
        }
        if max < min {
            return Err(LnurlError::validation(
                "maxSendable must be greater than or equal to minSendable",
            ));
        }
        Self::checked_metadata(params)?;
        if let Some(comment_allowed) = optional_u64(params, "commentAllowed")? {
            if comment_allowed > MAX_COMMENT_ALLOWED {
                return Err(LnurlError::validation(format!(
                    "commentAllowed must not exceed {}",
                    MAX_COMMENT_ALLOWED
                )));
            }
        }
        Self::checked_success_action(params)?;
        ctx.hooks
            .run(
                "payRequest:validate",
                &HookContext::for_tag(self.tag(), params.clone()),
            )
            .await
    }

    async fn info(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "payRequest:info",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;
        // payRequest callbacks carry the secret as a query parameter rather
        // than a path segment.
        let mut info = json!({
            "callback": format!("{}?q={}", ctx.callback_url, secret),
            "minSendable": require_u64(params, "minSendable")?,
            "maxSendable": require_u64(params, "maxSendable")?,
            "metadata": require_str(params, "metadata")?,
            "tag": self.tag(),
        });
        if let Some(comment_allowed) = optional_u64(params, "commentAllowed")? {
            info["commentAllowed"] = json!(comment_allowed);
        }
        Ok(info)
    }

    async fn action(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "payRequest:action",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;

        let amount_msat = require_u64(params, "amount")?;
        let min = require_u64(params, "minSendable")?;
        let max = require_u64(params, "maxSendable")?;
        if amount_msat < min || amount_msat > max {
            return Err(LnurlError::validation(
                "amount is outside the sendable range",
            ));
        }

        if let Some(Value::String(comment)) = params.get("comment") {
            let allowed = optional_u64(params, "commentAllowed")?.unwrap_or(0);
            if comment.chars().count() as u64 > allowed {
                return Err(LnurlError::validation(format!(
                    "comment length exceeds the allowed maximum of {}",
                    allowed
                )));
            }
        }

        let metadata = Self::checked_metadata(params)?;
        let options = InvoiceOptions {
            description: None,
            // Wallets verify the invoice commits to the advertised metadata.
            description_hash: Some(codec::hash(metadata)),
        };
        let backend = ctx.backend()?;
        let created = backend.add_invoice(amount_msat, &options).await?;
        tracing::info!(amount_msat, invoice_id = %created.id, "pay invoice issued");

        let mut response = json!({
            "pr": created.invoice,
            "routes": [],
        });
        if let Some(success_action) = Self::checked_success_action(params)? {
            response["successAction"] = success_action;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backends::{
        CreatedInvoice, LightningBackend, OpenedChannel, PaidInvoice,
    };
    use crate::hooks::HookPipeline;
    use crate::params_from;
    use serde_json::json;

    struct IssuingBackend;

    #[async_trait]
    impl LightningBackend for IssuingBackend {
        fn name(&self) -> &str {
            "issuing"
        }
        async fn get_node_uri(&self) -> Result<String> {
            unreachable!()
        }
        async fn open_channel(&self, _: &str, _: u64, _: u64, _: bool) -> Result<OpenedChannel> {
            unreachable!()
        }
        async fn pay_invoice(&self, _: &str) -> Result<PaidInvoice> {
            unreachable!()
        }
        async fn add_invoice(
            &self,
            amount_msat: u64,
            options: &InvoiceOptions,
        ) -> Result<CreatedInvoice> {
            assert!(options.description_hash.is_some());
            Ok(CreatedInvoice {
                id: "hash".into(),
                invoice: format!("lnbc-test-{}", amount_msat),
            })
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            hooks: Arc::new(HookPipeline::new()),
            backend: Some(Arc::new(IssuingBackend)),
            callback_url: "https://example.com/lnurl".to_string(),
        }
    }

    fn params() -> Params {
        params_from([
            ("minSendable", json!(1000)),
            ("maxSendable", json!(5000)),
            ("metadata", json!("[[\"text/plain\",\"coffee\"]]")),
        ])
    }

    #[tokio::test]
    async fn test_validate_metadata() {
        let ctx = ctx();
        PayRequest.validate(&params(), &ctx).await.unwrap();

        let mut empty = params();
        empty.insert("metadata".into(), json!("[]"));
        let err = PayRequest.validate(&empty, &ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "metadata must contain exactly one text/plain entry"
        );

        let mut double = params();
        double.insert(
            "metadata".into(),
            json!("[[\"text/plain\",\"a\"],[\"text/plain\",\"b\"]]"),
        );
        assert!(PayRequest.validate(&double, &ctx).await.is_err());

        let mut garbage = params();
        garbage.insert("metadata".into(), json!("not json"));
        assert!(PayRequest.validate(&garbage, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_comment_allowed_cap() {
        let ctx = ctx();
        let mut p = params();
        p.insert("commentAllowed".into(), json!(1000));
        PayRequest.validate(&p, &ctx).await.unwrap();
        p.insert("commentAllowed".into(), json!(1001));
        assert!(PayRequest.validate(&p, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_success_action() {
        let ctx = ctx();
        let mut p = params();
        p.insert(
            "successAction".into(),
            json!({"tag": "message", "message": "thanks"}),
        );
        PayRequest.validate(&p, &ctx).await.unwrap();

        // JSON-encoded string form, as it arrives in signed queries.
        p.insert(
            "successAction".into(),
            json!("{\"tag\":\"url\",\"url\":\"https://example.com\",\"description\":\"receipt\"}"),
        );
        PayRequest.validate(&p, &ctx).await.unwrap();

        p.insert("successAction".into(), json!({"tag": "message"}));
        assert!(PayRequest.validate(&p, &ctx).await.is_err());

        p.insert("successAction".into(), json!({"tag": "aes"}));
        assert!(PayRequest.validate(&p, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_info_shape() {
        let info = PayRequest.info("k1value", &params(), &ctx()).await.unwrap();
        assert_eq!(info["callback"], "https://example.com/lnurl?q=k1value");
        assert_eq!(info["minSendable"], 1000);
        assert_eq!(info["maxSendable"], 5000);
        assert_eq!(info["tag"], "payRequest");
        assert_eq!(info["metadata"], "[[\"text/plain\",\"coffee\"]]");
        assert!(info.get("commentAllowed").is_none());
    }

    #[tokio::test]
    async fn test_action_issues_invoice_within_bounds() {
        let ctx = ctx();
        let mut p = params();
        p.insert("amount".into(), json!(2000));
        let response = PayRequest.action("k1", &p, &ctx).await.unwrap();
        assert_eq!(response["pr"], "lnbc-test-2000");
        assert_eq!(response["routes"], json!([]));
        assert!(response.get("successAction").is_none());

        p.insert("amount".into(), json!(500));
        assert!(PayRequest.action("k1", &p, &ctx).await.is_err());
        p.insert("amount".into(), json!(9000));
        assert!(PayRequest.action("k1", &p, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_action_rejects_unsolicited_comment() {
        let ctx = ctx();
        let mut p = params();
        p.insert("amount".into(), json!(2000));
        p.insert("comment".into(), json!("hi"));
        // No commentAllowed at creation means comments are rejected.
        let err = PayRequest.action("k1", &p, &ctx).await.unwrap_err();
        assert!(matches!(err, LnurlError::Validation(_)));

        p.insert("commentAllowed".into(), json!(10));
        PayRequest.action("k1", &p, &ctx).await.unwrap();

        p.insert("comment".into(), json!("a".repeat(11)));
        assert!(PayRequest.action("k1", &p, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_action_returns_success_action() {
        let ctx = ctx();
        let mut p = params();
        p.insert("amount".into(), json!(2000));
        p.insert(
            "successAction".into(),
            json!({"tag": "message", "message": "thanks"}),
        );
        let response = PayRequest.action("k1", &p, &ctx).await.unwrap();
        assert_eq!(response["successAction"]["message"], "thanks");
    }
}
