//! withdrawRequest: the service pays an invoice presented by the wallet.

use async_trait::async_trait;
use lightning_invoice::Bolt11Invoice;
use serde_json::{json, Value};

use super::{coerce_u64, require_str, require_u64, RequestContext, Subprotocol};
use crate::hooks::HookContext;
use crate::{LnurlError, Params, Result, Tag};

/// The withdrawRequest subprotocol.
pub struct WithdrawRequest;

#[async_trait]
impl Subprotocol for WithdrawRequest {
    fn tag(&self) -> Tag {
        Tag::withdraw_request()
    }

    fn coerce_params(&self, params: &mut Params) {
        coerce_u64(params, "minWithdrawable");
        coerce_u64(params, "maxWithdrawable");
    }

    fn action_params(&self) -> &'static [&'static str] {
        &["pr"]
    }

    async fn validate(&self, params: &Params, ctx: &RequestContext) -> Result<()> {
        let min = require_u64(params, "minWithdrawable")?;
        let max = require_u64(params, "maxWithdrawable")?;
        if min == 0 {
            return Err(LnurlError::validation(
                "minWithdrawable must be greater than zero",
            ));
        }
        if max < min {
            return Err(LnurlError::validation(
                "maxWithdrawable must be greater than or equal to minWithdrawable",
            ));
        }
        // Required even when empty; wallets display it.
        require_str(params, "defaultDescription")?;
        ctx.hooks
            .run(
                "withdrawRequest:validate",
                &HookContext::for_tag(self.tag(), params.clone()),
            )
            .await
    }

    async fn info(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "withdrawRequest:info",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;
        Ok(json!({
            "tag": self.tag(),
            "callback": ctx.callback_url,
            "k1": secret,
            "minWithdrawable": require_u64(params, "minWithdrawable")?,
            "maxWithdrawable": require_u64(params, "maxWithdrawable")?,
            "defaultDescription": require_str(params, "defaultDescription")?,
        }))
    }

    async fn action(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "withdrawRequest:action",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;

        let pr = require_str(params, "pr")?;
        if pr.contains(',') {
            return Err(LnurlError::validation(
                "multiple payment requests are not supported",
            ));
        }
        let invoice: Bolt11Invoice = pr
            .parse()
            .map_err(|_| LnurlError::validation("pr is not a valid bolt11 invoice"))?;
        let amount_msat = invoice
            .amount_milli_satoshis()
            .ok_or_else(|| LnurlError::validation("pr must specify an amount"))?;

        let min = require_u64(params, "minWithdrawable")?;
        let max = require_u64(params, "maxWithdrawable")?;
        if amount_msat < min || amount_msat > max {
            return Err(LnurlError::validation(
                "invoice amount is outside the withdrawable range",
            ));
        }

        let backend = ctx.backend()?;
        let payment = backend.pay_invoice(pr).await?;
        tracing::info!(amount_msat, payment_id = %payment.id, "withdraw invoice paid");
        Ok(json!({ "status": "OK" }))
    }
}
