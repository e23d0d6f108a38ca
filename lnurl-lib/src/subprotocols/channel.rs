//! channelRequest: incoming channel opens.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{coerce_u64, optional_flag, require_str, require_u64, RequestContext, Subprotocol};
use crate::hooks::HookContext;
use crate::{LnurlError, Params, Result, Tag};

/// The channelRequest subprotocol.
pub struct ChannelRequest;

#[async_trait]
impl Subprotocol for ChannelRequest {
    fn tag(&self) -> Tag {
        Tag::channel_request()
    }

    fn coerce_params(&self, params: &mut Params) {
        coerce_u64(params, "localAmt");
        coerce_u64(params, "pushAmt");
    }

    fn action_params(&self) -> &'static [&'static str] {
        &["remoteid", "private"]
    }

    async fn validate(&self, params: &Params, ctx: &RequestContext) -> Result<()> {
        let local_amt = require_u64(params, "localAmt")?;
        let push_amt = require_u64(params, "pushAmt")?;
        if local_amt == 0 {
            return Err(LnurlError::validation("localAmt must be greater than zero"));
        }
        if push_amt > local_amt {
            return Err(LnurlError::validation(
                "pushAmt must be less than or equal to localAmt",
            ));
        }
        ctx.hooks
            .run(
                "channelRequest:validate",
                &HookContext::for_tag(self.tag(), params.clone()),
            )
            .await
    }

    async fn info(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "channelRequest:info",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;
        let uri = ctx.backend()?.get_node_uri().await?;
        Ok(json!({
            "uri": uri,
            "callback": ctx.callback_url,
            "k1": secret,
            "tag": self.tag(),
        }))
    }

    async fn action(&self, secret: &str, params: &Params, ctx: &RequestContext) -> Result<Value> {
        ctx.hooks
            .run(
                "channelRequest:action",
                &HookContext::for_secret(self.tag(), secret, params.clone()),
            )
            .await?;

        let remote_id = require_str(params, "remoteid")?;
        let private = optional_flag(params, "private")?;
        let local_amt = require_u64(params, "localAmt")?;
        let push_amt = require_u64(params, "pushAmt")?;

        let backend = ctx.backend()?;
        let channel = backend
            .open_channel(remote_id, local_amt, push_amt, private)
            .await?;
        tracing::info!(
            remote_id,
            local_amt,
            push_amt,
            private,
            funding_txid = ?channel.funding_txid,
            "channel open initiated"
        );
        Ok(json!({ "status": "OK" }))
    }
}
