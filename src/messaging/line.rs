use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use crate::config::LineConfig;
use crate::error::MessagingError;
use crate::messaging::{Messenger, ReplyMessage};

/// LINE Messaging API reply client.
pub struct LineMessenger {
    client: reqwest::Client,
    reply_url: String,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: &'a [ReplyMessage],
}

impl LineMessenger {
    pub fn new(config: &LineConfig) -> Result<Self, Report<MessagingError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.reply_timeout_secs))
            .build()
            .change_context(MessagingError::Reply)?;
        Ok(Self {
            client,
            reply_url: format!(
                "{}/v2/bot/message/reply",
                config.api_base.trim_end_matches('/')
            ),
            access_token: config.channel_access_token.clone(),
        })
    }
}

impl Messenger for LineMessenger {
    fn reply(
        &self,
        reply_token: &str,
        messages: Vec<ReplyMessage>,
    ) -> BoxFuture<'_, Result<(), Report<MessagingError>>> {
        let reply_token = reply_token.to_owned();
        Box::pin(async move {
            let body = ReplyRequest {
                reply_token: &reply_token,
                messages: &messages,
            };

            let response = self
                .client
                .post(&self.reply_url)
                .bearer_auth(&self.access_token)
                .json(&body)
                .send()
                .await
                .change_context(MessagingError::Reply)?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(Report::new(MessagingError::Rejected)
                    .attach(format!("HTTP status: {status}"))
                    .attach(format!("body: {detail}")));
            }

            debug!(messages = messages.len(), "reply sent");
            Ok(())
        })
    }
}
