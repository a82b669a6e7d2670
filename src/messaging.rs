pub mod line;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use error_stack::Report;
use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::MessagingError;

type HmacSha256 = Hmac<Sha256>;

/// Longest text message the platform accepts, in characters.
pub const MAX_TEXT_CHARS: usize = 4999;

/// Check a webhook signature header: base64 HMAC-SHA256 of the raw body keyed
/// with the channel secret. Comparison is constant time.
pub fn verify_signature(channel_secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Inbound webhook payload.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookBody {
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub reply_token: Option<String>,
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl Event {
    /// Reply token and text of a text-message event; `None` for anything else.
    pub fn text_message(&self) -> Option<(&str, &str)> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message.as_ref().filter(|m| m.kind == "text")?;
        Some((self.reply_token.as_deref()?, message.text.as_deref()?))
    }
}

/// Outbound reply message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplyMessage {
    Text { text: String },
    Image {
        #[serde(rename = "originalContentUrl")]
        original_content_url: String,
        #[serde(rename = "previewImageUrl")]
        preview_image_url: String,
    },
}

impl ReplyMessage {
    /// Text message, truncated to `MAX_TEXT_CHARS`.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        let text = match text.char_indices().nth(MAX_TEXT_CHARS) {
            Some((cut, _)) => text[..cut].to_owned(),
            None => text,
        };
        Self::Text { text }
    }

    /// Image message using the same URL for the preview.
    pub fn image(url: impl Into<String>) -> Self {
        let url = url.into();
        Self::Image {
            original_content_url: url.clone(),
            preview_image_url: url,
        }
    }
}

/// Sink for replies to the messaging platform.
pub trait Messenger: Send + Sync {
    fn reply(
        &self,
        reply_token: &str,
        messages: Vec<ReplyMessage>,
    ) -> BoxFuture<'_, Result<(), Report<MessagingError>>>;
}
