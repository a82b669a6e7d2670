use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::NarrativeError;
use crate::model::{IndicatorSnapshot, TimeFrame};

/// Replied in place of a summary when the language model cannot be reached.
pub const UNAVAILABLE_NOTICE: &str =
    "(analysis unavailable: check the language model API key or quota)";

const SYSTEM_PROMPT: &str = "You are a quantitative trading assistant. Describe only the market \
context and its risks. Never give investment advice or entry and exit instructions.";

/// Turns indicator readings into a short natural-language risk summary.
pub trait Narrator: Send + Sync {
    fn summarize(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        snapshot: &IndicatorSnapshot,
    ) -> BoxFuture<'_, Result<String, Report<NarrativeError>>>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiNarrator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiNarrator {
    pub fn new(config: &LlmConfig) -> Result<Self, Report<NarrativeError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .change_context(NarrativeError::Request)?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Narrator for OpenAiNarrator {
    fn summarize(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        snapshot: &IndicatorSnapshot,
    ) -> BoxFuture<'_, Result<String, Report<NarrativeError>>> {
        let prompt = user_prompt(symbol, timeframe, snapshot);
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.model,
                temperature: self.temperature,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: &prompt,
                    },
                ],
            };

            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .change_context(NarrativeError::Request)
                .attach_with(|| format!("url: {}", self.url))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(NarrativeError::Request)
                    .attach(format!("HTTP status: {status}")));
            }

            let body: ChatResponse = response
                .json()
                .await
                .change_context(NarrativeError::Response)?;

            let text = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .map(|content| content.trim().to_owned())
                .filter(|content| !content.is_empty())
                .ok_or_else(|| Report::new(NarrativeError::Response).attach("no message content"))?;

            debug!(model = %self.model, chars = text.len(), "summary received");
            Ok(text)
        })
    }
}

fn user_prompt(symbol: &str, timeframe: TimeFrame, snapshot: &IndicatorSnapshot) -> String {
    format!(
        "In at most 5 lines, describe the state and risks of this coin \
         on the {timeframe} timeframe (no entry or exit instructions).\n\
         symbol: {symbol}\n\
         close: {}\n\
         ema20: {}\n\
         ema50: {}\n\
         rsi: {}\n",
        fmt_reading(snapshot.close, 4),
        fmt_reading(snapshot.ema20, 4),
        fmt_reading(snapshot.ema50, 4),
        fmt_reading(snapshot.rsi14, 1),
    )
}

/// Fixed-precision number, or `n/a` when unavailable.
pub fn fmt_reading(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "n/a".to_owned(),
    }
}
