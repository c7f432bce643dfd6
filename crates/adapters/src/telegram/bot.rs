//! Telegram Bot API publisher

use async_trait::async_trait;
use autopost_domain::{OutgoingPost, PublishError, PublishReceipt, Publisher};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the Bot API
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Target chat: `@channelname` or a numeric id
    pub channel_id: String,
    pub api_base_url: String,
    /// `HTML`, `MarkdownV2` or `Markdown`; plain text when unset
    pub parse_mode: Option<String>,
    pub disable_link_preview: bool,
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            parse_mode: None,
            disable_link_preview: false,
            timeout_secs: 30,
        }
    }
}

/// Publishes posts to a Telegram channel through a bot
pub struct TelegramPublisher {
    client: Client,
    bot_token: SecretString,
    config: TelegramConfig,
    enabled: bool,
}

impl TelegramPublisher {
    pub fn new(bot_token: SecretString, config: TelegramConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            bot_token,
            config: TelegramConfig {
                api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
                ..config
            },
            enabled: true,
        }
    }

    /// Create a disabled publisher (for testing/dry-run)
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            bot_token: SecretString::new("".into()),
            config: TelegramConfig::default(),
            enabled: false,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url,
            self.bot_token.expose_secret(),
            method
        )
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<String, PublishError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            // The request URL carries the bot token
            .map_err(|e| PublishError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let reply: BotResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Api(format!("HTTP {}: {}", status, e.without_url())))?;

        if reply.ok {
            return reply
                .result
                .map(|message| message.message_id.to_string())
                .ok_or_else(|| PublishError::Api("Response without a message".to_string()));
        }

        let description = reply
            .description
            .unwrap_or_else(|| format!("HTTP {}", status));

        Err(match reply.error_code.unwrap_or(status.as_u16()) {
            401 | 403 => PublishError::Auth(description),
            429 => PublishError::RateLimited(
                reply
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
            ),
            _ => PublishError::Api(description),
        })
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishReceipt, PublishError> {
        if !self.enabled {
            return Err(PublishError::Disabled);
        }

        let parse_mode = self.config.parse_mode.as_deref();

        let message_id = match post.image_url.as_deref() {
            Some(photo) => {
                let request = SendPhotoRequest {
                    chat_id: &self.config.channel_id,
                    photo,
                    caption: &post.text,
                    parse_mode,
                };
                self.call("sendPhoto", &request).await?
            }
            None => {
                let request = SendMessageRequest {
                    chat_id: &self.config.channel_id,
                    text: &post.text,
                    parse_mode,
                    disable_web_page_preview: self.config.disable_link_preview,
                };
                self.call("sendMessage", &request).await?
            }
        };

        Ok(PublishReceipt { message_id })
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn platform(&self) -> &'static str {
        "telegram"
    }
}
