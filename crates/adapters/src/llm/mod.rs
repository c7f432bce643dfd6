//! LLM provider adapters

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod stub;

pub use anthropic::AnthropicGenerator;
pub use ollama::OllamaGenerator;
pub use openai::OpenAiGenerator;
pub use stub::StubGenerator;

use std::future::Future;
use std::time::Duration;

use autopost_domain::{GenerateError, GenerateInput, PostStyle};
use serde::{Deserialize, Serialize};

/// Common LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Temperature (0.0-1.0)
    pub temperature: f64,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries on failure
    pub retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_output_tokens: 800,
            timeout_secs: 45,
            retries: 2,
        }
    }
}

/// System instructions shared by every provider
pub(crate) const SYSTEM_PROMPT: &str =
    "You write posts for a Telegram channel. Output only the post text.";

/// Build the post-writing prompt
pub fn build_post_prompt(input: &GenerateInput) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are the author of a Telegram channel about finance and business trends.\n",
    );
    prompt.push_str(&format!("Write in {}.\n", input.language));
    prompt.push_str(&format!("Topic: \"{}\"\n\n", input.hint.trim()));

    prompt.push_str("## Rules\n");
    let length_rule = match input.style {
        PostStyle::Brief => "A short note of 400-600 characters.",
        PostStyle::Analytical => "A mini analysis of 1000-1200 characters.",
        PostStyle::Mixed => {
            "Usually a short note of 400-600 characters; about one post in five may be a mini analysis of 1000-1200 characters."
        }
    };
    prompt.push_str(&format!("1) {}\n", length_rule));
    prompt.push_str("2) No hashtags. Emoji are fine in moderation.\n");
    prompt.push_str("3) Lively, smart, slightly sarcastic; never personal.\n");
    prompt.push_str("4) Where it fits, add a one or two sentence historical aside.\n");
    prompt.push_str("5) Do not repeat the topic as a headline; get straight to the point.\n");
    prompt.push_str("6) No calls to subscribe or other calls to action.\n");

    if let Some(max) = input.max_chars {
        prompt.push_str(&format!("7) Never exceed {} characters.\n", max));
    }

    prompt.push_str("\nReturn only the plain post text, without prefixes or labels.\n");

    prompt
}

/// Strip wrapping the model sometimes adds around the post
pub fn clean_post_text(response: &str) -> String {
    let mut text = response.trim();

    if let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        // Drop a language tag on the opening fence
        text = match inner.find('\n') {
            Some(newline) if !inner[..newline].contains(' ') => &inner[newline + 1..],
            _ => inner,
        }
        .trim();
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    text.to_string()
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Wait before retry number `attempt`: 1s, 2s, 4s and so on, capped at a minute
fn backoff_delay(attempt: u32) -> Duration {
    let millis = 2_u64.saturating_pow(attempt).saturating_mul(500);
    Duration::from_millis(millis).min(MAX_BACKOFF)
}

/// Run `call` with exponential backoff; rate limiting is never retried
pub(crate) async fn with_retries<F, Fut>(retries: u32, mut call: F) -> Result<String, GenerateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, GenerateError>>,
{
    let mut last_error = None;
    for attempt in 0..=retries {
        if attempt > 0 {
            tracing::warn!(attempt = attempt, "Retrying generation");
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        match call().await {
            Ok(response_text) => {
                let text = clean_post_text(&response_text);
                if !text.is_empty() {
                    return Ok(text);
                }
                tracing::warn!("Empty post text, will retry");
                last_error = Some(GenerateError::InvalidFormat("Empty response".to_string()));
            }
            Err(GenerateError::RateLimited) => {
                return Err(GenerateError::RateLimited);
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GenerateError::Api("Unknown error".to_string())))
}

/// Map a transport error onto the generator error type
pub(crate) fn request_error(e: reqwest::Error) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout
    } else {
        GenerateError::Api(e.to_string())
    }
}

#[cfg(test)]
pub(crate) fn sample_input() -> GenerateInput {
    GenerateInput {
        hint: "Gold hits a record high".to_string(),
        style: PostStyle::Brief,
        language: "English".to_string(),
        max_chars: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_hint_language_and_length() {
        let prompt = build_post_prompt(&GenerateInput {
            max_chars: Some(900),
            ..sample_input()
        });

        assert!(prompt.contains("Topic: \"Gold hits a record high\""));
        assert!(prompt.contains("Write in English."));
        assert!(prompt.contains("400-600 characters"));
        assert!(!prompt.contains("1000-1200"));
        assert!(prompt.contains("Never exceed 900 characters"));
    }

    #[test]
    fn test_mixed_style_allows_both_lengths() {
        let prompt = build_post_prompt(&GenerateInput {
            style: PostStyle::Mixed,
            ..sample_input()
        });

        assert!(prompt.contains("400-600"));
        assert!(prompt.contains("1000-1200"));
    }

    #[test]
    fn test_clean_post_text() {
        assert_eq!(clean_post_text("  plain text \n"), "plain text");
        assert_eq!(clean_post_text("```text\nInside a fence\n```"), "Inside a fence");
        assert_eq!(clean_post_text("```\nNo tag\n```"), "No tag");
        assert_eq!(clean_post_text("\"Quoted post\""), "Quoted post");
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(7), MAX_BACKOFF);
        assert_eq!(backoff_delay(64), MAX_BACKOFF);
        assert_eq!(backoff_delay(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_survives_many_attempts() {
        let mut calls = 0;
        let result = with_retries(70, || {
            calls += 1;
            async { Err(GenerateError::Api("HTTP 503".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(GenerateError::Api(_))));
        assert_eq!(calls, 71);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_recovers_after_failure() {
        let mut calls = 0;
        let result = with_retries(2, || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt == 1 {
                    Err(GenerateError::Api("HTTP 502".to_string()))
                } else {
                    Ok("Recovered".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "Recovered");
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retries_does_not_retry_rate_limit() {
        let mut calls = 0;
        let result = with_retries(3, || {
            calls += 1;
            async { Err(GenerateError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(GenerateError::RateLimited)));
        assert_eq!(calls, 1);
    }
}
