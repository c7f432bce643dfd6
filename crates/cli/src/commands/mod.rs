//! Subcommand implementations and the wiring they share

pub mod compose;
pub mod config;
pub mod doctor;
pub mod queue;
pub mod run;

use anyhow::{Result, bail};
use autopost_adapters::llm::{
    AnthropicGenerator, LlmConfig as AdapterLlmConfig, OllamaGenerator, OpenAiGenerator,
    StubGenerator,
};
use autopost_domain::TextGenerator;
use autopost_domain::limits::{CAPTION_MAX_CHARS, MESSAGE_MAX_CHARS, MessageLimits};
use autopost_domain::usecases::ResolveConfig;
use std::sync::Arc;

use crate::config::{AppConfig, GeneratorConfig, require_secret};

/// Build the configured text generator.
///
/// The `none` provider turns generation off; callers must also pass a
/// [`ResolveConfig`] with `generate = false` (see [`resolve_config_from`]).
pub(crate) fn build_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    let generator = &config.generator;
    let llm_config = adapter_llm_config(generator);

    match generator.provider.as_str() {
        "openai" => {
            let api_key = require_secret(&generator.openai.api_key_env, "OpenAI API key")?;
            Ok(Arc::new(OpenAiGenerator::with_base_url(
                api_key,
                generator.openai.base_url.clone(),
                llm_config,
            )))
        }
        "anthropic" => {
            let api_key = require_secret(&generator.anthropic.api_key_env, "Anthropic API key")?;
            Ok(Arc::new(AnthropicGenerator::with_base_url(
                api_key,
                generator.anthropic.base_url.clone(),
                llm_config,
            )))
        }
        "ollama" => Ok(Arc::new(OllamaGenerator::with_base_url(
            generator.ollama.base_url.clone(),
            llm_config,
        ))),
        "stub" | "none" => Ok(Arc::new(StubGenerator::echo())),
        other => bail!("Unknown generator provider: {}", other),
    }
}

fn adapter_llm_config(generator: &GeneratorConfig) -> AdapterLlmConfig {
    AdapterLlmConfig {
        model: generator.model.clone(),
        temperature: generator.temperature,
        max_output_tokens: generator.max_output_tokens,
        timeout_secs: generator.timeout_secs,
        retries: generator.retries,
    }
}

pub(crate) fn resolve_config_from(config: &AppConfig) -> ResolveConfig {
    let generator = &config.generator;
    ResolveConfig {
        generate: generator.provider != "none",
        style: generator.style,
        language: generator.language.clone(),
        expand_below_chars: if generator.expand_below_chars == 0 {
            None
        } else {
            Some(generator.expand_below_chars)
        },
        default_hint: generator.default_hint.clone(),
        fallback_prefix: generator.fallback_prefix.clone(),
        append_link: config.telegram.append_link,
        max_chars: generator.max_chars,
    }
}

/// Telegram caps; a configured `max_chars` lowers both
pub(crate) fn message_limits_from(config: &AppConfig) -> MessageLimits {
    let cap = config.generator.max_chars.unwrap_or(usize::MAX);
    MessageLimits {
        caption_max_chars: CAPTION_MAX_CHARS.min(cap),
        message_max_chars: MESSAGE_MAX_CHARS.min(cap),
    }
}

pub(crate) fn rate_limit_from_config(value: u32) -> Option<u32> {
    if value == 0 { None } else { Some(value) }
}
