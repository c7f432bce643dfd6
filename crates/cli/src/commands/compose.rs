//! Compose command - one-shot post generation

use anyhow::{Context, Result, bail};
use autopost_domain::limits::truncate_chars;
use autopost_domain::usecases::ContentResolver;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::ComposeArgs;
use crate::commands::{build_generator, message_limits_from, resolve_config_from};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct ComposeOutput<'a> {
    provider: &'a str,
    hint: &'a str,
    text: String,
    chars: usize,
}

pub async fn execute(args: ComposeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();

    let hint = args.hint.trim();
    if hint.is_empty() {
        bail!("No hint provided");
    }

    let resolve_config = resolve_config_from(&config);
    if !resolve_config.generate {
        bail!("Text generation is disabled (generator.provider = \"none\")");
    }

    tracing::info!(
        provider = %config.generator.provider,
        model = %config.generator.model,
        "Composing post"
    );

    let generator = build_generator(&config)?;
    let resolver = ContentResolver::new(generator.as_ref(), resolve_config);
    let text = resolver
        .compose(hint)
        .await
        .context("Generation failed")?;
    let text = truncate_chars(&text, message_limits_from(&config).message_max_chars);

    if args.json {
        let output = ComposeOutput {
            provider: &config.generator.provider,
            hint,
            chars: text.chars().count(),
            text,
        };
        let json = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
        println!("{}", json);
    } else {
        println!("{}", text);
    }

    Ok(())
}
