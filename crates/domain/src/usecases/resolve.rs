//! Content resolution use case - turns an item into final post text

use crate::{
    model::{GenerateInput, Item, PostStyle},
    ports::{GenerateError, TextGenerator},
};

/// Configuration for the content resolver
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Whether the text generator may be called at all
    pub generate: bool,
    /// Style requested from the generator
    pub style: PostStyle,
    /// Output language for generated posts
    pub language: String,
    /// Texts shorter than this are treated as a theme and expanded (None = never)
    pub expand_below_chars: Option<usize>,
    /// Hint used when an item has neither text nor title
    pub default_hint: String,
    /// Prefix of the literal used when generation fails
    pub fallback_prefix: String,
    /// Append the item link on its own line
    pub append_link: bool,
    /// Upper bound passed to the generator
    pub max_chars: Option<usize>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            generate: true,
            style: PostStyle::Mixed,
            language: "English".to_string(),
            expand_below_chars: Some(60),
            default_hint: "A post for a channel about finance and business trends".to_string(),
            fallback_prefix: "Short note: ".to_string(),
            append_link: false,
            max_chars: None,
        }
    }
}

/// Resolved post text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    /// The text came from the generator
    pub generated: bool,
    /// Generation failed and the fallback literal was used
    pub fell_back: bool,
}

impl Resolution {
    fn passthrough(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generated: false,
            fell_back: false,
        }
    }
}

/// Use case for resolving post content
pub struct ContentResolver<G> {
    generator: G,
    config: ResolveConfig,
}

impl<G: TextGenerator> ContentResolver<G> {
    pub fn new(generator: G, config: ResolveConfig) -> Self {
        Self { generator, config }
    }

    /// Produce the final text for an item. Never fails: generator errors
    /// degrade to the fallback literal.
    pub async fn resolve(&self, item: &Item) -> Resolution {
        let own_text = item
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut resolution = match own_text {
            Some(text) if !self.should_expand(text) => Resolution::passthrough(text),
            Some(text) => self.generate_from(&item.id, text, text).await,
            None => {
                let hint = self.hint_for(item);
                let subject = item
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&hint)
                    .to_string();
                if self.config.generate {
                    self.generate_from(&item.id, &hint, &subject).await
                } else {
                    Resolution::passthrough(subject)
                }
            }
        };

        if self.config.append_link {
            if let Some(link) = item.link.as_deref().filter(|l| !l.trim().is_empty()) {
                resolution.text = format!("{}\n\n{}", resolution.text, link.trim());
            }
        }

        resolution
    }

    /// Generate text for a bare hint (used by one-shot composition)
    pub async fn compose(&self, hint: &str) -> Result<String, GenerateError> {
        self.call_generator(hint).await
    }

    fn should_expand(&self, text: &str) -> bool {
        self.config.generate
            && self
                .config
                .expand_below_chars
                .is_some_and(|min| text.chars().count() < min)
    }

    /// Title and summary, else the configured default hint
    fn hint_for(&self, item: &Item) -> String {
        let parts: Vec<&str> = [item.title.as_deref(), item.summary.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            self.config.default_hint.clone()
        } else {
            parts.join("\n\n")
        }
    }

    async fn generate_from(&self, item_id: &str, hint: &str, subject: &str) -> Resolution {
        match self.call_generator(hint).await {
            Ok(text) => {
                tracing::info!(item_id = %item_id, chars = text.chars().count(), "Generated post");
                Resolution {
                    text,
                    generated: true,
                    fell_back: false,
                }
            }
            Err(e) => {
                tracing::error!(item_id = %item_id, error = %e, "Generation failed, using fallback text");
                Resolution {
                    text: format!("{}{}", self.config.fallback_prefix, subject),
                    generated: false,
                    fell_back: true,
                }
            }
        }
    }

    async fn call_generator(&self, hint: &str) -> Result<String, GenerateError> {
        let input = GenerateInput {
            hint: hint.to_string(),
            style: self.config.style,
            language: self.config.language.clone(),
            max_chars: self.config.max_chars,
        };

        let text = self.generator.generate(input).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerateError::InvalidFormat("Empty response".to_string()));
        }
        Ok(text.to_string())
    }
}
