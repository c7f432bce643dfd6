//! Configuration loading and management

use anyhow::{Context, Result, bail};
use autopost_adapters::table::SheetColumns;
use autopost_domain::PostStyle;
use autopost_domain::usecases::InvalidSchedulePolicy;
use clap::ValueEnum;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub sheet: SheetConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Where items come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Scheduled rows of a table
    #[default]
    Sheet,
    /// Entries of RSS feeds
    Feed,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sheet => f.write_str("sheet"),
            Self::Feed => f.write_str("feed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub mode: RunMode,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub dry_run: bool,

    #[serde(default)]
    pub rate_limit_per_minute: u32,

    #[serde(default)]
    pub rate_limit_per_hour: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    /// `google` or `sqlite`
    #[serde(default = "default_sheet_provider")]
    pub provider: String,

    #[serde(default)]
    pub spreadsheet_id: String,

    /// Read the spreadsheet id from this variable when `spreadsheet_id` is empty
    #[serde(default = "default_spreadsheet_id_env")]
    pub spreadsheet_id_env: String,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// OAuth access token; takes precedence over a service-account key
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Service-account JSON key file
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Read the key file path from this variable when `credentials_file` is unset
    #[serde(default = "default_credentials_env")]
    pub credentials_env: String,

    #[serde(default = "default_sheets_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_posts_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_sheet_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub invalid_schedule: InvalidSchedulePolicy,

    #[serde(default)]
    pub columns: SheetColumns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub urls: Vec<String>,

    /// Variable holding a JSON array of additional feed URLs
    #[serde(default = "default_feed_urls_env")]
    pub urls_env: String,

    #[serde(default = "default_feed_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_publish_interval")]
    pub publish_interval_secs: u64,

    #[serde(default)]
    pub breaking_patterns: Vec<String>,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Capped at `seen_ttl_hours`; 0 means the cap itself
    #[serde(default)]
    pub max_age_hours: u64,

    #[serde(default)]
    pub skip_backlog: bool,

    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    #[serde(default = "default_seen_ttl_hours")]
    pub seen_ttl_hours: u64,

    /// Persist seen ids here instead of in memory
    #[serde(default)]
    pub seen_db_path: Option<PathBuf>,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// `openai`, `anthropic`, `ollama`, `stub` or `none`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default)]
    pub style: PostStyle,

    #[serde(default = "default_language")]
    pub language: String,

    /// Texts shorter than this are expanded; 0 never expands
    #[serde(default = "default_expand_below_chars")]
    pub expand_below_chars: usize,

    #[serde(default = "default_hint")]
    pub default_hint: String,

    #[serde(default = "default_fallback_prefix")]
    pub fallback_prefix: String,

    #[serde(default)]
    pub max_chars: Option<usize>,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    #[serde(default = "default_channel_id_env")]
    pub channel_id_env: String,

    #[serde(default = "default_telegram_base_url")]
    pub api_base_url: String,

    /// `HTML`, `MarkdownV2` or `Markdown`; empty sends plain text
    #[serde(default)]
    pub parse_mode: String,

    #[serde(default)]
    pub append_link: bool,

    #[serde(default)]
    pub disable_link_preview: bool,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sheet_provider() -> String {
    "google".to_string()
}

fn default_spreadsheet_id_env() -> String {
    "SHEET_ID".to_string()
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_access_token_env() -> String {
    "GOOGLE_SHEETS_TOKEN".to_string()
}

fn default_credentials_env() -> String {
    "GOOGLE_APPLICATION_CREDENTIALS".to_string()
}

fn default_sheets_base_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_posts_db_path() -> PathBuf {
    PathBuf::from("./posts.sqlite")
}

fn default_sheet_poll_interval() -> u64 {
    60
}

fn default_feed_urls_env() -> String {
    "RSS_FEEDS".to_string()
}

fn default_feed_poll_interval() -> u64 {
    300
}

fn default_publish_interval() -> u64 {
    1800
}

fn default_seen_capacity() -> usize {
    10_000
}

fn default_seen_ttl_hours() -> u64 {
    72
}

fn default_queue_capacity() -> usize {
    256
}

fn default_http_timeout() -> u64 {
    30
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.8
}

fn default_timeout() -> u64 {
    45
}

fn default_llm_retries() -> u32 {
    2
}

fn default_max_output_tokens() -> u32 {
    800
}

fn default_language() -> String {
    "English".to_string()
}

fn default_expand_below_chars() -> usize {
    60
}

fn default_hint() -> String {
    "A post for a channel about finance and business trends".to_string()
}

fn default_fallback_prefix() -> String {
    "Short note: ".to_string()
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_bot_token_env() -> String {
    "BOT_TOKEN".to_string()
}

fn default_channel_id_env() -> String {
    "CHANNEL_ID".to_string()
}

fn default_telegram_base_url() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            log_level: default_log_level(),
            dry_run: default_true(),
            rate_limit_per_minute: 0,
            rate_limit_per_hour: 0,
        }
    }
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            provider: default_sheet_provider(),
            spreadsheet_id: String::new(),
            spreadsheet_id_env: default_spreadsheet_id_env(),
            sheet_name: default_sheet_name(),
            access_token_env: default_access_token_env(),
            credentials_file: None,
            credentials_env: default_credentials_env(),
            api_base_url: default_sheets_base_url(),
            db_path: default_posts_db_path(),
            poll_interval_secs: default_sheet_poll_interval(),
            invalid_schedule: InvalidSchedulePolicy::default(),
            columns: SheetColumns::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            urls: vec![],
            urls_env: default_feed_urls_env(),
            poll_interval_secs: default_feed_poll_interval(),
            publish_interval_secs: default_publish_interval(),
            breaking_patterns: vec![],
            ignore_patterns: vec![],
            max_age_hours: 0,
            skip_backlog: false,
            seen_capacity: default_seen_capacity(),
            seen_ttl_hours: default_seen_ttl_hours(),
            seen_db_path: None,
            queue_capacity: default_queue_capacity(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout(),
            retries: default_llm_retries(),
            max_output_tokens: default_max_output_tokens(),
            style: PostStyle::default(),
            language: default_language(),
            expand_below_chars: default_expand_below_chars(),
            default_hint: default_hint(),
            fallback_prefix: default_fallback_prefix(),
            max_chars: None,
            openai: OpenAiConfig::default(),
            anthropic: AnthropicConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_api_key_env(),
            base_url: default_openai_base_url(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_anthropic_api_key_env(),
            base_url: default_anthropic_base_url(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            channel_id_env: default_channel_id_env(),
            api_base_url: default_telegram_base_url(),
            parse_mode: String::new(),
            append_link: false,
            disable_link_preview: false,
            timeout_secs: default_http_timeout(),
        }
    }
}

impl SheetConfig {
    /// Configured id, else the value of `spreadsheet_id_env`
    pub fn resolve_spreadsheet_id(&self) -> Option<String> {
        non_empty(&self.spreadsheet_id).or_else(|| read_env(&self.spreadsheet_id_env))
    }

    /// Configured key file, else the path in `credentials_env`
    pub fn resolve_credentials_file(&self) -> Option<PathBuf> {
        self.credentials_file
            .clone()
            .or_else(|| read_env(&self.credentials_env).map(PathBuf::from))
    }
}

impl FeedConfig {
    /// Age filter in hours, 0 for none.
    ///
    /// Seen ids are forgotten after `seen_ttl_hours`, so anything older must
    /// be filtered by age instead or it would be admitted again.
    pub fn effective_max_age_hours(&self) -> u64 {
        match (self.max_age_hours, self.seen_ttl_hours) {
            (age, 0) => age,
            (0, ttl) => ttl,
            (age, ttl) => age.min(ttl),
        }
    }

    /// Configured URLs plus those from `urls_env`, deduplicated in order
    pub fn resolve_urls(&self) -> Result<Vec<String>> {
        let mut urls: Vec<String> = self.urls.iter().filter_map(|u| non_empty(u)).collect();

        if let Some(raw) = read_env(&self.urls_env) {
            let extra: Vec<String> = serde_json::from_str(&raw).with_context(|| {
                format!("{} must be a JSON array of feed URLs", self.urls_env)
            })?;
            urls.extend(extra.iter().filter_map(|u| non_empty(u)));
        }

        let mut seen = std::collections::HashSet::new();
        urls.retain(|u| seen.insert(u.clone()));
        Ok(urls)
    }
}

/// `--log-level` wins, then `general.log_level`, then `info`
pub fn log_level_for<'a>(flag: Option<&'a str>, config: Option<&'a AppConfig>) -> &'a str {
    flag.or_else(|| config.and_then(|c| non_empty_str(&c.general.log_level)))
        .unwrap_or("info")
}

fn non_empty_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            anyhow::bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("AUTOPOST")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# autopost configuration
#
# Secrets never live here: they are read from the environment variables
# named below (BOT_TOKEN, CHANNEL_ID, OPENAI_API_KEY, ...).
# Any key can be overridden with AUTOPOST__SECTION__KEY, e.g.
# AUTOPOST__GENERAL__DRY_RUN=false

[general]
mode = "sheet"  # sheet, feed
log_level = "info"
dry_run = true
# 0 disables rate limiting
rate_limit_per_minute = 0
rate_limit_per_hour = 0

[sheet]
provider = "google"  # google, sqlite
# spreadsheet_id = "1AbC..."
spreadsheet_id_env = "SHEET_ID"
sheet_name = "Sheet1"
# Auth: a token in access_token_env, else a service-account key file
access_token_env = "GOOGLE_SHEETS_TOKEN"
# credentials_file = "./service-account.json"
credentials_env = "GOOGLE_APPLICATION_CREDENTIALS"
db_path = "./posts.sqlite"
poll_interval_secs = 60
invalid_schedule = "publish_now"  # publish_now, skip

[sheet.columns]
schedule = "Publish time"
text = "Post text"
image = "Image URL"
status = "Status"
title = "Title"

[feed]
urls = ["https://example.com/rss.xml"]
urls_env = "RSS_FEEDS"
poll_interval_secs = 300
publish_interval_secs = 1800
breaking_patterns = ["(?i)breaking", "(?i)urgent"]
ignore_patterns = []
# Never above seen_ttl_hours; 0 means seen_ttl_hours
max_age_hours = 0
skip_backlog = false
seen_capacity = 10000
seen_ttl_hours = 72
# seen_db_path = "./seen.sqlite"
queue_capacity = 256

[generator]
provider = "openai"  # openai, anthropic, ollama, stub, none
model = "gpt-4o-mini"
temperature = 0.8
timeout_secs = 45
retries = 2
max_output_tokens = 800
style = "mixed"  # brief, analytical, mixed
language = "English"
expand_below_chars = 60
default_hint = "A post for a channel about finance and business trends"
fallback_prefix = "Short note: "

[generator.openai]
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com/v1"

[generator.anthropic]
api_key_env = "ANTHROPIC_API_KEY"

[generator.ollama]
base_url = "http://localhost:11434"

[telegram]
bot_token_env = "BOT_TOKEN"
channel_id_env = "CHANNEL_ID"
# parse_mode = "HTML"
append_link = false
disable_link_preview = false
"#
        .to_string()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trimmed value of an environment variable, `None` when unset or blank
pub fn read_env(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }
    std::env::var(name).ok().and_then(|v| non_empty(&v))
}

/// Read a required environment variable
pub fn require_env(env_var: &str, purpose: &str) -> Result<String> {
    if env_var.trim().is_empty() {
        bail!("No environment variable configured for {}", purpose);
    }

    read_env(env_var)
        .with_context(|| format!("Missing environment variable {} ({})", env_var, purpose))
}

/// Read a required secret from the environment
pub fn require_secret(env_var: &str, purpose: &str) -> Result<SecretString> {
    Ok(SecretString::new(require_env(env_var, purpose)?.into()))
}

/// Accepts `@channelname` or a numeric chat id such as `-1001234567890`
pub fn validate_channel_id(value: &str) -> Result<()> {
    let value = value.trim();

    if let Some(name) = value.strip_prefix('@') {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Ok(());
        }
    } else if value.parse::<i64>().is_ok() {
        return Ok(());
    }

    bail!(
        "Channel id must be @channelname or a numeric id (e.g. -1001234567890), got: {}",
        value
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();

        assert_eq!(config.general.mode, RunMode::Sheet);
        assert!(config.general.dry_run);
        assert_eq!(config.sheet.invalid_schedule, InvalidSchedulePolicy::PublishNow);
        assert_eq!(config.sheet.columns.status, "Status");
        assert_eq!(config.generator.style, PostStyle::Mixed);
        assert_eq!(config.feed.queue_capacity, 256);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();

        assert_eq!(config.sheet.poll_interval_secs, 60);
        assert_eq!(config.generator.model, "gpt-4o-mini");
        assert_eq!(config.generator.expand_below_chars, 60);
        assert_eq!(config.telegram.bot_token_env, "BOT_TOKEN");
    }

    #[test]
    fn test_max_age_never_exceeds_seen_ttl() {
        let feed = |max_age_hours, seen_ttl_hours| FeedConfig {
            max_age_hours,
            seen_ttl_hours,
            ..Default::default()
        };

        assert_eq!(feed(0, 72).effective_max_age_hours(), 72);
        assert_eq!(feed(200, 72).effective_max_age_hours(), 72);
        assert_eq!(feed(24, 72).effective_max_age_hours(), 24);
        assert_eq!(feed(24, 0).effective_max_age_hours(), 24);
        assert_eq!(feed(0, 0).effective_max_age_hours(), 0);
    }

    #[test]
    fn test_resolve_urls_merges_env_json() {
        let config = FeedConfig {
            urls: vec!["https://a.example/rss".to_string(), "  ".to_string()],
            urls_env: "AUTOPOST_TEST_FEEDS_MERGE".to_string(),
            ..Default::default()
        };
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var(
                "AUTOPOST_TEST_FEEDS_MERGE",
                r#"["https://b.example/rss", "https://a.example/rss"]"#,
            );
        }

        let urls = config.resolve_urls().unwrap();

        assert_eq!(urls, vec!["https://a.example/rss", "https://b.example/rss"]);
    }

    #[test]
    fn test_resolve_urls_rejects_bad_json() {
        let config = FeedConfig {
            urls_env: "AUTOPOST_TEST_FEEDS_BAD".to_string(),
            ..Default::default()
        };
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("AUTOPOST_TEST_FEEDS_BAD", "https://not-a-json-array");
        }

        assert!(config.resolve_urls().is_err());
    }

    #[test]
    fn test_log_level_falls_back_to_config() {
        let mut config = AppConfig::default();
        config.general.log_level = "debug".to_string();

        assert_eq!(log_level_for(Some("warn"), Some(&config)), "warn");
        assert_eq!(log_level_for(None, Some(&config)), "debug");
        assert_eq!(log_level_for(None, None), "info");

        config.general.log_level = "  ".to_string();
        assert_eq!(log_level_for(None, Some(&config)), "info");
    }

    #[test]
    fn test_credentials_file_falls_back_to_env() {
        let mut config = SheetConfig {
            credentials_env: "AUTOPOST_TEST_CREDENTIALS".to_string(),
            ..Default::default()
        };
        assert!(config.resolve_credentials_file().is_none());

        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("AUTOPOST_TEST_CREDENTIALS", "/etc/autopost/key.json");
        }
        assert_eq!(
            config.resolve_credentials_file(),
            Some(PathBuf::from("/etc/autopost/key.json"))
        );

        config.credentials_file = Some(PathBuf::from("./mine.json"));
        assert_eq!(
            config.resolve_credentials_file(),
            Some(PathBuf::from("./mine.json"))
        );
    }

    #[test]
    fn test_validate_channel_id() {
        assert!(validate_channel_id("-1001234567890").is_ok());
        assert!(validate_channel_id("@finance_notes").is_ok());
        assert!(validate_channel_id("@").is_err());
        assert!(validate_channel_id("my channel").is_err());
    }

    #[test]
    fn test_require_env_reports_name() {
        let err = require_env("AUTOPOST_TEST_DEFINITELY_UNSET", "bot token").unwrap_err();
        assert!(err.to_string().contains("AUTOPOST_TEST_DEFINITELY_UNSET"));
    }
}
