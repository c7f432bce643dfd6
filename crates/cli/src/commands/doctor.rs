//! Doctor command - validate configuration and show status

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::config::{AppConfig, RunMode, read_env, validate_channel_id};

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    source: CheckResult,
    generator: CheckResult,
    telegram: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        source: CheckResult::error("Not checked"),
        generator: CheckResult::error("Not checked"),
        telegram: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.source = match config.general.mode {
            RunMode::Sheet => check_sheet(config),
            RunMode::Feed => check_feed(config),
        };
        report.generator = check_generator(config);
        report.telegram = check_telegram(config);
    }

    let checks = [
        &report.config,
        &report.source,
        &report.generator,
        &report.telegram,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn env_state(name: &str) -> &'static str {
    if read_env(name).is_some() {
        "set"
    } else {
        "not set"
    }
}

fn check_sheet(config: &AppConfig) -> CheckResult {
    let sheet = &config.sheet;

    match sheet.provider.as_str() {
        "sqlite" => CheckResult::ok(format!(
            "Mode: sheet, SQLite table: {}",
            sheet.db_path.display()
        )),
        "google" => {
            let Some(spreadsheet_id) = sheet.resolve_spreadsheet_id() else {
                return CheckResult::error(format!(
                    "Mode: sheet, no spreadsheet id (set [sheet].spreadsheet_id or {})",
                    sheet.spreadsheet_id_env
                ));
            };

            let token = env_state(&sheet.access_token_env);
            let key_file = sheet.resolve_credentials_file();
            let auth = match (&key_file, token) {
                (_, "set") => format!("token in {}", sheet.access_token_env),
                (Some(path), _) if path.exists() => {
                    format!("service account key {}", path.display())
                }
                (Some(path), _) => format!("service account key {} (missing)", path.display()),
                (None, _) => format!(
                    "none ({} and {} not set)",
                    sheet.access_token_env, sheet.credentials_env
                ),
            };
            let authorized = token == "set" || key_file.is_some_and(|path| path.exists());

            let message = format!(
                "Mode: sheet, Spreadsheet: {}, Tab: {}, Auth: {}",
                spreadsheet_id, sheet.sheet_name, auth
            );
            let details = serde_json::json!({
                "columns": sheet.columns,
                "invalid_schedule": sheet.invalid_schedule,
            });

            if authorized {
                CheckResult::ok(message).with_details(details)
            } else {
                CheckResult::warn(message).with_details(details)
            }
        }
        other => CheckResult::error(format!("Unknown sheet provider: {}", other)),
    }
}

fn check_feed(config: &AppConfig) -> CheckResult {
    let urls = match config.feed.resolve_urls() {
        Ok(urls) => urls,
        Err(e) => return CheckResult::error(format!("{:#}", e)),
    };

    if urls.is_empty() {
        return CheckResult::error(format!(
            "Mode: feed, no feeds configured (set [feed].urls or {})",
            config.feed.urls_env
        ));
    }

    let invalid: Vec<&String> = config
        .feed
        .breaking_patterns
        .iter()
        .chain(&config.feed.ignore_patterns)
        .filter(|p| regex::Regex::new(p).is_err())
        .collect();

    let details = serde_json::json!({ "feeds": urls });

    if invalid.is_empty() {
        CheckResult::ok(format!("Mode: feed, {} feeds", urls.len())).with_details(details)
    } else {
        CheckResult::warn(format!(
            "Mode: feed, {} feeds, invalid patterns ignored: {:?}",
            urls.len(),
            invalid
        ))
        .with_details(details)
    }
}

fn check_generator(config: &AppConfig) -> CheckResult {
    let generator = &config.generator;
    let provider = &generator.provider;
    let model = &generator.model;

    // Check if API key env var is set (without revealing the value)
    let api_key_env = match provider.as_str() {
        "openai" => &generator.openai.api_key_env,
        "anthropic" => &generator.anthropic.api_key_env,
        "ollama" => {
            return CheckResult::ok(format!(
                "Provider: ollama, Model: {}, base_url: {}",
                model, generator.ollama.base_url
            ));
        }
        "stub" => return CheckResult::ok("Provider: stub (offline)"),
        "none" => return CheckResult::ok("Generation disabled, posts use sheet text as-is"),
        other => return CheckResult::error(format!("Unknown provider: {}", other)),
    };

    if api_key_env.is_empty() {
        return CheckResult::error(format!("No API key env var configured for {}", provider));
    }

    let message = format!(
        "Provider: {}, Model: {}, API key: {} ({})",
        provider,
        model,
        api_key_env,
        env_state(api_key_env)
    );

    if read_env(api_key_env).is_some() {
        CheckResult::ok(message)
    } else {
        CheckResult::warn(message)
    }
}

fn check_telegram(config: &AppConfig) -> CheckResult {
    let telegram = &config.telegram;

    if config.general.dry_run {
        return CheckResult::ok("Dry run, nothing is sent");
    }

    if read_env(&telegram.bot_token_env).is_none() {
        return CheckResult::error(format!(
            "Bot token: {} (not set)",
            telegram.bot_token_env
        ));
    }

    let Some(channel_id) = read_env(&telegram.channel_id_env) else {
        return CheckResult::error(format!(
            "Channel id: {} (not set)",
            telegram.channel_id_env
        ));
    };

    match validate_channel_id(&channel_id) {
        Ok(()) => CheckResult::ok(format!(
            "Bot token: {} (set), Channel: {}",
            telegram.bot_token_env, channel_id
        )),
        Err(e) => CheckResult::error(e.to_string()),
    }
}

fn print_report(report: &DoctorReport) {
    println!("autopost Doctor Report");
    println!("======================");
    println!();

    print_check("Config", &report.config);
    print_check("Source", &report.source);
    print_check("Generator", &report.generator);
    print_check("Telegram", &report.telegram);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: autopost run --dry-run --once");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
