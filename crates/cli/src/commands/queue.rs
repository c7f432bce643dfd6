//! Queue command - manage the local SQLite post table

use anyhow::{Context, Result, bail};
use autopost_adapters::table::{NewPost, SqliteTableStore};
use autopost_domain::{ItemStatus, Schedule, TableStore};
use serde::Serialize;
use std::path::PathBuf;

use crate::args::{QueueArgs, QueueCommands};
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct PostRow {
    id: String,
    schedule: String,
    title: Option<String>,
    text: Option<String>,
    image_url: Option<String>,
    status: String,
    state: &'static str,
}

pub async fn execute(args: QueueArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let store = SqliteTableStore::new(&config.sheet.db_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open post table: {}",
                config.sheet.db_path.display()
            )
        })?;

    match args.command {
        QueueCommands::Add {
            text,
            title,
            image,
            at,
        } => add_post(&store, text, title, image, at).await,
        QueueCommands::List { json } => list_posts(&store, json).await,
    }
}

async fn add_post(
    store: &SqliteTableStore,
    text: Option<String>,
    title: Option<String>,
    image: Option<String>,
    at: Option<String>,
) -> Result<()> {
    let schedule = Schedule::parse(at.as_deref().unwrap_or_default());
    if let Schedule::Invalid(raw) = &schedule {
        bail!(
            "Invalid publish time '{}': expected YYYY-MM-DD HH:MM (UTC)",
            raw
        );
    }

    let text = non_blank(text);
    let title = non_blank(title);
    if text.is_none() && title.is_none() {
        tracing::warn!("Post has neither text nor title; the default hint will be used");
    }

    let id = store
        .add(&NewPost {
            schedule,
            text,
            title,
            image_url: non_blank(image),
        })
        .await
        .context("Failed to add post")?;

    println!("Added post {}", id);
    Ok(())
}

async fn list_posts(store: &SqliteTableStore, json: bool) -> Result<()> {
    let items = store.read_items().await.context("Failed to read posts")?;

    let rows: Vec<PostRow> = items
        .into_iter()
        .map(|item| PostRow {
            state: match item.status {
                ItemStatus::Pending => "pending",
                ItemStatus::Done { .. } => "done",
                ItemStatus::Failed { .. } => "failed",
            },
            status: item.status.encode(),
            schedule: item.schedule.to_cell(),
            id: item.id,
            title: item.title,
            text: item.text,
            image_url: item.image_url,
        })
        .collect();

    if json {
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize posts")?;
        println!("{}", json);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No posts queued.");
        return Ok(());
    }

    for row in &rows {
        let schedule = if row.schedule.is_empty() {
            "now"
        } else {
            row.schedule.as_str()
        };
        let label = row
            .title
            .as_deref()
            .or(row.text.as_deref())
            .unwrap_or("(default hint)");
        println!("{:>4}  {:<16}  {:<8}  {}", row.id, schedule, row.state, label);
        if row.state == "failed" {
            println!("      {}", row.status);
        }
    }

    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
