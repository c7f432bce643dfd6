//! Feed loop use case - a poller that discovers new entries and a scheduler
//! that publishes them, connected by a bounded channel

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::{
    limits::{MessageLimits, compose_post},
    model::{FeedEntry, Item, ProcessResult},
    ports::{Clock, FeedSource, Publisher, SeenStore, TextGenerator},
    usecases::{
        queue::PublishQueue,
        rate_limit::RateLimiter,
        resolve::{ContentResolver, ResolveConfig},
        sheet_loop::RunLoopError,
    },
};

/// Configuration for the feed poller
#[derive(Debug, Clone, Default)]
pub struct FeedPollerConfig {
    /// Feed URLs to poll
    pub feeds: Vec<String>,
    /// Regex patterns (title or summary) that mark an entry as breaking
    pub breaking_patterns: Vec<String>,
    /// Regex patterns (title or summary) for entries to drop
    pub ignore_patterns: Vec<String>,
    /// Entries published longer ago than this are dropped
    pub max_age: Option<time::Duration>,
    /// On the first successful fetch of a feed, only remember its entries
    pub skip_backlog: bool,
}

/// Producer half: polls feeds and emits entries not seen before
pub struct FeedPoller<F, S, Cl>
where
    F: FeedSource + ?Sized,
    S: SeenStore + ?Sized,
    Cl: Clock + ?Sized,
{
    source: Arc<F>,
    seen: Arc<S>,
    clock: Arc<Cl>,
    config: FeedPollerConfig,
    breaking_patterns: Vec<Regex>,
    ignore_patterns: Vec<Regex>,
    primed_feeds: Mutex<HashSet<String>>,
}

impl<F, S, Cl> FeedPoller<F, S, Cl>
where
    F: FeedSource + ?Sized,
    S: SeenStore + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(source: Arc<F>, seen: Arc<S>, clock: Arc<Cl>, config: FeedPollerConfig) -> Self {
        let breaking_patterns = compile_patterns(&config.breaking_patterns, "breaking");
        let ignore_patterns = compile_patterns(&config.ignore_patterns, "ignore");
        Self {
            source,
            seen,
            clock,
            config,
            breaking_patterns,
            ignore_patterns,
            primed_feeds: Mutex::new(HashSet::new()),
        }
    }

    /// Poll every feed once and return the items seen for the first time.
    ///
    /// A feed that fails to load is logged and skipped; the others still run.
    pub async fn poll_once(&self) -> Vec<Item> {
        let mut fresh = Vec::new();

        for feed in &self.config.feeds {
            let entries = match self.source.fetch_entries(feed).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(feed = %feed, error = %e, "Failed to fetch feed");
                    continue;
                }
            };

            let backlog = self.config.skip_backlog && self.first_fetch(feed);
            let mut count = 0usize;

            for entry in entries {
                if let Some(item) = self.admit(entry, backlog).await {
                    fresh.push(item);
                    count += 1;
                }
            }

            if backlog {
                tracing::info!(feed = %feed, "Remembered feed backlog without publishing");
            } else if count > 0 {
                tracing::info!(feed = %feed, count, "New feed entries");
            }
        }

        fresh
    }

    /// Poll once and push every new item into the scheduler's channel
    pub async fn poll_into(&self, tx: &mpsc::Sender<Item>) -> Result<usize, RunLoopError> {
        let items = self.poll_once().await;
        let count = items.len();
        for item in items {
            tx.send(item)
                .await
                .map_err(|_| RunLoopError::State("publish queue closed".to_string()))?;
        }
        Ok(count)
    }

    /// Record the entry and decide whether it should be queued
    async fn admit(&self, entry: FeedEntry, backlog: bool) -> Option<Item> {
        match self.seen.mark_seen(&entry.id).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                tracing::warn!(entry_id = %entry.id, error = %e, "Seen store failed, skipping entry");
                return None;
            }
        }

        if backlog {
            return None;
        }

        if self.is_too_old(&entry) {
            tracing::debug!(entry_id = %entry.id, "Entry too old");
            return None;
        }

        let haystack = format!(
            "{}\n{}",
            entry.title,
            entry.summary.as_deref().unwrap_or_default()
        );

        if self.ignore_patterns.iter().any(|p| p.is_match(&haystack)) {
            tracing::debug!(entry_id = %entry.id, "Entry matches ignore pattern");
            return None;
        }

        let breaking = self.breaking_patterns.iter().any(|p| p.is_match(&haystack));
        Some(entry.into_item(breaking))
    }

    fn is_too_old(&self, entry: &FeedEntry) -> bool {
        match (self.config.max_age, entry.published) {
            (Some(max_age), Some(published)) => self.clock.now() - published > max_age,
            _ => false,
        }
    }

    fn first_fetch(&self, feed: &str) -> bool {
        match self.primed_feeds.lock() {
            Ok(mut primed) => primed.insert(feed.to_string()),
            Err(_) => false,
        }
    }
}

/// Configuration for the publish scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between scheduled (non-breaking) posts
    pub publish_interval: time::Duration,
    /// Dry run mode (log instead of publishing)
    pub dry_run: bool,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_per_hour: Option<u32>,
    pub resolve_config: ResolveConfig,
    pub limits: MessageLimits,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            publish_interval: time::Duration::minutes(30),
            dry_run: true,
            rate_limit_per_minute: None,
            rate_limit_per_hour: None,
            resolve_config: ResolveConfig::default(),
            limits: MessageLimits::default(),
        }
    }
}

/// Consumer half: owns the publish queue and sends items out when due
pub struct PublishScheduler<G, P, Cl>
where
    G: TextGenerator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    generator: Arc<G>,
    publisher: Arc<P>,
    clock: Arc<Cl>,
    config: SchedulerConfig,
    queue: PublishQueue,
    rate_limiter: RateLimiter,
}

impl<G, P, Cl> PublishScheduler<G, P, Cl>
where
    G: TextGenerator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        generator: Arc<G>,
        publisher: Arc<P>,
        clock: Arc<Cl>,
        config: SchedulerConfig,
    ) -> Self {
        let queue = PublishQueue::new(config.publish_interval);
        let rate_limiter =
            RateLimiter::new(config.rate_limit_per_minute, config.rate_limit_per_hour);
        Self {
            generator,
            publisher,
            clock,
            config,
            queue,
            rate_limiter,
        }
    }

    pub fn enqueue(&mut self, item: Item) {
        tracing::debug!(item_id = %item.id, breaking = item.breaking, "Queued");
        self.queue.push(item);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Publish everything that is due right now, breaking items first
    pub async fn dispatch_due(&mut self) -> Vec<(String, ProcessResult)> {
        let mut results = Vec::new();
        while let Some(item) = self.queue.pop_due(self.clock.now()) {
            let result = self.publish_item(&item).await;
            results.push((item.id, result));
        }
        results
    }

    /// Publish everything still queued, breaking first, ignoring the interval.
    ///
    /// For one-shot runs: the queue does not outlive the process, and every
    /// item in it has already been marked seen.
    pub async fn drain(&mut self) -> Vec<(String, ProcessResult)> {
        let mut results = Vec::new();
        while let Some(item) = self.queue.pop_next() {
            let result = self.publish_item(&item).await;
            results.push((item.id, result));
        }
        results
    }

    /// Run until the sending side of the channel is dropped.
    ///
    /// Waits on two conditions at once: a new item arriving, or the queue's
    /// next release time.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Item>) {
        loop {
            self.dispatch_due().await;

            let now = self.clock.now();
            let wait = self.queue.next_wakeup(now).map(|at| {
                std::time::Duration::try_from(at - now).unwrap_or(std::time::Duration::ZERO)
            });

            tokio::select! {
                received = rx.recv() => match received {
                    Some(item) => self.enqueue(item),
                    None => {
                        tracing::info!(pending = self.queue.len(), "Publish queue closed");
                        break;
                    }
                },
                _ = wait_for(wait) => {}
            }
        }
    }

    async fn publish_item(&self, item: &Item) -> ProcessResult {
        let resolver = ContentResolver::new(
            self.generator.as_ref(),
            self.config.resolve_config.clone(),
        );
        let resolution = resolver.resolve(item).await;
        let post = compose_post(
            &item.id,
            &resolution.text,
            item.image_url.as_deref(),
            &self.config.limits,
        );

        if self.config.dry_run {
            tracing::info!(
                item_id = %item.id,
                breaking = item.breaking,
                text = %post.text,
                "[DRY RUN] Would publish"
            );
            return ProcessResult::Published {
                text: post.text,
                message_id: None,
            };
        }

        self.rate_limiter.acquire().await;

        match self.publisher.publish(&post).await {
            Ok(receipt) => {
                tracing::info!(
                    item_id = %item.id,
                    breaking = item.breaking,
                    message_id = %receipt.message_id,
                    "Published"
                );
                ProcessResult::Published {
                    text: post.text,
                    message_id: Some(receipt.message_id),
                }
            }
            Err(e) => {
                tracing::error!(item_id = %item.id, error = %e, "Publish failed");
                ProcessResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn wait_for(delay: Option<std::time::Duration>) {
    match delay {
        Some(delay) => sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}

fn compile_patterns(patterns: &[String], kind: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(error) => {
                tracing::warn!(pattern = %pattern, kind, error = %error, "Invalid pattern");
                None
            }
        })
        .collect()
}
