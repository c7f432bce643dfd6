//! Sheet loop use case - reads scheduled rows, publishes due ones, records status

use std::sync::Arc;

use crate::{
    limits::{MessageLimits, compose_post},
    model::{Item, ItemStatus, ProcessResult},
    ports::{Clock, Publisher, TableStore, TextGenerator},
    usecases::{
        gate::{EligibilityGate, InvalidSchedulePolicy},
        rate_limit::RateLimiter,
        resolve::{ContentResolver, ResolveConfig},
    },
};

/// Configuration for the sheet loop
#[derive(Debug, Clone)]
pub struct SheetLoopConfig {
    /// Dry run mode (don't publish or write status)
    pub dry_run: bool,
    /// Handling of unparseable schedule cells
    pub invalid_schedule: InvalidSchedulePolicy,
    /// Max posts per minute (None = unlimited)
    pub rate_limit_per_minute: Option<u32>,
    /// Max posts per hour (None = unlimited)
    pub rate_limit_per_hour: Option<u32>,
    /// Content resolution config
    pub resolve_config: ResolveConfig,
    /// Channel length caps
    pub limits: MessageLimits,
}

impl Default for SheetLoopConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            invalid_schedule: InvalidSchedulePolicy::default(),
            rate_limit_per_minute: None,
            rate_limit_per_hour: None,
            resolve_config: ResolveConfig::default(),
            limits: MessageLimits::default(),
        }
    }
}

/// Serial polling loop over a table of scheduled posts
#[derive(Clone)]
pub struct SheetLoop<T, G, P, Cl>
where
    T: TableStore + ?Sized,
    G: TextGenerator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    table: Arc<T>,
    generator: Arc<G>,
    publisher: Arc<P>,
    clock: Arc<Cl>,
    config: SheetLoopConfig,
    gate: EligibilityGate,
    rate_limiter: Arc<RateLimiter>,
}

impl<T, G, P, Cl> SheetLoop<T, G, P, Cl>
where
    T: TableStore + ?Sized,
    G: TextGenerator + ?Sized,
    P: Publisher + ?Sized,
    Cl: Clock + ?Sized,
{
    pub fn new(
        table: Arc<T>,
        generator: Arc<G>,
        publisher: Arc<P>,
        clock: Arc<Cl>,
        config: SheetLoopConfig,
    ) -> Self {
        let gate = EligibilityGate::new(config.invalid_schedule);
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            config.rate_limit_per_hour,
        ));
        Self {
            table,
            generator,
            publisher,
            clock,
            config,
            gate,
            rate_limiter,
        }
    }

    /// Run a single poll cycle over every row.
    ///
    /// A read failure aborts the cycle; per-item failures are recorded in the
    /// status column and never abort it.
    pub async fn poll_once(&self) -> Result<Vec<(String, ProcessResult)>, RunLoopError> {
        let items = self
            .table
            .read_items()
            .await
            .map_err(|e| RunLoopError::Source(e.to_string()))?;

        tracing::debug!(rows = items.len(), "Read table");

        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            let result = self.process_item(item).await;
            results.push((item.id.clone(), result));
        }

        Ok(results)
    }

    /// Process a single row
    async fn process_item(&self, item: &Item) -> ProcessResult {
        let eligibility = self.gate.check(item, self.clock.now());
        if !eligibility.is_eligible() {
            return ProcessResult::Skipped {
                reason: eligibility.reason(),
            };
        }

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
                with_image = post.image_url.is_some(),
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
                self.record(item, ItemStatus::done(self.clock.now())).await;
                tracing::info!(
                    item_id = %item.id,
                    platform = self.publisher.platform(),
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
                self.record(item, ItemStatus::failed(e.to_string())).await;
                ProcessResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn record(&self, item: &Item, status: ItemStatus) {
        if let Err(e) = self.table.write_status(&item.id, &status).await {
            tracing::error!(
                item_id = %item.id,
                status = %status.encode(),
                error = %e,
                "Failed to record status"
            );
        }
    }
}

/// Errors from the driver loops
#[derive(Debug, thiserror::Error)]
pub enum RunLoopError {
    #[error("Source error: {0}")]
    Source(String),
    #[error("State error: {0}")]
    State(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenerateInput, OutgoingPost, Schedule};
    use crate::ports::{GenerateError, PublishError, PublishReceipt, SourceError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;
    use time::macros::datetime;

    // Fake implementations for testing
    struct FakeTable {
        rows: Mutex<Vec<Item>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    impl FakeTable {
        fn with_rows(rows: Vec<Item>) -> Self {
            Self {
                rows: Mutex::new(rows),
                fail_reads: false,
                fail_writes: false,
            }
        }

        fn status_cell(&self, id: &str) -> String {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.status.encode())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl TableStore for FakeTable {
        async fn read_items(&self) -> Result<Vec<Item>, SourceError> {
            if self.fail_reads {
                return Err(SourceError::Network("sheet unreachable".to_string()));
            }
            // Round-trip through the cell encoding, like a real sheet
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .cloned()
                .map(|mut row| {
                    row.status = ItemStatus::decode(&row.status.encode());
                    row
                })
                .collect())
        }

        async fn write_status(
            &self,
            item_id: &str,
            status: &ItemStatus,
        ) -> Result<(), SourceError> {
            if self.fail_writes {
                return Err(SourceError::Api("quota exceeded".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|r| r.id == item_id) {
                row.status = status.clone();
            }
            Ok(())
        }
    }

    struct FakeGenerator {
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError> {
            if self.fail {
                return Err(GenerateError::Timeout);
            }
            Ok(format!("Generated about {}", input.hint))
        }
    }

    struct FakePublisher {
        fail: bool,
        sent: Mutex<Vec<OutgoingPost>>,
    }

    impl FakePublisher {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                sent: Mutex::new(vec![]),
            }
        }

        fn sent(&self) -> Vec<OutgoingPost> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, post: &OutgoingPost) -> Result<PublishReceipt, PublishError> {
            self.sent.lock().unwrap().push(post.clone());
            if self.fail {
                return Err(PublishError::Network("connection reset".to_string()));
            }
            Ok(PublishReceipt {
                message_id: "42".to_string(),
            })
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn platform(&self) -> &'static str {
            "fake"
        }
    }

    struct FakeClock {
        time: Mutex<OffsetDateTime>,
    }

    impl FakeClock {
        fn at(time: OffsetDateTime) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        fn set(&self, time: OffsetDateTime) {
            *self.time.lock().unwrap() = time;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            *self.time.lock().unwrap()
        }
    }

    fn row(id: &str, text: &str) -> Item {
        Item {
            text: Some(text.to_string()),
            ..Item::new(id)
        }
    }

    fn live_config() -> SheetLoopConfig {
        SheetLoopConfig {
            dry_run: false,
            ..Default::default()
        }
    }

    fn long_text() -> String {
        "Markets were calm today as investors waited for the central bank decision.".to_string()
    }

    #[tokio::test]
    async fn test_publishes_once_and_records_ok() {
        let table = Arc::new(FakeTable::with_rows(vec![row("2", &long_text())]));
        let publisher = Arc::new(FakePublisher::new(false));
        let clock = Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC)));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            clock,
            live_config(),
        );

        let results = sheet_loop.poll_once().await.unwrap();
        assert!(matches!(results[0].1, ProcessResult::Published { .. }));
        assert_eq!(table.status_cell("2"), "OK 2024-01-01 10:00 UTC");

        let results = sheet_loop.poll_once().await.unwrap();
        assert!(matches!(results[0].1, ProcessResult::Skipped { .. }));
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_recorded_and_not_retried() {
        let table = Arc::new(FakeTable::with_rows(vec![row("5", &long_text())]));
        let publisher = Arc::new(FakePublisher::new(true));
        let clock = Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC)));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            clock,
            live_config(),
        );

        let results = sheet_loop.poll_once().await.unwrap();
        assert!(matches!(results[0].1, ProcessResult::Failed { .. }));
        assert!(table.status_cell("5").to_lowercase().contains("error"));

        sheet_loop.poll_once().await.unwrap();
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_row_waits_until_due() {
        let scheduled = Item {
            schedule: Schedule::parse("2024-01-01 00:00"),
            ..row("3", &long_text())
        };
        let table = Arc::new(FakeTable::with_rows(vec![scheduled]));
        let publisher = Arc::new(FakePublisher::new(false));
        let clock = Arc::new(FakeClock::at(datetime!(2023-12-31 23:59 UTC)));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            Arc::clone(&clock),
            live_config(),
        );

        sheet_loop.poll_once().await.unwrap();
        assert!(publisher.sent().is_empty());
        assert_eq!(table.status_cell("3"), "");

        clock.set(datetime!(2024-01-01 00:00 UTC));
        sheet_loop.poll_once().await.unwrap();
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_aborts_cycle() {
        let table = Arc::new(FakeTable {
            fail_reads: true,
            ..FakeTable::with_rows(vec![])
        });

        let sheet_loop = SheetLoop::new(
            table,
            Arc::new(FakeGenerator { fail: false }),
            Arc::new(FakePublisher::new(false)),
            Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC))),
            live_config(),
        );

        let result = sheet_loop.poll_once().await;
        assert!(matches!(result, Err(RunLoopError::Source(_))));
    }

    #[tokio::test]
    async fn test_dry_run_neither_publishes_nor_records() {
        let table = Arc::new(FakeTable::with_rows(vec![row("2", &long_text())]));
        let publisher = Arc::new(FakePublisher::new(false));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC))),
            SheetLoopConfig::default(),
        );

        let results = sheet_loop.poll_once().await.unwrap();

        assert!(matches!(
            results[0].1,
            ProcessResult::Published {
                message_id: None,
                ..
            }
        ));
        assert!(publisher.sent().is_empty());
        assert_eq!(table.status_cell("2"), "");
    }

    #[tokio::test]
    async fn test_generation_failure_publishes_fallback_with_title() {
        let untitled = Item {
            title: Some("Bitcoin halving".to_string()),
            ..Item::new("9")
        };
        let table = Arc::new(FakeTable::with_rows(vec![untitled]));
        let publisher = Arc::new(FakePublisher::new(false));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: true }),
            Arc::clone(&publisher),
            Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC))),
            live_config(),
        );

        sheet_loop.poll_once().await.unwrap();

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Bitcoin halving"));
        assert!(table.status_cell("9").starts_with("OK"));
    }

    #[tokio::test]
    async fn test_status_write_failure_does_not_abort_cycle() {
        let table = Arc::new(FakeTable {
            fail_writes: true,
            ..FakeTable::with_rows(vec![row("2", &long_text()), row("3", &long_text())])
        });
        let publisher = Arc::new(FakePublisher::new(false));

        let sheet_loop = SheetLoop::new(
            table,
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC))),
            live_config(),
        );

        let results = sheet_loop.poll_once().await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_item_does_not_affect_others() {
        let table = Arc::new(FakeTable::with_rows(vec![
            Item {
                status: ItemStatus::failed("earlier"),
                ..row("2", &long_text())
            },
            row("3", &long_text()),
        ]));
        let publisher = Arc::new(FakePublisher::new(false));

        let sheet_loop = SheetLoop::new(
            Arc::clone(&table),
            Arc::new(FakeGenerator { fail: false }),
            Arc::clone(&publisher),
            Arc::new(FakeClock::at(datetime!(2024-01-01 10:00 UTC))),
            live_config(),
        );

        let results = sheet_loop.poll_once().await.unwrap();

        assert!(matches!(results[0].1, ProcessResult::Skipped { .. }));
        assert!(matches!(results[1].1, ProcessResult::Published { .. }));
        assert_eq!(table.status_cell("2"), "ERROR: earlier");
    }
}
