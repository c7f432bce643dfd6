//! Telegram channel adapters

mod bot;

pub use bot::{TelegramConfig, TelegramPublisher};

use async_trait::async_trait;
use autopost_domain::{OutgoingPost, PublishError, PublishReceipt, Publisher};
use std::sync::Mutex;

/// Stub publisher for testing and offline runs
pub struct StubPublisher {
    enabled: bool,
    fail_with: Option<String>,
    published: Mutex<Vec<OutgoingPost>>,
}

impl StubPublisher {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            fail_with: None,
            published: Mutex::new(vec![]),
        }
    }

    /// A stub whose every publish fails with an API error
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            enabled: true,
            fail_with: Some(reason.into()),
            published: Mutex::new(vec![]),
        }
    }

    /// Get all posts that were published
    pub fn get_published(&self) -> Vec<OutgoingPost> {
        self.published
            .lock()
            .map(|published| published.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(&self, post: &OutgoingPost) -> Result<PublishReceipt, PublishError> {
        if !self.enabled {
            return Err(PublishError::Disabled);
        }

        if let Some(reason) = &self.fail_with {
            return Err(PublishError::Api(reason.clone()));
        }

        let mut published = self
            .published
            .lock()
            .map_err(|e| PublishError::Api(e.to_string()))?;
        published.push(post.clone());

        tracing::info!(item_id = %post.item_id, text = %post.text, "Stub publish");

        Ok(PublishReceipt {
            message_id: format!("stub_{}", published.len()),
        })
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn platform(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> OutgoingPost {
        OutgoingPost {
            item_id: id.to_string(),
            text: "Hello channel".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_stub_records_posts() {
        let publisher = StubPublisher::new(true);

        let first = publisher.publish(&post("1")).await.unwrap();
        let second = publisher.publish(&post("2")).await.unwrap();

        assert_eq!(first.message_id, "stub_1");
        assert_eq!(second.message_id, "stub_2");
        assert_eq!(publisher.get_published().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_stub() {
        let publisher = StubPublisher::failing("chat not found");

        let result = publisher.publish(&post("1")).await;

        assert!(matches!(result, Err(PublishError::Api(msg)) if msg == "chat not found"));
        assert!(publisher.get_published().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_stub() {
        let publisher = StubPublisher::new(false);
        assert!(matches!(
            publisher.publish(&post("1")).await,
            Err(PublishError::Disabled)
        ));
    }
}
