//! RSS feed source

use async_trait::async_trait;
use autopost_domain::{FeedEntry, FeedSource, SourceError};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::{Rfc2822, Rfc3339};

/// Fetches RSS 2.0 feeds over HTTP
pub struct RssFeedSource {
    client: Client,
}

impl RssFeedSource {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("autopost/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");

        Self { client }
    }

    /// Parse an already-fetched channel into entries (no I/O)
    pub fn parse_channel(channel: &rss::Channel, feed_url: &str) -> Vec<FeedEntry> {
        channel
            .items()
            .iter()
            .map(|item| {
                let title = item.title().map(str::trim).unwrap_or_default().to_string();
                let summary = item
                    .description()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from);
                let link = item
                    .link()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from);

                // Prefer <guid>, then <link>, then a content fingerprint
                let id = item
                    .guid()
                    .map(|g| g.value().trim())
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .or_else(|| link.clone())
                    .unwrap_or_else(|| fingerprint(&title, summary.as_deref()));

                let published = item.pub_date().and_then(parse_pub_date);

                FeedEntry {
                    id,
                    title,
                    summary,
                    link,
                    published,
                    feed: feed_url.to_string(),
                }
            })
            .collect()
    }
}

impl Default for RssFeedSource {
    fn default() -> Self {
        Self::new(30)
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch_entries(&self, feed_url: &str) -> Result<Vec<FeedEntry>, SourceError> {
        let response = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        if response.status() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SourceError::RateLimited(retry_after));
        }

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "Feed returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let channel = rss::Channel::read_from(body.as_ref())
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let entries = Self::parse_channel(&channel, feed_url);
        tracing::debug!(feed = %feed_url, entries = entries.len(), "Fetched feed");

        Ok(entries)
    }
}

/// Stable id for entries with neither guid nor link
fn fingerprint(title: &str, summary: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(summary.unwrap_or_default().as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

fn parse_pub_date(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "https://news.example.com/rss";

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Markets</title>
    <link>https://news.example.com</link>
    <description>Markets news</description>
    <item>
      <title>Gold hits a record</title>
      <link>https://news.example.com/gold</link>
      <guid>guid-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 +0000</pubDate>
      <description>Prices climbed overnight</description>
    </item>
    <item>
      <title>Oil slips</title>
      <link>https://news.example.com/oil</link>
    </item>
    <item>
      <title>Bare item</title>
      <description>Nothing to link to</description>
    </item>
  </channel>
</rss>"#;

    fn channel() -> rss::Channel {
        rss::Channel::read_from(XML.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_channel_extracts_entries() {
        let entries = RssFeedSource::parse_channel(&channel(), FEED);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "guid-1");
        assert_eq!(entries[0].title, "Gold hits a record");
        assert_eq!(entries[0].summary.as_deref(), Some("Prices climbed overnight"));
        assert_eq!(entries[0].published, Some(datetime!(2024-01-01 00:00 UTC)));
        assert_eq!(entries[0].feed, FEED);
    }

    #[test]
    fn test_id_falls_back_to_link_then_fingerprint() {
        let entries = RssFeedSource::parse_channel(&channel(), FEED);

        assert_eq!(entries[1].id, "https://news.example.com/oil");
        assert!(entries[1].published.is_none());

        assert!(entries[2].id.starts_with("sha256:"));
        assert_eq!(entries[2].id, fingerprint("Bare item", Some("Nothing to link to")));

        // Same content, same id across fetches
        let again = RssFeedSource::parse_channel(&channel(), FEED);
        assert_eq!(again[2].id, entries[2].id);
    }

    #[tokio::test]
    async fn test_fetch_entries() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(XML),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/rss", mock_server.uri());
        let entries = RssFeedSource::default().fetch_entries(&url).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].feed, url);
    }

    #[tokio::test]
    async fn test_fetch_entries_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not a feed</html>"))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let source = RssFeedSource::default();

        let broken = source
            .fetch_entries(&format!("{}/broken", mock_server.uri()))
            .await;
        assert!(matches!(broken, Err(SourceError::Parse(_))));

        let missing = source
            .fetch_entries(&format!("{}/missing", mock_server.uri()))
            .await;
        assert!(matches!(missing, Err(SourceError::Api(_))));
    }
}
