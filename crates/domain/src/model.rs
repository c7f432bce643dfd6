//! Domain models and value objects

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Format used in schedule cells: `YYYY-MM-DD HH:MM`, always UTC
const SCHEDULE_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Format of the timestamp written after `OK` in the status column
const STATUS_STAMP_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

/// When an item may be published
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Schedule {
    /// No constraint, publish as soon as the item is seen
    #[default]
    Unset,
    /// Publish at or after this instant
    At(OffsetDateTime),
    /// The source held a value that could not be parsed
    Invalid(String),
}

impl Schedule {
    /// Parse a raw schedule cell.
    ///
    /// Blank input is `Unset`. `YYYY-MM-DD HH:MM` is read as UTC; RFC 3339 is
    /// accepted as well. Anything else is kept verbatim as `Invalid`.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();
        if value.is_empty() {
            return Self::Unset;
        }

        if let Ok(at) = PrimitiveDateTime::parse(value, SCHEDULE_FORMAT) {
            return Self::At(at.assume_utc());
        }

        if let Ok(at) =
            OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        {
            return Self::At(at);
        }

        Self::Invalid(value.to_string())
    }

    /// Render back to the cell format (`Invalid` keeps its raw text)
    pub fn to_cell(&self) -> String {
        match self {
            Self::Unset => String::new(),
            Self::At(at) => at
                .to_offset(time::UtcOffset::UTC)
                .format(SCHEDULE_FORMAT)
                .unwrap_or_default(),
            Self::Invalid(raw) => raw.clone(),
        }
    }
}

/// Processing status of an item, persisted as a fixed string convention
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ItemStatus {
    /// Not handled yet (blank cell)
    #[default]
    Pending,
    /// Published; the timestamp is absent when the cell could not be parsed
    Done { at: Option<OffsetDateTime> },
    /// Publishing failed, or the cell holds text we do not recognise
    Failed { reason: String },
}

impl ItemStatus {
    pub fn done(at: OffsetDateTime) -> Self {
        Self::Done { at: Some(at) }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Encode for the status column: `""`, `OK <stamp>` or `ERROR: <reason>`
    pub fn encode(&self) -> String {
        match self {
            Self::Pending => String::new(),
            Self::Done { at: Some(at) } => {
                let stamp = at
                    .to_offset(time::UtcOffset::UTC)
                    .format(STATUS_STAMP_FORMAT)
                    .unwrap_or_default();
                format!("OK {}", stamp)
            }
            Self::Done { at: None } => "OK".to_string(),
            Self::Failed { reason } => format!("ERROR: {}", reason),
        }
    }

    /// Decode a status cell. Decoding is total: unknown non-blank text is
    /// treated as `Failed` so the row stays excluded.
    pub fn decode(raw: &str) -> Self {
        let value = raw.trim();
        if value.is_empty() {
            return Self::Pending;
        }

        if let Some(rest) = strip_prefix_ignore_case(value, "ERROR") {
            let reason = rest.trim_start_matches(':').trim().to_string();
            return Self::Failed { reason };
        }

        if let Some(rest) = strip_prefix_ignore_case(value, "OK") {
            let at = PrimitiveDateTime::parse(rest.trim(), STATUS_STAMP_FORMAT)
                .ok()
                .map(PrimitiveDateTime::assume_utc);
            return Self::Done { at };
        }

        Self::Failed {
            reason: value.to_string(),
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// One unit of potential content
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Stable identifier, used as the dedup key
    pub id: String,
    /// Publication schedule
    pub schedule: Schedule,
    /// Ready-to-post text (or a short theme to expand)
    pub text: Option<String>,
    /// Title or theme hint
    pub title: Option<String>,
    /// Feed summary, if any
    pub summary: Option<String>,
    /// Link to the original content
    pub link: Option<String>,
    /// Image to attach
    pub image_url: Option<String>,
    /// Current status
    pub status: ItemStatus,
    /// Bypasses the publish interval (feed items only)
    pub breaking: bool,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// An entry read from a feed
#[derive(Debug, Clone)]
pub struct FeedEntry {
    /// guid, link or content fingerprint
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    /// Publication time reported by the feed
    pub published: Option<OffsetDateTime>,
    /// URL of the feed the entry came from
    pub feed: String,
}

impl FeedEntry {
    /// Convert into a pipeline item
    pub fn into_item(self, breaking: bool) -> Item {
        Item {
            id: self.id,
            schedule: Schedule::Unset,
            text: None,
            title: Some(self.title),
            summary: self.summary,
            link: self.link,
            image_url: None,
            status: ItemStatus::Pending,
            breaking,
        }
    }
}

/// Requested tone/length of a generated post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostStyle {
    /// Short note, 400-600 characters
    Brief,
    /// Mini analysis, 1000-1200 characters
    Analytical,
    /// Mostly brief, occasionally analytical
    #[default]
    Mixed,
}

/// Input for the text generator
#[derive(Debug, Clone)]
pub struct GenerateInput {
    /// Theme or source material for the post
    pub hint: String,
    pub style: PostStyle,
    /// Output language, e.g. "English"
    pub language: String,
    /// Hard ceiling on the generated text
    pub max_chars: Option<usize>,
}

/// Content ready for the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingPost {
    /// Item the post was produced from
    pub item_id: String,
    /// Message text or photo caption
    pub text: String,
    /// Photo to send with the text as caption
    pub image_url: Option<String>,
}

/// Processing result for a single item
#[derive(Debug)]
pub enum ProcessResult {
    /// Item was published (or would have been, in dry-run)
    Published {
        text: String,
        message_id: Option<String>,
    },
    /// Item was not eligible this cycle
    Skipped { reason: String },
    /// Publishing failed; the failure has been recorded
    Failed { error: String },
}
