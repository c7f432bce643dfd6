//! Channel length caps and truncation

use crate::model::OutgoingPost;

/// Telegram caps photo captions at 1024 characters
pub const CAPTION_MAX_CHARS: usize = 1024;

/// Telegram caps plain messages at 4096 characters
pub const MESSAGE_MAX_CHARS: usize = 4096;

/// Length limits of the target medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLimits {
    /// Maximum caption length when an image is attached
    pub caption_max_chars: usize,
    /// Maximum length of a plain text message
    pub message_max_chars: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            caption_max_chars: CAPTION_MAX_CHARS,
            message_max_chars: MESSAGE_MAX_CHARS,
        }
    }
}

impl MessageLimits {
    /// Cap that applies to a post with or without an image
    pub fn cap_for(&self, has_image: bool) -> usize {
        if has_image {
            self.caption_max_chars
        } else {
            self.message_max_chars
        }
    }
}

/// Cut `text` to at most `max_chars` characters (not bytes)
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Build the outgoing post, silently truncating the text to the medium's cap.
///
/// A blank image URL counts as no image.
pub fn compose_post(
    item_id: &str,
    text: &str,
    image_url: Option<&str>,
    limits: &MessageLimits,
) -> OutgoingPost {
    let image_url = image_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from);

    let cap = limits.cap_for(image_url.is_some());
    let text = text.trim();
    let original_chars = text.chars().count();
    let text = truncate_chars(text, cap);

    if original_chars > cap {
        tracing::debug!(
            item_id = %item_id,
            original_chars,
            cap,
            "Truncated post text to fit channel limit"
        );
    }

    OutgoingPost {
        item_id: item_id.to_string(),
        text,
        image_url,
    }
}
