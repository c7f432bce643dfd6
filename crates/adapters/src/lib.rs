//! autopost adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `table`: Google Sheets (token or service account) and SQLite tables of scheduled posts
//! - `feed`: RSS feed source
//! - `state`: SQLite and in-memory seen stores
//! - `llm`: LLM provider adapters (OpenAI, Anthropic, Ollama, stub)
//! - `telegram`: Telegram channel publisher

mod rss_feed;
mod sheets;
mod sheets_auth;
mod state_memory;
mod state_sqlite;
mod table_sqlite;

pub mod llm;
pub mod telegram;

/// Re-exports for table adapters
pub mod table {
    pub use crate::sheets::{GoogleSheetsStore, SheetColumns, SheetsConfig};
    pub use crate::sheets_auth::{ServiceAccountKey, SheetsAuth};
    pub use crate::table_sqlite::{NewPost, SqliteTableStore};
}

/// Re-exports for feed adapters
pub mod feed {
    pub use crate::rss_feed::RssFeedSource;
}

/// Re-exports for state adapters
pub mod state {
    pub use crate::state_memory::BoundedSeenStore;
    pub use crate::state_sqlite::SqliteSeenStore;
}
