//! Runtime configuration, read from the environment.

use std::path::PathBuf;

use anyhow::Result;

use crate::db::SessionStore;

/// Page size used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Where the session journal lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// The platform data directory (`feed-model.db`).
    Default,
    Path(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub store: StoreLocation,
    /// Record committed batches in the store.
    pub journal: bool,
    /// Children per fixture page before a continuation token is emitted.
    pub page_size: usize,
}

impl FeedConfig {
    /// Read `FEED_MODEL_DB`, `FEED_MODEL_JOURNAL` and `FEED_MODEL_PAGE_SIZE`.
    pub fn from_env() -> Self {
        let store = std::env::var("FEED_MODEL_DB")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| match s.trim() {
                ":memory:" => StoreLocation::Memory,
                path => StoreLocation::Path(PathBuf::from(path)),
            })
            .unwrap_or(StoreLocation::Default);

        let journal = std::env::var("FEED_MODEL_JOURNAL")
            .map(|s| parse_flag(&s))
            .unwrap_or(true);

        let page_size = std::env::var("FEED_MODEL_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Self {
            store,
            journal,
            page_size,
        }
    }

    /// In-memory store, journaling on (for tests).
    pub fn in_memory() -> Self {
        Self {
            store: StoreLocation::Memory,
            journal: true,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Open and migrate the configured store.
    pub fn open_store(&self) -> Result<SessionStore> {
        let store = match &self.store {
            StoreLocation::Default => SessionStore::open_default()?,
            StoreLocation::Path(path) => SessionStore::open(path.clone())?,
            StoreLocation::Memory => SessionStore::open_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
