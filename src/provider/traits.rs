//! Collaborator contracts between the model and the code around it.
//!
//! The model itself never fetches, stores or invents ids. It asks these
//! collaborators, and they call back into the provider on the owner thread.

use std::cell::Cell;

use super::cursor::ModelCursor;
use crate::models::{Change, ContentId, RefreshRequest, TokenRequest};

/// Hands out fresh cursors by content id.
pub trait CursorProvider {
    /// A forward cursor over the current children of `content_id`, or `None`
    /// if no such feature exists.
    fn cursor_for(&self, content_id: &ContentId) -> Option<ModelCursor>;
}

/// Starts asynchronous fetches on behalf of a provider.
///
/// Implementations must not call back into the provider from inside these
/// methods; results are delivered later through
/// [`ModelProvider::on_token_page`](super::ModelProvider::on_token_page) and
/// friends.
pub trait RequestManager {
    fn request_token(&self, request: TokenRequest);

    fn request_refresh(&self, request: RefreshRequest);
}

/// Persists committed batches before they are applied.
///
/// A batch the journal rejects is not applied.
pub trait ChangeJournal {
    fn record(&self, session_id: &str, change: &Change) -> JournalResult<()>;

    fn finish(&self, session_id: &str) -> JournalResult<()>;
}

pub type JournalResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Source of new content ids.
pub trait ContentIdGenerator {
    fn next_id(&self) -> ContentId;
}

/// Random v4 UUID ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidContentIds;

impl ContentIdGenerator for UuidContentIds {
    fn next_id(&self) -> ContentId {
        ContentId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Deterministic `prefix#N` ids, numbered from zero.
#[derive(Debug)]
pub struct SequentialContentIds {
    prefix: String,
    next: Cell<u64>,
}

impl SequentialContentIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: Cell::new(0),
        }
    }
}

impl ContentIdGenerator for SequentialContentIds {
    fn next_id(&self) -> ContentId {
        let n = self.next.get();
        self.next.set(n + 1);
        ContentId::new(format!("{}#{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialContentIds::new("feature");
        assert_eq!(ids.next_id(), ContentId::from("feature#0"));
        assert_eq!(ids.next_id(), ContentId::from("feature#1"));
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidContentIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
