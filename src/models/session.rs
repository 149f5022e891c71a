use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A journaled model session.
///
/// Sessions are created when a provider first commits and are finished when the
/// provider is invalidated. Finished sessions keep their journal so they can be
/// replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub status: SessionStatus,
    /// Number of committed batches in the journal.
    pub change_count: i64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The status of a journaled session.
///
/// - `Active`: A provider is (or was last seen) bound to it
/// - `Finished`: The provider was invalidated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}
