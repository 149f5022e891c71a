use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentId;

/// The kind of structural edit carried by a [`StreamStructure`].
///
/// - `ClearAll`: Drop every node, including the root
/// - `UpdateOrAppend`: Append a new child, or update the payload of an existing one
/// - `Remove`: Remove a child (and its subtree) from its parent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ClearAll,
    UpdateOrAppend,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearAll => "clear_all",
            Self::UpdateOrAppend => "update_or_append",
            Self::Remove => "remove",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "clear_all" => Some(Self::ClearAll),
            "update_or_append" => Some(Self::UpdateOrAppend),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Content bound to a node.
///
/// A structure without payload produces an unbound child: the slot exists in the
/// tree but its content has not arrived yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamPayload {
    /// Displayable content. The model never looks inside `data`.
    Feature { data: Value },
    /// A pagination boundary. `continuation` is handed back to the fetcher.
    Token { continuation: Value },
}

impl StreamPayload {
    pub fn feature(data: Value) -> Self {
        Self::Feature { data }
    }

    pub fn token(continuation: Value) -> Self {
        Self::Token { continuation }
    }
}

/// One ordered structural edit of the feed tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStructure {
    pub operation: Operation,
    /// Target node. Empty for `ClearAll`.
    pub content_id: ContentId,
    /// Parent of the target. `None` addresses the root.
    pub parent_content_id: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StreamPayload>,
}

impl StreamStructure {
    pub fn update_or_append(
        content_id: impl Into<ContentId>,
        parent_content_id: Option<ContentId>,
        payload: Option<StreamPayload>,
    ) -> Self {
        Self {
            operation: Operation::UpdateOrAppend,
            content_id: content_id.into(),
            parent_content_id,
            payload,
        }
    }

    pub fn remove(content_id: impl Into<ContentId>, parent_content_id: Option<ContentId>) -> Self {
        Self {
            operation: Operation::Remove,
            content_id: content_id.into(),
            parent_content_id,
            payload: None,
        }
    }

    pub fn clear_all() -> Self {
        Self {
            operation: Operation::ClearAll,
            content_id: ContentId::new(""),
            parent_content_id: None,
            payload: None,
        }
    }
}

/// Identity of the backing session a batch belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSession {
    pub session_id: String,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// A committed batch: ordered structure changes plus mutation-scoped metadata.
///
/// This is what a mutation hands to its committer. The batch is applied as a
/// unit; observers never see a partially applied `Change`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub structure_changes: Vec<StreamStructure>,
    /// Session the batch binds the provider to, if it starts or continues one.
    pub stream_session: Option<StreamSession>,
    /// Token whose resolution produced this batch.
    pub mutation_source_token: Option<ContentId>,
    /// Payloads in this batch were served from cache rather than fetched.
    pub has_cached_bindings: bool,
}
