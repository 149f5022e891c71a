use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentId;

/// What a tree slot currently holds.
///
/// - `Feature`: Bound content
/// - `Token`: An unresolved pagination boundary
/// - `Unbound`: A slot whose content has not arrived yet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Feature,
    Token,
    Unbound,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Token => "token",
            Self::Unbound => "unbound",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time copy of a subtree, used for rendering and inspection.
///
/// Unlike live features, snapshots are plain data and can be serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTreeNode {
    pub content_id: ContentId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub children: Vec<FeatureTreeNode>,
}

impl FeatureTreeNode {
    /// Human-readable label: the payload's `title` field when present, else the id.
    pub fn label(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.content_id.to_string())
    }
}
