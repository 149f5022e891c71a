use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::ContentId;
use super::structure::StreamStructure;

/// Request to fetch the page behind a pagination token.
///
/// Only owned, `Send` data crosses the async boundary; the token itself stays
/// on the owner thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token_id: ContentId,
    /// Feature the fetched children will be appended to.
    pub parent_id: Option<ContentId>,
    pub continuation: Value,
    pub session_id: Option<String>,
}

/// Request to rebuild the whole model from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub session_id: Option<String>,
}

/// Result of a token fetch: the structures that replace the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPage {
    pub token_id: ContentId,
    pub structures: Vec<StreamStructure>,
}
