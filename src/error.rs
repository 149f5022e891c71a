use thiserror::Error;

use crate::models::{ContentId, NodeKind};

/// Errors raised by the live model.
///
/// These are state-consistency violations and are reported at the call site.
/// Navigation misses (unknown child, unmatched cursor start) are not errors;
/// those calls return `None`.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model provider has been invalidated")]
    Invalidated,

    #[error("mutation has already been committed")]
    MutationAlreadyCommitted,

    #[error("child {content_id} is a {actual}, not a {expected}")]
    WrongChildType {
        content_id: ContentId,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("token {0} has already been resolved")]
    TokenAlreadyResolved(ContentId),

    #[error("unknown token: {0}")]
    UnknownToken(ContentId),

    #[error("change journal rejected batch: {0}")]
    Journal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
