use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::models::{Change, ContentId, StreamPayload, StreamSession, StreamStructure};

/// Receives committed batches.
///
/// The provider's own committer journals the batch, applies it to the tree and
/// notifies observers. Tests and alternative stores can supply their own.
pub trait Committer {
    fn commit(&self, change: Change) -> Result<()>;
}

/// Builder for one batch of structural edits.
///
/// Edits are kept in the order they are added and handed to the committer as a
/// single [`Change`]. A mutation commits at most once; a failed commit still
/// consumes it.
pub struct ModelMutation {
    change: Change,
    committer: Rc<dyn Committer>,
    committed: bool,
}

impl ModelMutation {
    pub fn new(committer: Rc<dyn Committer>) -> Self {
        Self {
            change: Change::default(),
            committer,
            committed: false,
        }
    }

    /// Append `content_id` under `parent`. Without payload the child is unbound.
    pub fn add_child(
        &mut self,
        content_id: impl Into<ContentId>,
        parent: Option<ContentId>,
        payload: Option<StreamPayload>,
    ) -> &mut Self {
        self.push(StreamStructure::update_or_append(content_id, parent, payload))
    }

    /// Replace the payload of an existing child, binding it if it was unbound.
    pub fn update_child(
        &mut self,
        content_id: impl Into<ContentId>,
        parent: Option<ContentId>,
        payload: StreamPayload,
    ) -> &mut Self {
        self.push(StreamStructure::update_or_append(content_id, parent, Some(payload)))
    }

    pub fn remove_child(
        &mut self,
        content_id: impl Into<ContentId>,
        parent: Option<ContentId>,
    ) -> &mut Self {
        self.push(StreamStructure::remove(content_id, parent))
    }

    /// Drop the whole tree before the edits that follow.
    pub fn clear_all(&mut self) -> &mut Self {
        self.push(StreamStructure::clear_all())
    }

    pub fn push(&mut self, structure: StreamStructure) -> &mut Self {
        self.change.structure_changes.push(structure);
        self
    }

    pub fn set_mutation_source_token(&mut self, token_id: impl Into<ContentId>) -> &mut Self {
        self.change.mutation_source_token = Some(token_id.into());
        self
    }

    pub fn set_stream_session(&mut self, session: StreamSession) -> &mut Self {
        self.change.stream_session = Some(session);
        self
    }

    pub fn has_cached_bindings(&mut self, cached: bool) -> &mut Self {
        self.change.has_cached_bindings = cached;
        self
    }

    /// Append a whole batch. Its metadata replaces what is set here when present.
    pub fn extend(&mut self, change: Change) -> &mut Self {
        self.change.structure_changes.extend(change.structure_changes);
        if change.stream_session.is_some() {
            self.change.stream_session = change.stream_session;
        }
        if change.mutation_source_token.is_some() {
            self.change.mutation_source_token = change.mutation_source_token;
        }
        self.change.has_cached_bindings |= change.has_cached_bindings;
        self
    }

    /// The batch accumulated so far.
    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(ModelError::MutationAlreadyCommitted);
        }
        self.committed = true;
        let change = std::mem::take(&mut self.change);
        tracing::debug!(
            structures = change.structure_changes.len(),
            source_token = ?change.mutation_source_token,
            "Committing mutation"
        );
        self.committer.commit(change)
    }
}
