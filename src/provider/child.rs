use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::feature::ModelFeature;
use super::token::ModelToken;
use crate::error::{ModelError, Result};
use crate::models::{ContentId, NodeKind};

#[derive(Clone)]
pub(crate) enum ChildBinding {
    Feature(ModelFeature),
    Token(ModelToken),
    Unbound,
}

impl ChildBinding {
    fn kind(&self) -> NodeKind {
        match self {
            Self::Feature(_) => NodeKind::Feature,
            Self::Token(_) => NodeKind::Token,
            Self::Unbound => NodeKind::Unbound,
        }
    }
}

struct ChildEntry {
    content_id: ContentId,
    parent_id: Option<ContentId>,
    binding: RefCell<ChildBinding>,
}

/// A slot in a feature's child list.
///
/// A child is a cheap shared handle: the same slot is held by the parent's
/// child list, by the session's id index and by anything a cursor handed out.
/// Binding an unbound slot later is therefore visible through every handle.
///
/// [`kind`](Self::kind) decides which accessor is valid. Asking a token slot
/// for its feature (or the reverse) is a [`ModelError::WrongChildType`].
#[derive(Clone)]
pub struct ModelChild(Rc<ChildEntry>);

impl ModelChild {
    /// A slot whose content has not been delivered yet.
    pub fn unbound(content_id: impl Into<ContentId>, parent_id: Option<ContentId>) -> Self {
        Self::with_binding(content_id.into(), parent_id, ChildBinding::Unbound)
    }

    pub fn feature(feature: ModelFeature) -> Self {
        let content_id = feature.content_id().clone();
        let parent_id = feature.parent_id().cloned();
        Self::with_binding(content_id, parent_id, ChildBinding::Feature(feature))
    }

    pub fn token(token: ModelToken) -> Self {
        let content_id = token.content_id().clone();
        let parent_id = token.parent_id().cloned();
        Self::with_binding(content_id, parent_id, ChildBinding::Token(token))
    }

    fn with_binding(
        content_id: ContentId,
        parent_id: Option<ContentId>,
        binding: ChildBinding,
    ) -> Self {
        Self(Rc::new(ChildEntry {
            content_id,
            parent_id,
            binding: RefCell::new(binding),
        }))
    }

    pub fn content_id(&self) -> &ContentId {
        &self.0.content_id
    }

    pub fn parent_id(&self) -> Option<&ContentId> {
        self.0.parent_id.as_ref()
    }

    pub fn kind(&self) -> NodeKind {
        self.0.binding.borrow().kind()
    }

    pub fn model_feature(&self) -> Result<ModelFeature> {
        match &*self.0.binding.borrow() {
            ChildBinding::Feature(feature) => Ok(feature.clone()),
            other => Err(self.wrong_type(NodeKind::Feature, other.kind())),
        }
    }

    pub fn model_token(&self) -> Result<ModelToken> {
        match &*self.0.binding.borrow() {
            ChildBinding::Token(token) => Ok(token.clone()),
            other => Err(self.wrong_type(NodeKind::Token, other.kind())),
        }
    }

    /// Whether two handles refer to the same slot (not merely the same id).
    pub fn same_slot(&self, other: &ModelChild) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn binding(&self) -> ChildBinding {
        self.0.binding.borrow().clone()
    }

    pub(crate) fn bind(&self, binding: ChildBinding) {
        *self.0.binding.borrow_mut() = binding;
    }

    fn wrong_type(&self, expected: NodeKind, actual: NodeKind) -> ModelError {
        ModelError::WrongChildType {
            content_id: self.content_id().clone(),
            expected,
            actual,
        }
    }
}

impl fmt::Debug for ModelChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelChild")
            .field("content_id", self.content_id())
            .field("parent_id", &self.parent_id())
            .field("kind", &self.kind())
            .finish()
    }
}
