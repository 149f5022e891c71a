use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::change::FeatureChange;
use super::child::ModelChild;
use super::cursor::{ChildList, ModelCursor};
use super::observer::{FeatureChangeObserver, ObserverId, ObserverList};
use crate::models::ContentId;

struct FeatureInner {
    content_id: ContentId,
    parent_id: Option<ContentId>,
    payload: RefCell<Value>,
    children: Rc<RefCell<ChildList>>,
    observers: RefCell<ObserverList<dyn FeatureChangeObserver>>,
}

/// A node of the feed tree: a payload plus an ordered list of children.
///
/// `ModelFeature` is a shared handle. Features are created and changed only by
/// committed mutations; readers walk the children through cursors and learn
/// about changes through [`register_observer`](Self::register_observer).
#[derive(Clone)]
pub struct ModelFeature(Rc<FeatureInner>);

impl ModelFeature {
    pub fn new(content_id: impl Into<ContentId>, parent_id: Option<ContentId>, payload: Value) -> Self {
        Self::with_children(content_id, parent_id, payload, Vec::new())
    }

    pub fn with_children(
        content_id: impl Into<ContentId>,
        parent_id: Option<ContentId>,
        payload: Value,
        children: Vec<ModelChild>,
    ) -> Self {
        Self(Rc::new(FeatureInner {
            content_id: content_id.into(),
            parent_id,
            payload: RefCell::new(payload),
            children: Rc::new(RefCell::new(ChildList::new(children))),
            observers: RefCell::new(ObserverList::new()),
        }))
    }

    pub fn content_id(&self) -> &ContentId {
        &self.0.content_id
    }

    pub fn parent_id(&self) -> Option<&ContentId> {
        self.0.parent_id.as_ref()
    }

    /// The feature's payload as of the last commit.
    pub fn stream_feature(&self) -> Value {
        self.0.payload.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// Copy of the current child list.
    pub fn children(&self) -> Vec<ModelChild> {
        self.0.children.borrow().items().to_vec()
    }

    /// Forward cursor from the first child.
    pub fn get_cursor(&self) -> ModelCursor {
        self.cursor_at(0)
    }

    /// Cursor starting at `starting_child` (inclusive), walking forward or backward.
    ///
    /// Without a starting child the cursor starts at the first child (forward)
    /// or the last one (backward). Returns `None` if `starting_child` is not a
    /// child of this feature.
    pub fn get_directional_cursor(
        &self,
        forward: bool,
        starting_child: Option<&ContentId>,
    ) -> Option<ModelCursor> {
        let next = {
            let list = self.0.children.borrow();
            match starting_child {
                None if forward => 0,
                None => list.len(),
                Some(id) => {
                    let index = list.position_of(id)?;
                    if forward { index } else { index + 1 }
                }
            }
        };
        Some(ModelCursor::open(
            self.content_id().clone(),
            &self.0.children,
            next,
            forward,
        ))
    }

    pub fn register_observer(&self, observer: Rc<dyn FeatureChangeObserver>) -> ObserverId {
        self.0.observers.borrow_mut().register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.0.observers.borrow_mut().unregister(id)
    }

    /// Whether two handles refer to the same feature instance.
    pub fn same_feature(&self, other: &ModelFeature) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn cursor_at(&self, index: usize) -> ModelCursor {
        ModelCursor::open(self.content_id().clone(), &self.0.children, index, true)
    }

    pub(crate) fn position_of(&self, content_id: &ContentId) -> Option<usize> {
        self.0.children.borrow().position_of(content_id)
    }

    /// Replace the payload. Returns whether it actually changed.
    pub(crate) fn set_payload(&self, payload: Value) -> bool {
        let mut current = self.0.payload.borrow_mut();
        if *current == payload {
            return false;
        }
        *current = payload;
        true
    }

    pub(crate) fn apply_child_changes(&self, change: &FeatureChange) {
        self.0.children.borrow_mut().apply_change(change);
    }

    pub(crate) fn notify(&self, change: &FeatureChange) {
        let observers = self.0.observers.borrow().snapshot();
        for observer in observers {
            observer.on_change(change);
        }
    }

    /// Release children, cursors and observers when the node leaves the tree.
    pub(crate) fn detach(&self) {
        self.0.children.borrow_mut().detach();
        self.0.observers.borrow_mut().clear();
    }

    #[cfg(test)]
    pub(crate) fn open_cursor_count(&self) -> usize {
        self.0.children.borrow().cursor_count()
    }
}

impl fmt::Debug for ModelFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFeature")
            .field("content_id", self.content_id())
            .field("parent_id", &self.parent_id())
            .field("children", &self.child_count())
            .finish()
    }
}
