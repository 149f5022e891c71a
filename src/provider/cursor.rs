//! Live cursors over a feature's children.
//!
//! Each feature owns exactly one [`ChildList`]: the ordered children plus a
//! table of cursor positions. Cursors keep only a weak reference and a slot key,
//! so a structural update touches one list and every open cursor's position is
//! fixed up in the same place.
//!
//! A slot's `next` is the index of the next item for a forward cursor and one
//! past the next item for a backward cursor. With that convention a removal at
//! index `r` shifts a cursor down exactly when `r < next`, in both directions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::change::FeatureChange;
use super::child::ModelChild;
use crate::models::ContentId;

#[derive(Debug, Clone, Copy)]
struct CursorSlot {
    next: usize,
    forward: bool,
    exhausted: bool,
}

pub(crate) struct ChildList {
    items: Vec<ModelChild>,
    cursors: HashMap<u64, CursorSlot>,
    next_slot: u64,
}

impl ChildList {
    pub(crate) fn new(items: Vec<ModelChild>) -> Self {
        Self {
            items,
            cursors: HashMap::new(),
            next_slot: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn items(&self) -> &[ModelChild] {
        &self.items
    }

    #[cfg(test)]
    pub(crate) fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub(crate) fn position_of(&self, content_id: &ContentId) -> Option<usize> {
        self.items.iter().position(|c| c.content_id() == content_id)
    }

    fn open(&mut self, next: usize, forward: bool) -> u64 {
        let key = self.next_slot;
        self.next_slot += 1;
        self.cursors.insert(
            key,
            CursorSlot {
                next,
                forward,
                exhausted: false,
            },
        );
        key
    }

    fn close(&mut self, key: u64) {
        self.cursors.remove(&key);
    }

    fn at_end(&mut self, key: u64) -> bool {
        let len = self.items.len();
        let Some(slot) = self.cursors.get_mut(&key) else {
            return true;
        };
        if !slot.exhausted {
            let has_more = if slot.forward { slot.next < len } else { slot.next > 0 };
            slot.exhausted = !has_more;
        }
        slot.exhausted
    }

    fn advance(&mut self, key: u64) -> Option<ModelChild> {
        if self.at_end(key) {
            return None;
        }
        let slot = self.cursors.get_mut(&key)?;
        let index = if slot.forward {
            slot.next += 1;
            slot.next - 1
        } else {
            slot.next -= 1;
            slot.next
        };
        self.items.get(index).cloned()
    }

    /// Apply a feature's child diff: removals first, then appends.
    ///
    /// Removals are matched by content id and appends already present are
    /// skipped, so applying the same change twice leaves the list as it was
    /// after the first application.
    pub(crate) fn apply_change(&mut self, change: &FeatureChange) {
        for removed in change.child_changes().removed_children() {
            if let Some(index) = self.position_of(removed.content_id()) {
                self.items.remove(index);
                for slot in self.cursors.values_mut() {
                    if index < slot.next {
                        slot.next -= 1;
                    }
                }
            }
        }
        for appended in change.child_changes().appended_children() {
            if self.position_of(appended.content_id()).is_none() {
                self.items.push(appended.clone());
            }
        }
    }

    /// Drop all children and exhaust every open cursor.
    pub(crate) fn detach(&mut self) {
        self.items.clear();
        for slot in self.cursors.values_mut() {
            slot.exhausted = true;
        }
    }
}

/// A stateful iterator over one feature's children that follows later commits.
///
/// Appends land at the end of the list and are seen by forward cursors that
/// are not yet exhausted. Removed children are never returned, and items
/// already consumed are never returned twice.
///
/// Exhaustion is sticky: once [`is_at_end`](Self::is_at_end) has returned
/// `true`, [`get_next_item`](Self::get_next_item) has returned `None`, or the
/// cursor was released, children appended later are not delivered to it.
pub struct ModelCursor {
    parent_id: ContentId,
    list: Weak<RefCell<ChildList>>,
    slot: Option<u64>,
}

impl ModelCursor {
    pub(crate) fn open(
        parent_id: ContentId,
        list: &Rc<RefCell<ChildList>>,
        next: usize,
        forward: bool,
    ) -> Self {
        let slot = list.borrow_mut().open(next, forward);
        Self {
            parent_id,
            list: Rc::downgrade(list),
            slot: Some(slot),
        }
    }

    /// A cursor that is already at its end.
    pub(crate) fn exhausted(parent_id: ContentId) -> Self {
        Self {
            parent_id,
            list: Weak::new(),
            slot: None,
        }
    }

    /// Content id of the feature whose children this cursor walks.
    pub fn parent_id(&self) -> &ContentId {
        &self.parent_id
    }

    pub fn get_next_item(&mut self) -> Option<ModelChild> {
        let slot = self.slot?;
        let list = self.list.upgrade()?;
        let item = list.borrow_mut().advance(slot);
        item
    }

    pub fn is_at_end(&self) -> bool {
        let (Some(slot), Some(list)) = (self.slot, self.list.upgrade()) else {
            return true;
        };
        let at_end = list.borrow_mut().at_end(slot);
        at_end
    }

    /// Apply a structural change of the parent feature to the shared list.
    ///
    /// Changes addressed to another feature are ignored. Commits already run
    /// this for every open cursor, and repeating it is harmless.
    pub fn update_iterator(&self, change: &FeatureChange) {
        if change.content_id() != &self.parent_id {
            tracing::debug!(
                cursor_parent = %self.parent_id,
                change_target = %change.content_id(),
                "Ignoring change for another feature"
            );
            return;
        }
        if let Some(list) = self.list.upgrade() {
            list.borrow_mut().apply_change(change);
        }
    }

    /// Exhaust the cursor and drop its hold on the list. Idempotent.
    pub fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            if let Some(list) = self.list.upgrade() {
                list.borrow_mut().close(slot);
            }
        }
        self.list = Weak::new();
    }

    pub fn is_released(&self) -> bool {
        self.slot.is_none()
    }

    #[cfg(test)]
    fn backing_ids(&self) -> Vec<String> {
        self.list
            .upgrade()
            .map(|list| {
                list.borrow()
                    .items()
                    .iter()
                    .map(|c| c.content_id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Iterator for ModelCursor {
    type Item = ModelChild;

    fn next(&mut self) -> Option<ModelChild> {
        self.get_next_item()
    }
}

impl Drop for ModelCursor {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ModelCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCursor")
            .field("parent_id", &self.parent_id)
            .field("released", &self.is_released())
            .finish()
    }
}
