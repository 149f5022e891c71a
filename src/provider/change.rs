use super::child::ModelChild;
use crate::models::ContentId;

/// Children appended to and removed from one feature by a committed batch.
///
/// Appended children keep the order they were added in. A child appended and
/// removed within the same batch cancels out and appears in neither list.
#[derive(Debug, Clone, Default)]
pub struct ChildChanges {
    appended: Vec<ModelChild>,
    removed: Vec<ModelChild>,
}

impl ChildChanges {
    pub fn appended_children(&self) -> &[ModelChild] {
        &self.appended
    }

    pub fn removed_children(&self) -> &[ModelChild] {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.appended.is_empty() && self.removed.is_empty()
    }

    fn append(&mut self, child: ModelChild) {
        self.appended.push(child);
    }

    fn remove(&mut self, child: ModelChild) {
        if let Some(pos) = self.appended.iter().position(|c| c.same_slot(&child)) {
            self.appended.remove(pos);
            return;
        }
        self.removed.push(child);
    }
}

/// Diff record for one feature, delivered to its observers and cursors.
#[derive(Debug, Clone)]
pub struct FeatureChange {
    content_id: ContentId,
    feature_changed: bool,
    child_changes: ChildChanges,
}

impl FeatureChange {
    pub fn new(content_id: impl Into<ContentId>) -> Self {
        Self {
            content_id: content_id.into(),
            feature_changed: false,
            child_changes: ChildChanges::default(),
        }
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// Whether the feature's own payload changed.
    pub fn is_feature_changed(&self) -> bool {
        self.feature_changed
    }

    pub fn set_feature_changed(&mut self, changed: bool) {
        self.feature_changed = changed;
    }

    pub fn child_changes(&self) -> &ChildChanges {
        &self.child_changes
    }

    pub fn append_child(&mut self, child: ModelChild) -> &mut Self {
        self.child_changes.append(child);
        self
    }

    pub fn remove_child(&mut self, child: ModelChild) -> &mut Self {
        self.child_changes.remove(child);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.feature_changed && self.child_changes.is_empty()
    }
}
