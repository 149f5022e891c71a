//! The session's node index and batch application.
//!
//! `FeatureTree` maps every live content id to its slot. Applying a batch runs
//! each structure against the index, collects one [`FeatureChange`] per touched
//! feature, and only then writes the collected child diffs into the features'
//! child lists. Observers are notified by the provider afterwards, so no one
//! sees a half-applied batch.

use std::collections::HashMap;

use super::change::FeatureChange;
use super::child::{ChildBinding, ModelChild};
use super::feature::ModelFeature;
use super::token::ModelToken;
use crate::models::{
    Change, ContentId, FeatureTreeNode, NodeKind, Operation, StreamPayload, StreamStructure,
};

pub(crate) struct BatchOutcome {
    /// Non-empty diffs in the order their features were first touched.
    pub(crate) changes: Vec<(ModelFeature, FeatureChange)>,
    /// A parentless feature became the root during the batch.
    pub(crate) root_set: bool,
}

impl BatchOutcome {
    pub(crate) fn change_for(&self, content_id: &ContentId) -> Option<&FeatureChange> {
        self.changes
            .iter()
            .find(|(feature, _)| feature.content_id() == content_id)
            .map(|(_, change)| change)
    }
}

#[derive(Default)]
struct BatchDiff {
    entries: Vec<(ModelFeature, FeatureChange)>,
}

impl BatchDiff {
    fn entry(&mut self, feature: &ModelFeature) -> &mut FeatureChange {
        let pos = match self.entries.iter().position(|(f, _)| f.same_feature(feature)) {
            Some(pos) => pos,
            None => {
                self.entries
                    .push((feature.clone(), FeatureChange::new(feature.content_id().clone())));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }

    fn take(&mut self, feature: &ModelFeature) -> Option<FeatureChange> {
        let pos = self.entries.iter().position(|(f, _)| f.same_feature(feature))?;
        Some(self.entries.remove(pos).1)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

pub(crate) struct FeatureTree {
    nodes: HashMap<ContentId, ModelChild>,
    root: Option<ModelFeature>,
}

impl FeatureTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            root: None,
        }
    }

    pub(crate) fn root(&self) -> Option<&ModelFeature> {
        self.root.as_ref()
    }

    pub(crate) fn child(&self, content_id: &ContentId) -> Option<&ModelChild> {
        self.nodes.get(content_id)
    }

    pub(crate) fn feature(&self, content_id: &ContentId) -> Option<ModelFeature> {
        self.nodes.get(content_id)?.model_feature().ok()
    }

    pub(crate) fn token(&self, content_id: &ContentId) -> Option<ModelToken> {
        self.nodes.get(content_id)?.model_token().ok()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn apply(&mut self, change: &Change) -> BatchOutcome {
        let mut diff = BatchDiff::default();
        let mut root_set = false;

        for structure in &change.structure_changes {
            match structure.operation {
                Operation::ClearAll => {
                    self.clear();
                    diff.clear();
                    root_set = false;
                }
                Operation::UpdateOrAppend => {
                    root_set |= self.update_or_append(structure, &mut diff);
                }
                Operation::Remove => self.remove(structure, &mut diff),
            }
        }

        let changes: Vec<(ModelFeature, FeatureChange)> = diff
            .entries
            .into_iter()
            .filter(|(_, change)| !change.is_empty())
            .collect();
        for (feature, feature_change) in &changes {
            feature.apply_child_changes(feature_change);
        }

        BatchOutcome { changes, root_set }
    }

    /// Detach every feature and forget all nodes.
    pub(crate) fn clear(&mut self) {
        for child in self.nodes.values() {
            if let Ok(feature) = child.model_feature() {
                feature.detach();
            }
        }
        self.nodes.clear();
        self.root = None;
    }

    pub(crate) fn snapshot(&self) -> Option<FeatureTreeNode> {
        let root = self.root.as_ref()?;
        let slot = self.nodes.get(root.content_id())?;
        Some(snapshot_child(slot))
    }

    /// Returns whether the structure installed a new root.
    fn update_or_append(&mut self, structure: &StreamStructure, diff: &mut BatchDiff) -> bool {
        let content_id = &structure.content_id;
        let parent_id = structure.parent_content_id.clone();

        if let Some(existing) = self.nodes.get(content_id).cloned() {
            self.update_existing(&existing, structure.payload.clone(), diff);
            return false;
        }

        let child = match &structure.payload {
            Some(StreamPayload::Feature { data }) => ModelChild::feature(ModelFeature::new(
                content_id.clone(),
                parent_id.clone(),
                data.clone(),
            )),
            Some(StreamPayload::Token { continuation }) => ModelChild::token(ModelToken::new(
                content_id.clone(),
                parent_id.clone(),
                continuation.clone(),
            )),
            None => ModelChild::unbound(content_id.clone(), parent_id.clone()),
        };

        let Some(parent_id) = parent_id else {
            let Ok(feature) = child.model_feature() else {
                tracing::warn!(
                    content_id = %content_id,
                    kind = %child.kind(),
                    "Root must be a bound feature, skipping"
                );
                return false;
            };
            if let Some(old_root) = self.root.take() {
                tracing::debug!(old = %old_root.content_id(), new = %content_id, "Replacing root");
                match self.nodes.get(old_root.content_id()).cloned() {
                    Some(old_slot) => self.drop_subtree(&old_slot, diff),
                    None => old_root.detach(),
                }
            }
            self.nodes.insert(content_id.clone(), child);
            self.root = Some(feature);
            return true;
        };

        let Some(parent) = self.feature(&parent_id) else {
            tracing::warn!(
                content_id = %content_id,
                parent_id = %parent_id,
                "Parent is missing or not a feature, skipping"
            );
            return false;
        };
        self.nodes.insert(content_id.clone(), child.clone());
        diff.entry(&parent).append_child(child);
        false
    }

    fn update_existing(
        &mut self,
        existing: &ModelChild,
        payload: Option<StreamPayload>,
        diff: &mut BatchDiff,
    ) {
        let Some(payload) = payload else {
            tracing::debug!(content_id = %existing.content_id(), "Update without payload, nothing to do");
            return;
        };

        match (existing.binding(), payload) {
            (ChildBinding::Feature(feature), StreamPayload::Feature { data }) => {
                if feature.set_payload(data) {
                    diff.entry(&feature).set_feature_changed(true);
                }
            }
            (ChildBinding::Unbound, StreamPayload::Feature { data }) => {
                let feature = ModelFeature::new(
                    existing.content_id().clone(),
                    existing.parent_id().cloned(),
                    data,
                );
                existing.bind(ChildBinding::Feature(feature));
            }
            (ChildBinding::Unbound, StreamPayload::Token { continuation }) => {
                let token = ModelToken::new(
                    existing.content_id().clone(),
                    existing.parent_id().cloned(),
                    continuation,
                );
                existing.bind(ChildBinding::Token(token));
            }
            (ChildBinding::Token(_), StreamPayload::Token { .. }) => {
                tracing::debug!(content_id = %existing.content_id(), "Token already bound");
            }
            (binding, payload) => {
                let new_kind = match payload {
                    StreamPayload::Feature { .. } => NodeKind::Feature,
                    StreamPayload::Token { .. } => NodeKind::Token,
                };
                tracing::warn!(
                    content_id = %existing.content_id(),
                    current = %binding_kind(&binding),
                    requested = %new_kind,
                    "Content kind cannot change in place, skipping"
                );
            }
        }
    }

    fn remove(&mut self, structure: &StreamStructure, diff: &mut BatchDiff) {
        let Some(child) = self.nodes.get(&structure.content_id).cloned() else {
            tracing::debug!(content_id = %structure.content_id, "Remove of unknown child, skipping");
            return;
        };
        if structure.parent_content_id.as_ref() != child.parent_id() {
            tracing::warn!(
                content_id = %child.content_id(),
                "Remove names a different parent than the tree, using the tree's"
            );
        }

        match child.parent_id().and_then(|parent_id| self.feature(parent_id)) {
            Some(parent) => {
                diff.entry(&parent).remove_child(child.clone());
            }
            None => {
                let is_root = self
                    .root
                    .as_ref()
                    .is_some_and(|root| root.content_id() == child.content_id());
                if is_root {
                    self.root = None;
                }
            }
        }
        self.drop_subtree(&child, diff);
    }

    /// Forget `child` and everything below it, including children appended
    /// earlier in the current batch.
    fn drop_subtree(&mut self, child: &ModelChild, diff: &mut BatchDiff) {
        if self.is_current(child) {
            self.nodes.remove(child.content_id());
        }
        let Ok(feature) = child.model_feature() else {
            return;
        };

        let mut descendants = feature.children();
        if let Some(pending) = diff.take(&feature) {
            descendants.extend(pending.child_changes().appended_children().iter().cloned());
        }
        for descendant in &descendants {
            if self.is_current(descendant) {
                self.drop_subtree(descendant, diff);
            }
        }
        feature.detach();
    }

    fn is_current(&self, child: &ModelChild) -> bool {
        self.nodes
            .get(child.content_id())
            .is_some_and(|slot| slot.same_slot(child))
    }
}

fn binding_kind(binding: &ChildBinding) -> NodeKind {
    match binding {
        ChildBinding::Feature(_) => NodeKind::Feature,
        ChildBinding::Token(_) => NodeKind::Token,
        ChildBinding::Unbound => NodeKind::Unbound,
    }
}

fn snapshot_child(child: &ModelChild) -> FeatureTreeNode {
    match child.binding() {
        ChildBinding::Feature(feature) => FeatureTreeNode {
            content_id: child.content_id().clone(),
            kind: NodeKind::Feature,
            data: Some(feature.stream_feature()),
            children: feature.children().iter().map(snapshot_child).collect(),
        },
        ChildBinding::Token(token) => FeatureTreeNode {
            content_id: child.content_id().clone(),
            kind: NodeKind::Token,
            data: Some(token.continuation().clone()),
            children: Vec::new(),
        },
        ChildBinding::Unbound => FeatureTreeNode {
            content_id: child.content_id().clone(),
            kind: NodeKind::Unbound,
            data: None,
            children: Vec::new(),
        },
    }
}
