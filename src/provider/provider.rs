use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::child::ModelChild;
use super::cursor::ModelCursor;
use super::feature::ModelFeature;
use super::mutation::{Committer, ModelMutation};
use super::observer::{ModelProviderObserver, ObserverId, ObserverList};
use super::token::{ModelToken, TokenCompleted, TokenState};
use super::traits::{ChangeJournal, CursorProvider, RequestManager};
use super::tree::{BatchOutcome, FeatureTree};
use crate::error::{ModelError, Result};
use crate::models::{Change, ContentId, FeatureTreeNode, RefreshRequest, StreamStructure, TokenPage};

/// Lifecycle of a provider.
///
/// - `Initializing`: Created, no root yet
/// - `Ready`: A root exists; observers have seen `on_session_start`
/// - `Invalidated`: Terminal; every call except `invalidate` fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Initializing,
    Ready,
    Invalidated,
}

struct ProviderInner {
    state: Cell<ProviderState>,
    session_id: RefCell<Option<String>>,
    tree: RefCell<FeatureTree>,
    observers: RefCell<ObserverList<dyn ModelProviderObserver>>,
    requests: Rc<dyn RequestManager>,
    journal: Option<Rc<dyn ChangeJournal>>,
}

/// Session-scoped facade over the feed tree.
///
/// The provider owns the session's nodes, hands out mutations whose commits
/// are applied here, drives the `Initializing → Ready → Invalidated`
/// lifecycle and resolves pagination tokens through its [`RequestManager`].
///
/// Providers are single-threaded (`!Send`). Async work happens in the request
/// manager; results come back through [`on_token_page`](Self::on_token_page)
/// and [`on_token_failed`](Self::on_token_failed) on the owner thread.
#[derive(Clone)]
pub struct ModelProvider {
    inner: Rc<ProviderInner>,
}

impl ModelProvider {
    pub fn new(requests: Rc<dyn RequestManager>) -> Self {
        Self::build(requests, None)
    }

    /// A provider that records every batch in `journal` before applying it.
    pub fn with_journal(requests: Rc<dyn RequestManager>, journal: Rc<dyn ChangeJournal>) -> Self {
        Self::build(requests, Some(journal))
    }

    fn build(requests: Rc<dyn RequestManager>, journal: Option<Rc<dyn ChangeJournal>>) -> Self {
        Self {
            inner: Rc::new(ProviderInner {
                state: Cell::new(ProviderState::Initializing),
                session_id: RefCell::new(None),
                tree: RefCell::new(FeatureTree::new()),
                observers: RefCell::new(ObserverList::new()),
                requests,
                journal,
            }),
        }
    }

    pub fn state(&self) -> ProviderState {
        self.inner.state.get()
    }

    /// Session the provider is bound to, once a batch has named one.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.borrow().clone()
    }

    /// Start a batch of edits that commits into this provider.
    pub fn edit(&self) -> Result<ModelMutation> {
        self.ensure_valid()?;
        let committer = ProviderCommitter {
            provider: Rc::downgrade(&self.inner),
        };
        Ok(ModelMutation::new(Rc::new(committer)))
    }

    /// Commit a batch that arrived whole, from the source or a journal.
    pub fn apply(&self, change: Change) -> Result<()> {
        let mut mutation = self.edit()?;
        mutation.extend(change);
        mutation.commit()
    }

    pub fn root_feature(&self) -> Result<Option<ModelFeature>> {
        self.ensure_valid()?;
        Ok(self.inner.tree.borrow().root().cloned())
    }

    /// Look up any node by id. Unknown ids are `None`, not an error.
    pub fn get_model_child(&self, content_id: &ContentId) -> Result<Option<ModelChild>> {
        self.ensure_valid()?;
        Ok(self.inner.tree.borrow().child(content_id).cloned())
    }

    /// Point-in-time copy of the whole tree, `None` before a root exists.
    pub fn snapshot(&self) -> Result<Option<FeatureTreeNode>> {
        self.ensure_valid()?;
        Ok(self.inner.tree.borrow().snapshot())
    }

    /// Register for lifecycle callbacks.
    ///
    /// If the session has already started, `on_session_start` is delivered
    /// before this returns.
    pub fn register_observer(&self, observer: Rc<dyn ModelProviderObserver>) -> Result<ObserverId> {
        self.ensure_valid()?;
        let id = self
            .inner
            .observers
            .borrow_mut()
            .register(Rc::clone(&observer));
        if self.state() == ProviderState::Ready {
            observer.on_session_start();
        }
        Ok(id)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> Result<bool> {
        self.ensure_valid()?;
        Ok(self.inner.observers.borrow_mut().unregister(id))
    }

    /// Ask the request manager for the page behind `token`.
    ///
    /// Asking again while the first request is in flight does nothing. Asking
    /// for a token that already resolved is [`ModelError::TokenAlreadyResolved`].
    pub fn handle_token(&self, token: &ModelToken) -> Result<()> {
        self.ensure_valid()?;
        let known = self
            .inner
            .tree
            .borrow()
            .token(token.content_id())
            .is_some_and(|t| t.same_token(token));
        if !known && !token.is_resolved() {
            return Err(ModelError::UnknownToken(token.content_id().clone()));
        }

        match token.state() {
            TokenState::Resolved => Err(ModelError::TokenAlreadyResolved(
                token.content_id().clone(),
            )),
            TokenState::Requested => {
                tracing::debug!(token = %token.content_id(), "Token request already in flight");
                Ok(())
            }
            TokenState::Pending => {
                token.set_state(TokenState::Requested);
                tracing::info!(token = %token.content_id(), "Requesting token page");
                self.inner
                    .requests
                    .request_token(token.to_request(self.session_id()));
                Ok(())
            }
        }
    }

    /// Deliver the page fetched for a token.
    ///
    /// The token is removed and the page's structures are committed in one
    /// batch with the token as mutation source, which resolves it. Pages for
    /// tokens that are no longer in the tree, and pages arriving after
    /// invalidation, are dropped.
    pub fn on_token_page(&self, page: TokenPage) -> Result<()> {
        if self.state() == ProviderState::Invalidated {
            tracing::debug!(token = %page.token_id, "Provider invalidated, dropping late page");
            return Ok(());
        }
        let Some(token) = self.inner.tree.borrow().token(&page.token_id) else {
            tracing::debug!(token = %page.token_id, "Token no longer in tree, dropping page");
            return Ok(());
        };
        if token.state() != TokenState::Requested {
            tracing::debug!(
                token = %page.token_id,
                state = ?token.state(),
                "Token has no request in flight, dropping page"
            );
            return Ok(());
        }

        let mut structure_changes = Vec::with_capacity(page.structures.len() + 1);
        structure_changes.push(StreamStructure::remove(
            token.content_id().clone(),
            token.parent_id().cloned(),
        ));
        structure_changes.extend(page.structures);
        let change = Change {
            structure_changes,
            stream_session: None,
            mutation_source_token: Some(page.token_id),
            has_cached_bindings: false,
        };

        if let Err(e) = self.inner.apply_change(change) {
            token.set_state(TokenState::Pending);
            self.inner.notify_error(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Report that the fetch for a token failed. The token may be requested again.
    pub fn on_token_failed(&self, token_id: &ContentId, reason: &str) -> Result<()> {
        if self.state() == ProviderState::Invalidated {
            tracing::debug!(token = %token_id, "Provider invalidated, dropping late failure");
            return Ok(());
        }
        let Some(token) = self.inner.tree.borrow().token(token_id) else {
            tracing::debug!(token = %token_id, "Token no longer in tree, dropping failure");
            return Ok(());
        };
        if token.state() != TokenState::Requested {
            tracing::debug!(
                token = %token_id,
                state = ?token.state(),
                "Token has no request in flight, dropping failure"
            );
            return Ok(());
        }
        tracing::warn!(token = %token_id, reason, "Token request failed");
        token.set_state(TokenState::Pending);
        for observer in token.observers_to_notify() {
            observer.on_error(reason);
        }
        Ok(())
    }

    /// Ask the request manager to rebuild the model from the source.
    ///
    /// The session manager answers by invalidating this provider and binding
    /// a new one; nothing changes here until then.
    pub fn trigger_refresh(&self) -> Result<()> {
        self.ensure_valid()?;
        tracing::info!(session = ?self.session_id(), "Requesting refresh");
        self.inner.requests.request_refresh(RefreshRequest {
            session_id: self.session_id(),
        });
        Ok(())
    }

    /// Finish the session: notify observers, then release every node and cursor.
    ///
    /// Calling it again is a no-op.
    pub fn invalidate(&self) {
        if self.state() == ProviderState::Invalidated {
            return;
        }
        self.inner.state.set(ProviderState::Invalidated);
        tracing::info!(session = ?self.session_id(), "Invalidating model provider");

        let observers = self.inner.observers.borrow().snapshot();
        for observer in observers {
            observer.on_session_finished();
        }

        self.inner.tree.borrow_mut().clear();
        self.inner.observers.borrow_mut().clear();

        if let (Some(journal), Some(session_id)) = (&self.inner.journal, self.session_id()) {
            if let Err(e) = journal.finish(&session_id) {
                tracing::warn!(session = %session_id, error = %e, "Failed to finish journaled session");
            }
        }
    }

    fn ensure_valid(&self) -> Result<()> {
        self.inner.ensure_valid()
    }
}

impl CursorProvider for ModelProvider {
    fn cursor_for(&self, content_id: &ContentId) -> Option<ModelCursor> {
        if self.state() == ProviderState::Invalidated {
            return None;
        }
        let feature = self.inner.tree.borrow().feature(content_id)?;
        Some(feature.get_cursor())
    }
}

impl ProviderInner {
    fn ensure_valid(&self) -> Result<()> {
        if self.state.get() == ProviderState::Invalidated {
            return Err(ModelError::Invalidated);
        }
        Ok(())
    }

    /// Journal, apply, then notify: feature observers, lifecycle observers,
    /// and finally the observers of the token that produced the batch.
    fn apply_change(&self, change: Change) -> Result<()> {
        self.ensure_valid()?;

        if let Some(session) = &change.stream_session {
            *self.session_id.borrow_mut() = Some(session.session_id.clone());
        }
        let session_id = self.session_id.borrow().clone();
        match (&self.journal, &session_id) {
            (Some(journal), Some(session_id)) => {
                journal.record(session_id, &change).map_err(ModelError::Journal)?;
            }
            (Some(_), None) => {
                tracing::debug!("No session bound yet, batch not journaled");
            }
            (None, _) => {}
        }

        let source_token = change
            .mutation_source_token
            .as_ref()
            .and_then(|id| self.tree.borrow().token(id));

        let outcome = self.tree.borrow_mut().apply(&change);
        tracing::debug!(
            structures = change.structure_changes.len(),
            changed_features = outcome.changes.len(),
            nodes = self.tree.borrow().len(),
            cached = change.has_cached_bindings,
            "Applied batch"
        );

        for (feature, feature_change) in &outcome.changes {
            feature.notify(feature_change);
            if self.state.get() == ProviderState::Invalidated {
                return Ok(());
            }
        }

        let has_root = self.tree.borrow().root().is_some();
        match self.state.get() {
            ProviderState::Initializing if has_root => {
                self.state.set(ProviderState::Ready);
                tracing::info!(session = ?session_id, "Model provider ready");
                let observers = self.observers.borrow().snapshot();
                for observer in observers {
                    observer.on_session_start();
                }
            }
            ProviderState::Ready if outcome.root_set => {
                tracing::info!("Root replaced");
                let observers = self.observers.borrow().snapshot();
                for observer in observers {
                    observer.on_root_set();
                }
            }
            _ => {}
        }

        if let Some(token) = source_token {
            if self.state.get() != ProviderState::Invalidated {
                self.complete_token(&token, &outcome);
            }
        }
        Ok(())
    }

    fn complete_token(&self, token: &ModelToken, outcome: &BatchOutcome) {
        token.set_state(TokenState::Resolved);

        let parent = token
            .parent_id()
            .and_then(|parent_id| self.tree.borrow().feature(parent_id));
        let start = parent.as_ref().map(|parent| {
            token
                .parent_id()
                .and_then(|parent_id| outcome.change_for(parent_id))
                .and_then(|change| change.child_changes().appended_children().first())
                .and_then(|first| parent.position_of(first.content_id()))
                .unwrap_or_else(|| parent.child_count())
        });
        tracing::info!(token = %token.content_id(), "Token resolved");

        for observer in token.observers_to_notify() {
            let cursor = match (&parent, start) {
                (Some(parent), Some(start)) => parent.cursor_at(start),
                _ => ModelCursor::exhausted(
                    token.parent_id().cloned().unwrap_or_else(|| ContentId::new("")),
                ),
            };
            observer.on_token_completed(TokenCompleted::new(token.content_id().clone(), cursor));
        }
    }

    fn notify_error(&self, error: &ModelError) {
        let observers = self.observers.borrow().snapshot();
        for observer in observers {
            observer.on_error(error);
        }
    }
}

struct ProviderCommitter {
    provider: Weak<ProviderInner>,
}

impl Committer for ProviderCommitter {
    fn commit(&self, change: Change) -> Result<()> {
        let provider = self.provider.upgrade().ok_or(ModelError::Invalidated)?;
        provider.apply_change(change)
    }
}
