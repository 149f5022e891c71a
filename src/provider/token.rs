use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::cursor::ModelCursor;
use super::observer::{ObserverId, ObserverList, TokenCompletedObserver};
use crate::models::{ContentId, TokenRequest};

/// Resolution progress of a pagination token.
///
/// - `Pending`: Not requested yet, or the last request failed
/// - `Requested`: A fetch is in flight
/// - `Resolved`: The page arrived and replaced the token (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Pending,
    Requested,
    Resolved,
}

struct TokenInner {
    content_id: ContentId,
    parent_id: Option<ContentId>,
    continuation: Value,
    state: Cell<TokenState>,
    observers: RefCell<ObserverList<dyn TokenCompletedObserver>>,
}

/// A pagination boundary: more children exist beyond this point.
///
/// Tokens resolve at most once. Observers registered on the token receive a
/// [`TokenCompleted`] carrying a cursor over the children the page added.
#[derive(Clone)]
pub struct ModelToken(Rc<TokenInner>);

impl ModelToken {
    pub fn new(
        content_id: impl Into<ContentId>,
        parent_id: Option<ContentId>,
        continuation: Value,
    ) -> Self {
        Self(Rc::new(TokenInner {
            content_id: content_id.into(),
            parent_id,
            continuation,
            state: Cell::new(TokenState::Pending),
            observers: RefCell::new(ObserverList::new()),
        }))
    }

    pub fn content_id(&self) -> &ContentId {
        &self.0.content_id
    }

    pub fn parent_id(&self) -> Option<&ContentId> {
        self.0.parent_id.as_ref()
    }

    /// Opaque value the fetcher needs to load the next page.
    pub fn continuation(&self) -> &Value {
        &self.0.continuation
    }

    pub fn state(&self) -> TokenState {
        self.0.state.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == TokenState::Resolved
    }

    pub fn register_observer(&self, observer: Rc<dyn TokenCompletedObserver>) -> ObserverId {
        self.0.observers.borrow_mut().register(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.0.observers.borrow_mut().unregister(id)
    }

    /// Observers to call on completion, in registration order.
    pub fn observers_to_notify(&self) -> Vec<Rc<dyn TokenCompletedObserver>> {
        self.0.observers.borrow().snapshot()
    }

    /// Whether two handles refer to the same token instance.
    pub fn same_token(&self, other: &ModelToken) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn set_state(&self, state: TokenState) {
        self.0.state.set(state);
    }

    pub(crate) fn to_request(&self, session_id: Option<String>) -> TokenRequest {
        TokenRequest {
            token_id: self.content_id().clone(),
            parent_id: self.parent_id().cloned(),
            continuation: self.continuation().clone(),
            session_id,
        }
    }
}

impl fmt::Debug for ModelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelToken")
            .field("content_id", self.content_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Delivered to token observers once the page behind a token is in the tree.
#[derive(Debug)]
pub struct TokenCompleted {
    token_id: ContentId,
    cursor: ModelCursor,
}

impl TokenCompleted {
    pub(crate) fn new(token_id: ContentId, cursor: ModelCursor) -> Self {
        Self { token_id, cursor }
    }

    pub fn token_id(&self) -> &ContentId {
        &self.token_id
    }

    /// Cursor positioned on the first child the page added.
    pub fn cursor(&mut self) -> &mut ModelCursor {
        &mut self.cursor
    }

    pub fn into_cursor(self) -> ModelCursor {
        self.cursor
    }
}
