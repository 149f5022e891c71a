//! Observer traits and the registration list shared by features, tokens and
//! the provider.
//!
//! Observers are `Rc<dyn Trait>` values kept in registration order. Closures
//! work directly through the blanket impls. Notification always iterates a
//! cloned snapshot of the list so callbacks may register or unregister
//! observers (or commit more changes) without tripping a `RefCell` borrow.

use std::rc::Rc;

use super::change::FeatureChange;
use super::token::TokenCompleted;
use crate::error::ModelError;

/// Handle returned by `register_observer`, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub(crate) struct ObserverList<T: ?Sized> {
    next_id: u64,
    entries: Vec<(ObserverId, Rc<T>)>,
}

impl<T: ?Sized> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub(crate) fn register(&mut self, observer: Rc<T>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<T>> {
        self.entries.iter().map(|(_, o)| Rc::clone(o)).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: ?Sized> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Notified after every committed change to one feature.
pub trait FeatureChangeObserver {
    fn on_change(&self, change: &FeatureChange);
}

impl<F: Fn(&FeatureChange)> FeatureChangeObserver for F {
    fn on_change(&self, change: &FeatureChange) {
        self(change)
    }
}

/// Session-level lifecycle notifications from a
/// [`ModelProvider`](super::ModelProvider).
pub trait ModelProviderObserver {
    /// The provider became ready. Replayed once for observers registered later.
    fn on_session_start(&self);

    /// The provider was invalidated. No further callbacks follow.
    fn on_session_finished(&self);

    /// The root feature was set or replaced after the session started.
    fn on_root_set(&self) {}

    /// A background completion failed and there was no caller to return it to.
    fn on_error(&self, _error: &ModelError) {}
}

/// Notified when a pagination token resolves.
pub trait TokenCompletedObserver {
    fn on_token_completed(&self, event: TokenCompleted);

    /// The fetch behind the token failed. The token may be requested again.
    fn on_error(&self, _reason: &str) {}
}

impl<F: Fn(TokenCompleted)> TokenCompletedObserver for F {
    fn on_token_completed(&self, event: TokenCompleted) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregister_keeps_order_of_remaining() {
        let mut list: ObserverList<str> = ObserverList::new();
        let a = list.register(Rc::from("a"));
        list.register(Rc::from("b"));
        list.register(Rc::from("c"));

        assert!(list.unregister(a));
        assert!(!list.unregister(a));

        let names: Vec<String> = list.snapshot().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut list: ObserverList<str> = ObserverList::new();
        let a = list.register(Rc::from("a"));
        list.unregister(a);
        let b = list.register(Rc::from("b"));
        assert_ne!(a, b);
        assert_eq!(list.len(), 1);
    }
}
