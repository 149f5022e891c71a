//! The live, observable feed tree.
//!
//! # Core Concepts
//!
//! - [`ModelProvider`]: Session-scoped facade. Owns every node, applies commits,
//!   drives the `Initializing → Ready → Invalidated` lifecycle and resolves tokens.
//! - [`ModelFeature`]: A node with a payload and ordered children.
//! - [`ModelChild`]: A slot in a child list: a feature, a token, or unbound content.
//! - [`ModelCursor`]: A forward or backward iterator over one feature's children
//!   that stays valid across commits.
//! - [`ModelMutation`]: An ordered batch of edits committed as one unit.
//! - [`FeatureChange`]: The per-feature diff delivered to observers.
//! - [`ModelToken`]: A pagination boundary, resolved at most once.
//!
//! # Invariants
//!
//! 1. Features change only through committed mutations.
//! 2. Observers see a batch fully applied or not at all.
//! 3. A cursor never returns a removed child and never returns a child twice.
//! 4. An exhausted cursor stays exhausted.
//! 5. After `invalidate`, every provider call except `invalidate` fails.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`), so the owner-thread
//! rule is checked by the compiler.

mod change;
mod child;
mod cursor;
mod feature;
mod mutation;
mod observer;
#[allow(clippy::module_inception)]
mod provider;
mod token;
mod traits;
mod tree;

pub use change::{ChildChanges, FeatureChange};
pub use child::ModelChild;
pub use cursor::ModelCursor;
pub use feature::ModelFeature;
pub use mutation::{Committer, ModelMutation};
pub use observer::{FeatureChangeObserver, ModelProviderObserver, ObserverId, TokenCompletedObserver};
pub use provider::{ModelProvider, ProviderState};
pub use token::{ModelToken, TokenCompleted, TokenState};
pub use traits::{
    ChangeJournal, ContentIdGenerator, CursorProvider, JournalResult, RequestManager,
    SequentialContentIds, UuidContentIds,
};
