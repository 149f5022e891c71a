//! Plain data types for the feed model.
//!
//! # Core Concepts
//!
//! - [`StreamStructure`]: One ordered structural edit (append/update, remove, clear).
//! - [`Change`]: A batch of structure edits plus metadata, committed as a unit.
//! - [`TokenRequest`] / [`TokenPage`]: The pagination round trip across the async boundary.
//! - [`FeatureTreeNode`]: Serializable snapshot of a live subtree.
//! - [`SessionRecord`]: A journaled session as stored on disk.
//!
//! Live, observable objects (features, cursors, tokens) live in [`crate::provider`];
//! everything here is `Send`, `Clone` and serde-friendly.

mod content;
mod page;
mod session;
mod structure;
mod tree;

pub use content::*;
pub use page::*;
pub use session::*;
pub use structure::*;
pub use tree::*;
