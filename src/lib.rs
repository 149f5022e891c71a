//! Observable feed model: a session-scoped tree of stream features with live
//! cursors, per-feature change diffs and token-based pagination.
//!
//! See [`provider`] for the live model, [`models`] for the plain data that
//! flows in and out of it, and [`db`] for the session journal.

pub mod config;
pub mod db;
pub mod error;
pub mod fixture;
pub mod models;
pub mod provider;
pub mod render;
pub mod requests;
pub mod session;

pub use error::{ModelError, Result};
