//! Channel-backed request plumbing between a provider and an async fetcher.
//!
//! The provider side is single-threaded; requests leave it as owned values on
//! an unbounded `tokio` channel and responses come back the same way, to be
//! delivered on the owner thread by [`FeedSession`](crate::session::FeedSession).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::models::{Change, ContentId, RefreshRequest, TokenPage, TokenRequest};
use crate::provider::RequestManager;

/// A request leaving the owner thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRequest {
    Token(TokenRequest),
    Refresh(RefreshRequest),
}

/// A fetch result travelling back to the owner thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedResponse {
    Page(TokenPage),
    Failed { token_id: ContentId, reason: String },
    /// The full initial batch of a rebuilt model.
    Refreshed(Change),
}

/// [`RequestManager`] that forwards every request onto a channel.
#[derive(Debug, Clone)]
pub struct ChannelRequestManager {
    sender: UnboundedSender<FeedRequest>,
}

impl ChannelRequestManager {
    pub fn new() -> (Self, UnboundedReceiver<FeedRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, request: FeedRequest) {
        if self.sender.send(request).is_err() {
            tracing::warn!("Request channel closed, dropping request");
        }
    }
}

impl RequestManager for ChannelRequestManager {
    fn request_token(&self, request: TokenRequest) {
        tracing::debug!(token = %request.token_id, "Queueing token request");
        self.send(FeedRequest::Token(request));
    }

    fn request_refresh(&self, request: RefreshRequest) {
        tracing::debug!(session = ?request.session_id, "Queueing refresh request");
        self.send(FeedRequest::Refresh(request));
    }
}
