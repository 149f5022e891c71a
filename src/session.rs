//! Owner-thread session driver.
//!
//! Holds the current provider, feeds responses from the async side back into
//! it, and swaps in a fresh provider when a refresh completes.

use std::rc::Rc;

use crate::error::Result;
use crate::models::Change;
use crate::provider::{ChangeJournal, ModelFeature, ModelProvider, ModelToken, RequestManager};
use crate::requests::FeedResponse;

pub struct FeedSession {
    provider: ModelProvider,
    requests: Rc<dyn RequestManager>,
    journal: Option<Rc<dyn ChangeJournal>>,
}

impl FeedSession {
    pub fn new(requests: Rc<dyn RequestManager>, journal: Option<Rc<dyn ChangeJournal>>) -> Self {
        let provider = build_provider(&requests, &journal);
        Self {
            provider,
            requests,
            journal,
        }
    }

    pub fn provider(&self) -> &ModelProvider {
        &self.provider
    }

    /// Commit the batch that opens the session.
    pub fn start(&self, initial: Change) -> Result<()> {
        self.provider.apply(initial)
    }

    /// Apply one response on the owner thread.
    ///
    /// A completed refresh invalidates the current provider and binds a new
    /// one; observers of the old provider see `on_session_finished`.
    pub fn deliver(&mut self, response: FeedResponse) -> Result<()> {
        match response {
            FeedResponse::Page(page) => self.provider.on_token_page(page),
            FeedResponse::Failed { token_id, reason } => {
                self.provider.on_token_failed(&token_id, &reason)
            }
            FeedResponse::Refreshed(change) => {
                tracing::info!(
                    previous = ?self.provider.session_id(),
                    next = ?change.stream_session.as_ref().map(|s| &s.session_id),
                    "Replacing provider after refresh"
                );
                self.provider.invalidate();
                self.provider = build_provider(&self.requests, &self.journal);
                self.provider.apply(change)
            }
        }
    }

    /// Every unresolved token in the tree, depth first.
    pub fn pending_tokens(&self) -> Result<Vec<ModelToken>> {
        let mut tokens = Vec::new();
        if let Some(root) = self.provider.root_feature()? {
            collect_tokens(&root, &mut tokens);
        }
        Ok(tokens)
    }
}

fn build_provider(
    requests: &Rc<dyn RequestManager>,
    journal: &Option<Rc<dyn ChangeJournal>>,
) -> ModelProvider {
    match journal {
        Some(journal) => ModelProvider::with_journal(Rc::clone(requests), Rc::clone(journal)),
        None => ModelProvider::new(Rc::clone(requests)),
    }
}

fn collect_tokens(feature: &ModelFeature, tokens: &mut Vec<ModelToken>) {
    for child in feature.get_cursor() {
        if let Ok(token) = child.model_token() {
            if !token.is_resolved() {
                tokens.push(token);
            }
        } else if let Ok(feature) = child.model_feature() {
            collect_tokens(&feature, tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::models::{ContentId, RefreshRequest, StreamPayload, StreamSession, StreamStructure, TokenPage, TokenRequest};
    use crate::provider::{ModelProviderObserver, ProviderState};
    use serde_json::json;

    #[derive(Default)]
    struct RecordingRequests {
        tokens: RefCell<Vec<TokenRequest>>,
    }

    impl RequestManager for RecordingRequests {
        fn request_token(&self, request: TokenRequest) {
            self.tokens.borrow_mut().push(request);
        }

        fn request_refresh(&self, _request: RefreshRequest) {}
    }

    #[derive(Default)]
    struct Finished(RefCell<usize>);

    impl ModelProviderObserver for Finished {
        fn on_session_start(&self) {}

        fn on_session_finished(&self) {
            *self.0.borrow_mut() += 1;
        }
    }

    fn initial(session: &str) -> Change {
        let root = Some(ContentId::from("root"));
        Change {
            structure_changes: vec![
                StreamStructure::update_or_append("root", None, Some(StreamPayload::feature(json!({})))),
                StreamStructure::update_or_append("a", root.clone(), Some(StreamPayload::feature(json!({})))),
                StreamStructure::update_or_append("token#1", root, Some(StreamPayload::token(json!({ "page": 1 })))),
            ],
            stream_session: Some(StreamSession::new(session)),
            ..Change::default()
        }
    }

    #[test]
    fn test_pending_tokens_and_page_delivery() {
        let requests = Rc::new(RecordingRequests::default());
        let mut session = FeedSession::new(requests.clone(), None);
        session.start(initial("s1")).unwrap();

        let tokens = session.pending_tokens().unwrap();
        assert_eq!(tokens.len(), 1);
        session.provider().handle_token(&tokens[0]).unwrap();
        assert_eq!(requests.tokens.borrow().len(), 1);

        session
            .deliver(FeedResponse::Page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![StreamStructure::update_or_append(
                    "b",
                    Some(ContentId::from("root")),
                    Some(StreamPayload::feature(json!({}))),
                )],
            }))
            .unwrap();

        assert!(session.pending_tokens().unwrap().is_empty());
        let root = session.provider().root_feature().unwrap().unwrap();
        let ids: Vec<String> = root.get_cursor().map(|c| c.content_id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_refresh_replaces_provider() {
        let requests = Rc::new(RecordingRequests::default());
        let mut session = FeedSession::new(requests, None);
        session.start(initial("s1")).unwrap();
        let old = session.provider().clone();
        let finished = Rc::new(Finished::default());
        old.register_observer(finished.clone()).unwrap();

        session.deliver(FeedResponse::Refreshed(initial("s2"))).unwrap();

        assert_eq!(old.state(), ProviderState::Invalidated);
        assert_eq!(*finished.0.borrow(), 1);
        assert_eq!(session.provider().state(), ProviderState::Ready);
        assert_eq!(session.provider().session_id().as_deref(), Some("s2"));
    }
}
