//! JSON feed fixtures and an async fetcher that pages through them.
//!
//! A fixture is a root item whose direct children are served in pages of
//! `page_size`. Each page past the first sits behind a token `token#N` whose
//! continuation is `{"page": N}`. Nested children travel with their parent.
//!
//! ```json
//! {
//!   "session_id": "demo",
//!   "root": {
//!     "id": "root",
//!     "data": { "title": "Home" },
//!     "children": [
//!       { "data": { "title": "Weather" } },
//!       { "id": "headlines", "children": [ { "data": { "title": "Story" } } ] }
//!     ]
//!   }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::models::{
    Change, ContentId, StreamPayload, StreamSession, StreamStructure, TokenPage, TokenRequest,
};
use crate::provider::ContentIdGenerator;
use crate::requests::{FeedRequest, FeedResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureItem {
    #[serde(default)]
    pub id: Option<String>,
    /// Feature payload. An item without data becomes an unbound child.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub children: Vec<FixtureItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub session_id: Option<String>,
    pub root: FixtureItem,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid fixture {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Give every item without an id one from `ids`.
    pub fn assign_ids(&mut self, ids: &dyn ContentIdGenerator) {
        fn assign(item: &mut FixtureItem, ids: &dyn ContentIdGenerator) {
            if item.id.is_none() {
                item.id = Some(ids.next_id().to_string());
            }
            for child in &mut item.children {
                assign(child, ids);
            }
        }
        assign(&mut self.root, ids);
    }

    pub fn root_id(&self) -> ContentId {
        ContentId::new(self.root.id.clone().unwrap_or_else(|| "root".to_string()))
    }

    /// Number of pages the root's children span.
    pub fn page_count(&self, page_size: usize) -> usize {
        self.root.children.len().div_ceil(page_size.max(1)).max(1)
    }

    /// The batch that starts a session: the root, the first page and the
    /// token for the next page, if any.
    pub fn initial_change(&self, session_id: &str, page_size: usize) -> Change {
        let root_id = self.root_id();
        let root_data = self.root.data.clone().unwrap_or_else(|| json!({}));
        let mut structure_changes = vec![StreamStructure::update_or_append(
            root_id,
            None,
            Some(StreamPayload::feature(root_data)),
        )];
        structure_changes.extend(self.page_structures(0, page_size));

        Change {
            structure_changes,
            stream_session: Some(StreamSession::new(session_id)),
            mutation_source_token: None,
            has_cached_bindings: false,
        }
    }

    /// Page `page` (1-based past the initial page) as the answer to `token#page`.
    pub fn page(&self, page: usize, page_size: usize) -> Option<TokenPage> {
        if page == 0 || page >= self.page_count(page_size) {
            return None;
        }
        Some(TokenPage {
            token_id: token_id(page),
            structures: self.page_structures(page, page_size),
        })
    }

    fn page_structures(&self, page: usize, page_size: usize) -> Vec<StreamStructure> {
        let page_size = page_size.max(1);
        let root_id = self.root_id();
        let mut structures = Vec::new();
        for (index, item) in self
            .root
            .children
            .iter()
            .enumerate()
            .skip(page * page_size)
            .take(page_size)
        {
            push_item(&mut structures, item, &root_id, index);
        }

        let next = page + 1;
        if next < self.page_count(page_size) {
            structures.push(StreamStructure::update_or_append(
                token_id(next),
                Some(root_id),
                Some(StreamPayload::token(json!({ "page": next }))),
            ));
        }
        structures
    }
}

fn token_id(page: usize) -> ContentId {
    ContentId::new(format!("token#{}", page))
}

fn push_item(
    structures: &mut Vec<StreamStructure>,
    item: &FixtureItem,
    parent: &ContentId,
    index: usize,
) {
    let id = ContentId::new(
        item.id
            .clone()
            .unwrap_or_else(|| format!("{}/{}", parent, index)),
    );
    let payload = item.data.clone().map(StreamPayload::feature);
    let payload = match payload {
        None if !item.children.is_empty() => Some(StreamPayload::feature(json!({}))),
        other => other,
    };
    structures.push(StreamStructure::update_or_append(
        id.clone(),
        Some(parent.clone()),
        payload,
    ));
    for (i, child) in item.children.iter().enumerate() {
        push_item(structures, child, &id, i);
    }
}

/// Serves token and refresh requests from a fixture.
#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    fixture: Arc<Fixture>,
    page_size: usize,
}

impl FixtureFetcher {
    pub fn new(fixture: Fixture, page_size: usize) -> Self {
        Self {
            fixture: Arc::new(fixture),
            page_size,
        }
    }

    pub fn respond(&self, request: FeedRequest) -> FeedResponse {
        match request {
            FeedRequest::Token(request) => self.respond_token(request),
            FeedRequest::Refresh(request) => {
                let session_id = uuid::Uuid::new_v4().to_string();
                tracing::info!(previous = ?request.session_id, session = %session_id, "Rebuilding fixture session");
                FeedResponse::Refreshed(self.fixture.initial_change(&session_id, self.page_size))
            }
        }
    }

    fn respond_token(&self, request: TokenRequest) -> FeedResponse {
        let page = request
            .continuation
            .get("page")
            .and_then(Value::as_u64)
            .map(|p| p as usize);
        match page.and_then(|p| self.fixture.page(p, self.page_size)) {
            Some(page) if page.token_id == request.token_id => FeedResponse::Page(page),
            Some(_) | None => FeedResponse::Failed {
                token_id: request.token_id,
                reason: format!("no page for continuation {}", request.continuation),
            },
        }
    }

    /// Answer requests on a background task until the request channel closes.
    pub fn spawn(
        self,
        mut requests: UnboundedReceiver<FeedRequest>,
    ) -> (JoinHandle<()>, UnboundedReceiver<FeedResponse>) {
        let (sender, responses) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let response = self.respond(request);
                if sender.send(response).is_err() {
                    tracing::debug!("Response channel closed, stopping fixture fetcher");
                    break;
                }
            }
        });
        (handle, responses)
    }
}
