use std::cell::RefCell;
use std::rc::Rc;

use feed_model::models::*;
use feed_model::provider::*;
use feed_model::ModelError;
use serde_json::json;
use speculate2::speculate;

#[derive(Default)]
struct RecordingRequests {
    tokens: RefCell<Vec<TokenRequest>>,
    refreshes: RefCell<Vec<RefreshRequest>>,
}

impl RequestManager for RecordingRequests {
    fn request_token(&self, request: TokenRequest) {
        self.tokens.borrow_mut().push(request);
    }

    fn request_refresh(&self, request: RefreshRequest) {
        self.refreshes.borrow_mut().push(request);
    }
}

#[derive(Default)]
struct LifecycleLog {
    events: RefCell<Vec<String>>,
}

impl ModelProviderObserver for LifecycleLog {
    fn on_session_start(&self) {
        self.events.borrow_mut().push("start".into());
    }

    fn on_session_finished(&self) {
        self.events.borrow_mut().push("finished".into());
    }

    fn on_root_set(&self) {
        self.events.borrow_mut().push("root_set".into());
    }

    fn on_error(&self, error: &ModelError) {
        self.events.borrow_mut().push(format!("error: {}", error));
    }
}

struct FailingJournal;

impl ChangeJournal for FailingJournal {
    fn record(&self, _session_id: &str, _change: &Change) -> JournalResult<()> {
        Err("disk full".into())
    }

    fn finish(&self, _session_id: &str) -> JournalResult<()> {
        Ok(())
    }
}

fn feature(title: &str) -> Option<StreamPayload> {
    Some(StreamPayload::feature(json!({ "title": title })))
}

fn root_id() -> Option<ContentId> {
    Some(ContentId::from("root"))
}

/// Commit a root with `children` below it, bound to session `s1`.
fn start(provider: &ModelProvider, children: &[&str]) {
    let mut mutation = provider.edit().expect("edit");
    mutation
        .set_stream_session(StreamSession::new("s1"))
        .add_child("root", None, feature("Home"));
    for id in children {
        mutation.add_child(*id, root_id(), feature(id));
    }
    mutation.commit().expect("commit");
}

fn ids(cursor: ModelCursor) -> Vec<String> {
    cursor.map(|c| c.content_id().to_string()).collect()
}

speculate! {
    before {
        let requests = Rc::new(RecordingRequests::default());
        let provider = ModelProvider::new(requests.clone());
        let log = Rc::new(LifecycleLog::default());
    }

    describe "lifecycle" {
        it "starts initializing without a root" {
            assert_eq!(provider.state(), ProviderState::Initializing);
            assert!(provider.root_feature().unwrap().is_none());
            assert!(provider.snapshot().unwrap().is_none());
        }

        it "becomes ready on the first commit that sets a root" {
            provider.register_observer(log.clone()).unwrap();

            let mut mutation = provider.edit().unwrap();
            mutation.add_child("orphan", root_id(), feature("x"));
            mutation.commit().unwrap();
            assert_eq!(provider.state(), ProviderState::Initializing);

            start(&provider, &["a"]);

            assert_eq!(provider.state(), ProviderState::Ready);
            assert_eq!(provider.session_id().as_deref(), Some("s1"));
            assert_eq!(*log.events.borrow(), vec!["start"]);
        }

        it "replays session start to observers registered late" {
            start(&provider, &[]);
            provider.register_observer(log.clone()).unwrap();
            assert_eq!(*log.events.borrow(), vec!["start"]);
        }

        it "reports root replacement while ready" {
            start(&provider, &["a"]);
            provider.register_observer(log.clone()).unwrap();

            let mut mutation = provider.edit().unwrap();
            mutation.add_child("root2", None, feature("Other"));
            mutation.commit().unwrap();

            assert_eq!(*log.events.borrow(), vec!["start", "root_set"]);
            let root = provider.root_feature().unwrap().unwrap();
            assert_eq!(root.content_id(), "root2");
            assert!(provider.get_model_child(&ContentId::from("a")).unwrap().is_none());
        }

        it "rejects every call after invalidate" {
            start(&provider, &["a"]);
            provider.register_observer(log.clone()).unwrap();
            let root = provider.root_feature().unwrap().unwrap();
            let mut cursor = root.get_cursor();

            provider.invalidate();
            provider.invalidate();

            assert_eq!(provider.state(), ProviderState::Invalidated);
            assert_eq!(*log.events.borrow(), vec!["start", "finished"]);
            assert!(matches!(provider.edit(), Err(ModelError::Invalidated)));
            assert!(matches!(provider.root_feature(), Err(ModelError::Invalidated)));
            assert!(matches!(provider.trigger_refresh(), Err(ModelError::Invalidated)));
            assert!(matches!(
                provider.get_model_child(&ContentId::from("a")),
                Err(ModelError::Invalidated)
            ));
            assert!(cursor.get_next_item().is_none());
            assert!(provider.cursor_for(&ContentId::from("root")).is_none());
        }

        it "fails commits of mutations started before invalidate" {
            start(&provider, &[]);
            let mut mutation = provider.edit().unwrap();
            mutation.add_child("late", root_id(), feature("late"));

            provider.invalidate();

            assert!(matches!(mutation.commit(), Err(ModelError::Invalidated)));
        }
    }

    describe "queries" {
        it "returns None for unknown children" {
            start(&provider, &["a"]);
            assert!(provider.get_model_child(&ContentId::from("nope")).unwrap().is_none());
        }

        it "distinguishes child kinds" {
            start(&provider, &["a"]);
            let child = provider.get_model_child(&ContentId::from("a")).unwrap().unwrap();

            assert_eq!(child.kind(), NodeKind::Feature);
            assert_eq!(child.parent_id(), root_id().as_ref());
            assert!(matches!(
                child.model_token(),
                Err(ModelError::WrongChildType { expected: NodeKind::Token, actual: NodeKind::Feature, .. })
            ));
        }

        it "hands out cursors by content id" {
            start(&provider, &["a", "b"]);
            let cursor = provider.cursor_for(&ContentId::from("root")).unwrap();
            assert_eq!(ids(cursor), vec!["a", "b"]);
            assert!(provider.cursor_for(&ContentId::from("a")).unwrap().is_at_end());
        }
    }

    describe "commits" {
        it "delivers one diff per feature after the whole batch" {
            start(&provider, &["a"]);
            let root = provider.root_feature().unwrap().unwrap();
            let seen: Rc<RefCell<Vec<(Vec<String>, Vec<String>, usize)>>> = Rc::default();
            let observed_root = root.clone();
            let sink = seen.clone();
            root.register_observer(Rc::new(move |change: &FeatureChange| {
                let appended = change.child_changes().appended_children().iter()
                    .map(|c| c.content_id().to_string()).collect();
                let removed = change.child_changes().removed_children().iter()
                    .map(|c| c.content_id().to_string()).collect();
                sink.borrow_mut().push((appended, removed, observed_root.child_count()));
            }));

            let mut mutation = provider.edit().unwrap();
            mutation
                .add_child("b", root_id(), feature("b"))
                .add_child("c", root_id(), feature("c"))
                .remove_child("a", root_id())
                .remove_child("c", root_id());
            mutation.commit().unwrap();

            let seen = seen.borrow();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0], (vec!["b".to_string()], vec!["a".to_string()], 1));
        }

        it "moves live cursors over appends and removals" {
            start(&provider, &["a", "b", "c"]);
            let root = provider.root_feature().unwrap().unwrap();
            let mut cursor = root.get_cursor();
            assert_eq!(cursor.get_next_item().unwrap().content_id(), "a");

            let mut mutation = provider.edit().unwrap();
            mutation
                .remove_child("b", root_id())
                .add_child("d", root_id(), feature("d"));
            mutation.commit().unwrap();

            assert_eq!(ids(cursor), vec!["c", "d"]);
        }

        it "marks payload updates as feature changes" {
            start(&provider, &["a"]);
            let a = provider.get_model_child(&ContentId::from("a")).unwrap().unwrap()
                .model_feature().unwrap();
            let changed = Rc::new(RefCell::new(false));
            let flag = changed.clone();
            a.register_observer(Rc::new(move |change: &FeatureChange| {
                *flag.borrow_mut() = change.is_feature_changed();
            }));

            let mut mutation = provider.edit().unwrap();
            mutation.update_child("a", root_id(), StreamPayload::feature(json!({ "title": "A" })));
            mutation.commit().unwrap();

            assert!(*changed.borrow());
            assert_eq!(a.stream_feature()["title"], "A");
        }

        it "lets observers commit from inside a notification" {
            start(&provider, &[]);
            let root = provider.root_feature().unwrap().unwrap();
            let reentrant = provider.clone();
            root.register_observer(Rc::new(move |change: &FeatureChange| {
                let first = change.child_changes().appended_children().first();
                if first.is_some_and(|c| c.content_id() == "a") {
                    let mut mutation = reentrant.edit().unwrap();
                    mutation.add_child("b", Some(ContentId::from("root")), None);
                    mutation.commit().unwrap();
                }
            }));

            let mut mutation = provider.edit().unwrap();
            mutation.add_child("a", root_id(), feature("a"));
            mutation.commit().unwrap();

            assert_eq!(ids(root.get_cursor()), vec!["a", "b"]);
            let b = provider.get_model_child(&ContentId::from("b")).unwrap().unwrap();
            assert_eq!(b.kind(), NodeKind::Unbound);
        }

        it "applies nothing when the journal rejects the batch" {
            let provider = ModelProvider::with_journal(requests.clone(), Rc::new(FailingJournal));

            let mut mutation = provider.edit().unwrap();
            mutation
                .set_stream_session(StreamSession::new("s1"))
                .add_child("root", None, feature("Home"));

            assert!(matches!(mutation.commit(), Err(ModelError::Journal(_))));
            assert_eq!(provider.state(), ProviderState::Initializing);
            assert!(provider.root_feature().unwrap().is_none());
        }

        it "clears the whole tree" {
            start(&provider, &["a", "b"]);
            let mut mutation = provider.edit().unwrap();
            mutation.clear_all().add_child("fresh", None, feature("Fresh"));
            mutation.commit().unwrap();

            let snapshot = provider.snapshot().unwrap().unwrap();
            assert_eq!(snapshot.content_id, ContentId::from("fresh"));
            assert!(snapshot.children.is_empty());
        }
    }

    describe "tokens" {
        before {
            start(&provider, &["a"]);
            let mut mutation = provider.edit().unwrap();
            mutation.add_child("token#1", root_id(), Some(StreamPayload::token(json!({ "page": 1 }))));
            mutation.commit().unwrap();
            let token = provider.get_model_child(&ContentId::from("token#1")).unwrap().unwrap()
                .model_token().unwrap();
        }

        it "forwards one request per pending token" {
            provider.handle_token(&token).unwrap();
            provider.handle_token(&token).unwrap();

            let sent = requests.tokens.borrow();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].token_id, ContentId::from("token#1"));
            assert_eq!(sent[0].parent_id, root_id());
            assert_eq!(sent[0].continuation, json!({ "page": 1 }));
            assert_eq!(sent[0].session_id.as_deref(), Some("s1"));
            assert_eq!(token.state(), TokenState::Requested);
        }

        it "resolves the token with a cursor over the new children" {
            let completed: Rc<RefCell<Vec<Vec<String>>>> = Rc::default();
            let sink = completed.clone();
            token.register_observer(Rc::new(move |event: TokenCompleted| {
                let cursor = event.into_cursor();
                sink.borrow_mut().push(cursor.map(|c| c.content_id().to_string()).collect());
            }));
            provider.handle_token(&token).unwrap();

            provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![
                    StreamStructure::update_or_append("b", root_id(), feature("b")),
                    StreamStructure::update_or_append("c", root_id(), feature("c")),
                ],
            }).unwrap();

            assert!(token.is_resolved());
            assert_eq!(*completed.borrow(), vec![vec!["b".to_string(), "c".to_string()]]);
            assert!(provider.get_model_child(&ContentId::from("token#1")).unwrap().is_none());
            let root = provider.root_feature().unwrap().unwrap();
            assert_eq!(ids(root.get_cursor()), vec!["a", "b", "c"]);
        }

        it "gives every observer its own completion cursor" {
            let cursors: Rc<RefCell<Vec<ModelCursor>>> = Rc::default();
            for _ in 0..2 {
                let sink = cursors.clone();
                token.register_observer(Rc::new(move |event: TokenCompleted| {
                    sink.borrow_mut().push(event.into_cursor());
                }));
            }
            provider.handle_token(&token).unwrap();

            provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![
                    StreamStructure::update_or_append("b", root_id(), feature("b")),
                    StreamStructure::update_or_append("c", root_id(), feature("c")),
                ],
            }).unwrap();

            let mut cursors = cursors.borrow_mut();
            assert_eq!(cursors.len(), 2);
            let mut second = cursors.pop().unwrap();
            let first = cursors.pop().unwrap();
            assert_eq!(ids(first), vec!["b", "c"]);
            assert_eq!(second.get_next_item().unwrap().content_id(), "b");
            assert_eq!(second.get_next_item().unwrap().content_id(), "c");
            assert!(second.get_next_item().is_none());
        }

        it "starts the completion cursor at the end when the parent gained nothing" {
            let cursors: Rc<RefCell<Vec<ModelCursor>>> = Rc::default();
            let sink = cursors.clone();
            token.register_observer(Rc::new(move |event: TokenCompleted| {
                sink.borrow_mut().push(event.into_cursor());
            }));
            provider.handle_token(&token).unwrap();

            provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![StreamStructure::update_or_append(
                    "a1",
                    Some(ContentId::from("a")),
                    feature("a1"),
                )],
            }).unwrap();

            let mut cursors = cursors.borrow_mut();
            assert_eq!(cursors.len(), 1);
            let cursor = &mut cursors[0];
            assert_eq!(cursor.parent_id(), &ContentId::from("root"));
            assert!(cursor.is_at_end());
            assert!(cursor.get_next_item().is_none());
            let root = provider.root_feature().unwrap().unwrap();
            assert_eq!(ids(root.get_cursor()), vec!["a"]);
        }

        it "drops pages and failures for tokens that were never requested" {
            let failures: Rc<RefCell<usize>> = Rc::default();
            struct CountFailures(Rc<RefCell<usize>>);
            impl TokenCompletedObserver for CountFailures {
                fn on_token_completed(&self, _event: TokenCompleted) {
                    panic!("token completed without a request");
                }
                fn on_error(&self, _reason: &str) {
                    *self.0.borrow_mut() += 1;
                }
            }
            token.register_observer(Rc::new(CountFailures(failures.clone())));

            provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![StreamStructure::update_or_append("b", root_id(), feature("b"))],
            }).unwrap();
            provider.on_token_failed(&ContentId::from("token#1"), "stray").unwrap();

            assert_eq!(token.state(), TokenState::Pending);
            assert_eq!(*failures.borrow(), 0);
            let root = provider.root_feature().unwrap().unwrap();
            assert_eq!(ids(root.get_cursor()), vec!["a", "token#1"]);
        }

        it "drops a duplicate page once the token resolved" {
            provider.handle_token(&token).unwrap();
            let page = TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![StreamStructure::update_or_append("b", root_id(), feature("b"))],
            };
            provider.on_token_page(page.clone()).unwrap();
            provider.on_token_page(page).unwrap();

            let root = provider.root_feature().unwrap().unwrap();
            assert_eq!(ids(root.get_cursor()), vec!["a", "b"]);
        }

        it "refuses to request a resolved token again" {
            provider.handle_token(&token).unwrap();
            provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![],
            }).unwrap();

            assert!(matches!(
                provider.handle_token(&token),
                Err(ModelError::TokenAlreadyResolved(_))
            ));
        }

        it "rejects tokens from another provider" {
            let stranger = ModelToken::new("token#9", root_id(), json!({}));
            assert!(matches!(
                provider.handle_token(&stranger),
                Err(ModelError::UnknownToken(_))
            ));
        }

        it "returns a failed token to pending" {
            let reasons: Rc<RefCell<Vec<String>>> = Rc::default();
            struct Failures(Rc<RefCell<Vec<String>>>);
            impl TokenCompletedObserver for Failures {
                fn on_token_completed(&self, _event: TokenCompleted) {}
                fn on_error(&self, reason: &str) {
                    self.0.borrow_mut().push(reason.to_string());
                }
            }
            token.register_observer(Rc::new(Failures(reasons.clone())));
            provider.handle_token(&token).unwrap();

            provider.on_token_failed(&ContentId::from("token#1"), "timeout").unwrap();

            assert_eq!(token.state(), TokenState::Pending);
            assert_eq!(*reasons.borrow(), vec!["timeout"]);
            provider.handle_token(&token).unwrap();
            assert_eq!(requests.tokens.borrow().len(), 2);
        }

        it "ignores pages that arrive after invalidate" {
            provider.handle_token(&token).unwrap();
            provider.invalidate();

            let late = provider.on_token_page(TokenPage {
                token_id: ContentId::from("token#1"),
                structures: vec![],
            });

            assert!(late.is_ok());
            assert!(!token.is_resolved());
        }
    }

    describe "refresh" {
        it "forwards the current session" {
            start(&provider, &[]);
            provider.trigger_refresh().unwrap();
            assert_eq!(
                *requests.refreshes.borrow(),
                vec![RefreshRequest { session_id: Some("s1".into()) }]
            );
        }
    }
}
