use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_model::config::{FeedConfig, StoreLocation};
use feed_model::db::SessionStore;
use feed_model::fixture::{Fixture, FixtureFetcher};
use feed_model::provider::{ChangeJournal, ModelProvider, SequentialContentIds};
use feed_model::render::{count_kinds, render_tree};
use feed_model::requests::ChannelRequestManager;
use feed_model::session::FeedSession;

#[derive(Parser)]
#[command(name = "feedctl")]
#[command(about = "Load, page through and replay feed model sessions")]
struct Cli {
    /// Journal database path (overrides FEED_MODEL_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Do not journal committed batches
    #[arg(long, global = true)]
    no_journal: bool,

    /// Children per page (overrides FEED_MODEL_PAGE_SIZE)
    #[arg(long, global = true)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the first page of a fixture and print the tree
    Show { fixture: PathBuf },
    /// Resolve every token of a fixture, then print the tree
    Page {
        fixture: PathBuf,

        /// Stop after this many token pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// List journaled sessions
    Sessions,
    /// Rebuild a journaled session and print its tree
    Replay { session: String },
}

/// Logs go to stderr so stdout carries only rendered output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "feed_model=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = FeedConfig::from_env();
    if let Some(path) = cli.db {
        config.store = StoreLocation::Path(path);
    }
    if cli.no_journal {
        config.journal = false;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size.max(1);
    }

    match cli.command {
        Commands::Show { fixture } => {
            let (session, _responses) = open_fixture_session(&config, &fixture)?;
            print_tree(session.provider())?;
            session.provider().invalidate();
        }
        Commands::Page { fixture, max_pages } => {
            let (mut session, mut responses) = open_fixture_session(&config, &fixture)?;
            let mut pages = 0;

            loop {
                let tokens = session.pending_tokens()?;
                if tokens.is_empty() || max_pages.is_some_and(|max| pages >= max) {
                    break;
                }
                for token in &tokens {
                    session.provider().handle_token(token)?;
                }
                for _ in 0..tokens.len() {
                    let response = responses
                        .recv()
                        .await
                        .context("Fixture fetcher stopped before answering")?;
                    session.deliver(response)?;
                }
                pages += tokens.len();
            }

            tracing::info!(pages, "Finished paging");
            print_tree(session.provider())?;
            session.provider().invalidate();
        }
        Commands::Sessions => {
            let store = config.open_store()?;
            let sessions = store.list_sessions()?;
            if sessions.is_empty() {
                println!("No journaled sessions");
            }
            for session in sessions {
                println!(
                    "{}  {:<8}  {:>4} batches  {}",
                    session.id,
                    session.status.as_str(),
                    session.change_count,
                    session.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Replay { session } => {
            let store = config.open_store()?;
            store
                .get_session(&session)?
                .with_context(|| format!("No journaled session {}", session))?;

            let changes = store.load_changes(&session)?;
            let (requests, _receiver) = ChannelRequestManager::new();
            let provider = ModelProvider::new(Rc::new(requests));
            for change in changes {
                provider.apply(change)?;
            }
            print_tree(&provider)?;
        }
    }

    Ok(())
}

type Responses = tokio::sync::mpsc::UnboundedReceiver<feed_model::requests::FeedResponse>;

fn open_fixture_session(
    config: &FeedConfig,
    path: &std::path::Path,
) -> anyhow::Result<(FeedSession, Responses)> {
    let mut fixture = Fixture::load(path)?;
    fixture.assign_ids(&SequentialContentIds::new("item"));
    let store = if config.journal {
        Some(config.open_store()?)
    } else {
        None
    };

    // Each run journals under its own id
    let session_id = match (&fixture.session_id, &store) {
        (Some(id), Some(store)) if store.get_session(id)?.is_some() => {
            let fresh = format!("{}-{}", id, uuid::Uuid::new_v4());
            tracing::info!(fixture_session = %id, session = %fresh, "Session already journaled, using a fresh id");
            fresh
        }
        (Some(id), _) => id.clone(),
        (None, _) => uuid::Uuid::new_v4().to_string(),
    };
    let initial = fixture.initial_change(&session_id, config.page_size);

    let journal = store.map(|store: SessionStore| Rc::new(store) as Rc<dyn ChangeJournal>);

    let (requests, receiver) = ChannelRequestManager::new();
    let (_fetcher, responses) = FixtureFetcher::new(fixture, config.page_size).spawn(receiver);

    let session = FeedSession::new(Rc::new(requests), journal);
    session.start(initial)?;
    tracing::info!(session = %session_id, "Fixture session started");
    Ok((session, responses))
}

fn print_tree(provider: &ModelProvider) -> anyhow::Result<()> {
    match provider.snapshot()? {
        Some(root) => {
            let (features, tokens, unbound) = count_kinds(&root);
            print!("{}", render_tree(&root));
            println!();
            println!("{} features, {} tokens, {} unbound", features, tokens, unbound);
        }
        None => println!("(empty)"),
    }
    Ok(())
}
