//! kibitz daemon entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kibitz::classify::Classifier;
use kibitz::config::{BotConfig, SWEEP_INTERVAL, SWEEP_WINDOW};
use kibitz::ledger::Ledger;
use kibitz::platform::Platform;
use kibitz::reddit::RedditPlatform;
use kibitz::respond::Responder;
use kibitz::supervisor::{Supervisor, TaskSpec};
use kibitz::watcher;

/// Keyword-triggered Reddit engagement bot.
///
/// Credentials and the feed roster come from KIBITZ_* environment
/// variables; see the README for the full list.
#[derive(Debug, Parser)]
#[command(name = "kibitz", version, about)]
struct Cli {
    /// Override the ledger file location.
    #[arg(long, value_name = "FILE")]
    ledger_path: Option<PathBuf>,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = BotConfig::from_env()?;
    if let Some(path) = cli.ledger_path {
        config.ledger_path = path;
    }

    let ledger = Arc::new(Ledger::open(&config.ledger_path)?);
    let entries = ledger.len()?;
    info!(path = %config.ledger_path.display(), entries, "ledger opened");

    let platform: Arc<dyn Platform> = Arc::new(RedditPlatform::new(&config));
    let classifier = Arc::new(Classifier::new(&config, Arc::clone(&ledger)));
    let responder = Arc::new(Responder::new(Arc::clone(&platform)));

    let mut supervisor = Supervisor::new();

    for feed in &config.feeds {
        {
            let feed = feed.clone();
            let platform = Arc::clone(&platform);
            let classifier = Arc::clone(&classifier);
            let responder = Arc::clone(&responder);
            supervisor.register(TaskSpec::new(format!("{feed}/comments"), move || {
                watcher::watch_comments(&*platform, &classifier, &responder, &feed)
            }));
        }
        {
            let feed = feed.clone();
            let platform = Arc::clone(&platform);
            let classifier = Arc::clone(&classifier);
            let responder = Arc::clone(&responder);
            supervisor.register(TaskSpec::new(format!("{feed}/submissions"), move || {
                watcher::watch_submissions(&*platform, &classifier, &responder, &feed)
            }));
        }
    }

    {
        let platform = Arc::clone(&platform);
        let classifier = Arc::clone(&classifier);
        let responder = Arc::clone(&responder);
        supervisor.register(TaskSpec::new("mentions", move || {
            watcher::watch_mentions(&*platform, &classifier, &responder)
        }));
    }

    {
        let platform = Arc::clone(&platform);
        let username = config.username.clone();
        supervisor.register(TaskSpec::new("cleanup", move || {
            watcher::sweep_forever(&*platform, &username, SWEEP_WINDOW, SWEEP_INTERVAL)
        }));
    }

    info!(
        tasks = supervisor.task_count(),
        feeds = config.feeds.len(),
        "starting supervision"
    );
    supervisor.run()?;
    Ok(())
}
