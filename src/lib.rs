//! kibitz: a keyword-triggered Reddit engagement bot.
//!
//! The engine watches a set of subreddit feeds plus the account inbox,
//! decides per item whether to post one of two scripted reply variants, and
//! guarantees at most one reply per item across crashes and restarts via a
//! durable redb ledger. A crash-only supervisor keeps every watcher thread
//! alive forever; a periodic sweeper deletes the bot's own comments once
//! their score drops below zero.
//!
//! Module map:
//! - [`config`]: environment-driven configuration and deployment defaults
//! - [`item`]: immutable content snapshots and the parent chain
//! - [`ledger`]: the durable at-most-once dedup store
//! - [`classify`]: the per-item decision procedure
//! - [`respond`]: reply composition and delivery
//! - [`platform`]: the external-collaborator trait plus a scripted mock
//! - [`reddit`]: the live OAuth/polling connector
//! - [`watcher`]: blocking task bodies (feeds, mentions, cleanup)
//! - [`supervisor`]: restart-forever thread supervision

pub mod classify;
pub mod config;
pub mod error;
pub mod item;
pub mod ledger;
pub mod platform;
pub mod reddit;
pub mod respond;
pub mod supervisor;
pub mod watcher;

pub use classify::{Classifier, Decision, ReplyVariant};
pub use config::BotConfig;
pub use error::{KibitzError, KibitzResult};
pub use item::{Item, ItemKind, MessageKind};
pub use ledger::Ledger;
pub use platform::{ItemStream, OwnComment, Platform};
pub use reddit::RedditPlatform;
pub use respond::Responder;
pub use supervisor::{Supervisor, TaskSpec};
