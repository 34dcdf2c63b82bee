//! Watcher task bodies: one blocking stream consumer per feed and kind.
//!
//! Each body runs an unbounded loop over its live stream, processing items
//! strictly in arrival order, and never terminates voluntarily. A stream
//! that ends or fails makes the body return an error; the supervisor logs
//! it and re-enters the body from the start (which reopens the stream).
//!
//! A ledger failure aborts the current item without having replied. The
//! mark always lands before the reply, so restarts can never produce a
//! duplicate response.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::classify::{Classifier, Decision};
use crate::error::{PlatformResult, WatchError, WatchResult};
use crate::item::MessageKind;
use crate::platform::Platform;
use crate::respond::Responder;

/// Feed identifier the classifier sees for inbox mentions.
pub const MENTIONS_FEED: &str = "mentions";

/// Consume the live comment stream of `feed`, forever.
pub fn watch_comments(
    platform: &dyn Platform,
    classifier: &Classifier,
    responder: &Responder,
    feed: &str,
) -> WatchResult<()> {
    let stream = platform.comments(feed)?;
    let mut rng = rand::thread_rng();

    for item in stream {
        let item = item?;
        match classifier.decide(&item, feed, &mut rng)? {
            Decision::Respond(variant) => {
                responder.deliver(&item, variant, &mut rng)?;
                info!(feed, id = %item.id, ?variant, "replied to comment");
            }
            Decision::Skip => debug!(feed, id = %item.id, "not replying"),
        }
    }

    Err(WatchError::StreamEnded {
        task: format!("{feed}/comments"),
    })
}

/// Consume the live submission stream of `feed`, forever.
pub fn watch_submissions(
    platform: &dyn Platform,
    classifier: &Classifier,
    responder: &Responder,
    feed: &str,
) -> WatchResult<()> {
    let stream = platform.submissions(feed)?;
    let mut rng = rand::thread_rng();

    for item in stream {
        let item = item?;
        match classifier.decide(&item, feed, &mut rng)? {
            Decision::Respond(variant) => {
                responder.deliver(&item, variant, &mut rng)?;
                info!(feed, id = %item.id, ?variant, "replied to submission");
            }
            Decision::Skip => debug!(feed, id = %item.id, "not replying"),
        }
    }

    Err(WatchError::StreamEnded {
        task: format!("{feed}/submissions"),
    })
}

/// Consume the inbox stream, forever.
///
/// Only username mentions are handled (and acknowledged as read once
/// handled); comment replies and private messages pass through untouched.
pub fn watch_mentions(
    platform: &dyn Platform,
    classifier: &Classifier,
    responder: &Responder,
) -> WatchResult<()> {
    let stream = platform.inbox()?;
    let mut rng = rand::thread_rng();

    for item in stream {
        let item = item?;
        if item.message_kind != Some(MessageKind::UsernameMention) {
            debug!(id = %item.id, "ignoring non-mention inbox item");
            continue;
        }

        match classifier.decide(&item, MENTIONS_FEED, &mut rng)? {
            Decision::Respond(variant) => {
                responder.deliver(&item, variant, &mut rng)?;
                info!(id = %item.id, ?variant, "replied to mention");
            }
            Decision::Skip => debug!(id = %item.id, "not replying to mention"),
        }
        platform.mark_read(&item.id)?;
    }

    Err(WatchError::StreamEnded {
        task: "mentions".to_string(),
    })
}

/// One cleanup pass: delete own comments whose score dropped below zero.
///
/// Returns the number of deletions attempted. A failed delete is logged and
/// skipped; the comment may already be gone, and deletion is idempotent.
pub fn sweep_once(
    platform: &dyn Platform,
    username: &str,
    window: usize,
) -> PlatformResult<usize> {
    let comments = platform.own_recent_comments(username, window)?;
    let mut deleted = 0;
    for comment in comments {
        if comment.score < 0 {
            match platform.delete(&comment.id) {
                Ok(()) => {
                    info!(id = %comment.id, score = comment.score, "deleted downvoted reply");
                    deleted += 1;
                }
                Err(e) => warn!(id = %comment.id, error = %e, "delete failed, skipping"),
            }
        }
    }
    Ok(deleted)
}

/// Cleanup sweeper body: sweep, sleep, repeat, forever.
pub fn sweep_forever(
    platform: &dyn Platform,
    username: &str,
    window: usize,
    interval: Duration,
) -> WatchResult<()> {
    loop {
        let deleted = sweep_once(platform, username, window)?;
        debug!(deleted, "cleanup pass complete");
        std::thread::sleep(interval);
    }
}
