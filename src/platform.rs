//! Platform abstraction: trait + mock implementation.
//!
//! `Platform` is the boundary to the external collaborator that owns
//! authentication, transport, rate limiting, and pagination. The core only
//! sees blocking item streams and a handful of imperative calls.
//! `MockPlatform` provides scripted streams and records outbound calls for
//! unit and integration testing.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{PlatformError, PlatformResult};
use crate::item::Item;

/// A blocking stream of items. Live implementations never end; reaching the
/// end is an abnormal condition the watcher reports to the supervisor.
pub type ItemStream = Box<dyn Iterator<Item = PlatformResult<Item>> + Send>;

/// One of the bot's own comments, as seen by the cleanup sweeper.
#[derive(Debug, Clone)]
pub struct OwnComment {
    /// Fullname of the comment.
    pub id: String,
    /// Current community score.
    pub score: i64,
}

/// The external collaborator interface.
///
/// Implementations must be `Send + Sync`: one handle is shared across all
/// watcher threads for the lifetime of the process.
pub trait Platform: Send + Sync {
    /// Open a live blocking stream of new comments on `feed`.
    fn comments(&self, feed: &str) -> PlatformResult<ItemStream>;

    /// Open a live blocking stream of new submissions on `feed`.
    fn submissions(&self, feed: &str) -> PlatformResult<ItemStream>;

    /// Open a live blocking stream of unread inbox messages.
    fn inbox(&self) -> PlatformResult<ItemStream>;

    /// Submit a reply under the item with fullname `parent_id`.
    fn reply(&self, parent_id: &str, text: &str) -> PlatformResult<()>;

    /// Acknowledge an inbox message as read.
    fn mark_read(&self, message_id: &str) -> PlatformResult<()>;

    /// The most recent comments posted by `username`, newest first.
    fn own_recent_comments(&self, username: &str, limit: usize)
    -> PlatformResult<Vec<OwnComment>>;

    /// Delete one of the bot's own comments. Deleting an already-deleted
    /// comment must be treated as a no-op by callers.
    fn delete(&self, comment_id: &str) -> PlatformResult<()>;
}

// ---------------------------------------------------------------------------
// MockPlatform
// ---------------------------------------------------------------------------

/// In-memory platform for tests: scripted finite streams, recorded calls.
///
/// Streams yield the scripted items then end, which lets tests drive a
/// watcher to completion (the watcher reports the ended stream as abnormal,
/// exactly as it would in production).
#[derive(Default)]
pub struct MockPlatform {
    comment_feeds: Mutex<HashMap<String, Vec<PlatformResult<Item>>>>,
    submission_feeds: Mutex<HashMap<String, Vec<PlatformResult<Item>>>>,
    inbox_items: Mutex<Vec<PlatformResult<Item>>>,
    own_comments: Mutex<Vec<OwnComment>>,
    /// (parent_id, reply text) pairs, in submission order.
    pub replies: Mutex<Vec<(String, String)>>,
    /// Message ids acknowledged as read.
    pub read: Mutex<Vec<String>>,
    /// Comment ids deleted.
    pub deleted: Mutex<Vec<String>>,
    /// When set, `reply` fails with a delivery error.
    pub fail_replies: Mutex<bool>,
}

impl MockPlatform {
    /// An empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the comment stream for `feed`.
    pub fn script_comments(&self, feed: &str, items: Vec<Item>) {
        self.comment_feeds
            .lock()
            .unwrap()
            .insert(feed.to_string(), items.into_iter().map(Ok).collect());
    }

    /// Script the submission stream for `feed`.
    pub fn script_submissions(&self, feed: &str, items: Vec<Item>) {
        self.submission_feeds
            .lock()
            .unwrap()
            .insert(feed.to_string(), items.into_iter().map(Ok).collect());
    }

    /// Script the inbox stream.
    pub fn script_inbox(&self, items: Vec<Item>) {
        *self.inbox_items.lock().unwrap() = items.into_iter().map(Ok).collect();
    }

    /// Script a mid-stream transport error for `feed`'s comments.
    pub fn script_comment_error(&self, feed: &str, message: &str) {
        self.comment_feeds
            .lock()
            .unwrap()
            .entry(feed.to_string())
            .or_default()
            .push(Err(PlatformError::Transport {
                message: message.to_string(),
            }));
    }

    /// Script the bot's own recent comments for the sweeper.
    pub fn script_own_comments(&self, comments: Vec<OwnComment>) {
        *self.own_comments.lock().unwrap() = comments;
    }

    fn take_stream(source: &Mutex<HashMap<String, Vec<PlatformResult<Item>>>>, feed: &str) -> ItemStream {
        let items = source.lock().unwrap().remove(feed).unwrap_or_default();
        Box::new(items.into_iter())
    }
}

impl Platform for MockPlatform {
    fn comments(&self, feed: &str) -> PlatformResult<ItemStream> {
        Ok(Self::take_stream(&self.comment_feeds, feed))
    }

    fn submissions(&self, feed: &str) -> PlatformResult<ItemStream> {
        Ok(Self::take_stream(&self.submission_feeds, feed))
    }

    fn inbox(&self) -> PlatformResult<ItemStream> {
        let items = std::mem::take(&mut *self.inbox_items.lock().unwrap());
        Ok(Box::new(items.into_iter()))
    }

    fn reply(&self, parent_id: &str, text: &str) -> PlatformResult<()> {
        if *self.fail_replies.lock().unwrap() {
            return Err(PlatformError::Delivery {
                item_id: parent_id.to_string(),
                message: "scripted delivery failure".to_string(),
            });
        }
        self.replies
            .lock()
            .unwrap()
            .push((parent_id.to_string(), text.to_string()));
        Ok(())
    }

    fn mark_read(&self, message_id: &str) -> PlatformResult<()> {
        self.read.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    fn own_recent_comments(
        &self,
        _username: &str,
        limit: usize,
    ) -> PlatformResult<Vec<OwnComment>> {
        let comments = self.own_comments.lock().unwrap();
        Ok(comments.iter().take(limit).cloned().collect())
    }

    fn delete(&self, comment_id: &str) -> PlatformResult<()> {
        self.deleted.lock().unwrap().push(comment_id.to_string());
        Ok(())
    }
}
