//! Content items observed from the platform.
//!
//! An [`Item`] is an immutable snapshot of one unit of content (a comment, a
//! submission, or an inbox message) as yielded by a live stream. The core
//! never mutates items; it only reads them and reacts. The parent chain is
//! materialized by the stream source to the depth the reply-loop guard needs
//! (two ancestors) before the item reaches the classifier.

use serde::{Deserialize, Serialize};

/// What kind of content unit an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// A comment on a submission or on another comment.
    Comment,
    /// A top-level post (link or self-post).
    Submission,
    /// An inbox message (mention, comment reply, or private message).
    Message,
}

/// For inbox items only: which flavor of message this is.
///
/// The mentions watcher acts on `UsernameMention` and ignores the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// The bot's username was mentioned in a comment.
    UsernameMention,
    /// A reply to one of the bot's comments.
    CommentReply,
    /// A direct private message.
    PrivateMessage,
}

/// An immutable content snapshot fetched from an external stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Opaque stable identifier, unique within the platform (a fullname
    /// like `t1_abc123` for comments, `t3_xyz789` for submissions).
    pub id: String,
    /// Content kind.
    pub kind: ItemKind,
    /// Author handle. `None` when the account is deleted or suspended.
    pub author: Option<String>,
    /// Comment or message body.
    pub body: Option<String>,
    /// Submission title.
    pub title: Option<String>,
    /// Submission self-text.
    pub selftext: Option<String>,
    /// Inbox message flavor. `None` for non-message items.
    pub message_kind: Option<MessageKind>,
    /// Immediate ancestor, oldest reachable through `.parent` recursively.
    pub parent: Option<Box<Item>>,
}

impl Item {
    /// Build a comment item.
    pub fn comment(id: impl Into<String>, author: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Comment,
            author: author.map(str::to_string),
            body: Some(body.into()),
            title: None,
            selftext: None,
            message_kind: None,
            parent: None,
        }
    }

    /// Build a submission item.
    pub fn submission(
        id: impl Into<String>,
        author: Option<&str>,
        title: impl Into<String>,
        selftext: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Submission,
            author: author.map(str::to_string),
            body: None,
            title: Some(title.into()),
            selftext: Some(selftext.into()),
            message_kind: None,
            parent: None,
        }
    }

    /// Build an inbox message item.
    pub fn message(
        id: impl Into<String>,
        author: Option<&str>,
        body: impl Into<String>,
        message_kind: MessageKind,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Message,
            author: author.map(str::to_string),
            body: Some(body.into()),
            title: None,
            selftext: None,
            message_kind: Some(message_kind),
            parent: None,
        }
    }

    /// Attach an immediate ancestor (builder-style).
    pub fn with_parent(mut self, parent: Item) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// The raw text fields relevant for this item's kind, in a fixed order.
    ///
    /// Comments and messages expose the body; submissions expose title and
    /// self-text. Missing fields are skipped, never substituted.
    pub fn text_fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(2);
        match self.kind {
            ItemKind::Comment | ItemKind::Message => {
                if let Some(ref body) = self.body {
                    fields.push(body.as_str());
                }
            }
            ItemKind::Submission => {
                if let Some(ref title) = self.title {
                    fields.push(title.as_str());
                }
                if let Some(ref selftext) = self.selftext {
                    fields.push(selftext.as_str());
                }
            }
        }
        fields
    }

    /// Whether this item was authored by `username` (case-insensitive, the
    /// platform treats handles as case-preserving but not case-sensitive).
    ///
    /// Absent/deleted authors never match anyone.
    pub fn authored_by(&self, username: &str) -> bool {
        self.author
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_exposes_body_only() {
        let item = Item::comment("t1_a", Some("alice"), "hello");
        assert_eq!(item.text_fields(), vec!["hello"]);
    }

    #[test]
    fn submission_exposes_title_and_selftext() {
        let item = Item::submission("t3_a", Some("alice"), "a title", "a body");
        assert_eq!(item.text_fields(), vec!["a title", "a body"]);
    }

    #[test]
    fn missing_fields_are_skipped() {
        let mut item = Item::submission("t3_a", Some("alice"), "a title", "");
        item.selftext = None;
        assert_eq!(item.text_fields(), vec!["a title"]);
    }

    #[test]
    fn authored_by_is_case_insensitive() {
        let item = Item::comment("t1_a", Some("KibitzBot"), "x");
        assert!(item.authored_by("kibitzbot"));
        assert!(item.authored_by("KIBITZBOT"));
        assert!(!item.authored_by("alice"));
    }

    #[test]
    fn deleted_author_matches_nobody() {
        let item = Item::comment("t1_a", None, "x");
        assert!(!item.authored_by("kibitzbot"));
        assert!(!item.authored_by(""));
    }

    #[test]
    fn parent_chain_nests() {
        let grandparent = Item::comment("t1_g", Some("alice"), "gp");
        let parent = Item::comment("t1_p", Some("bot"), "p").with_parent(grandparent);
        let item = Item::comment("t1_c", Some("alice"), "c").with_parent(parent);

        let p = item.parent.as_deref().unwrap();
        assert_eq!(p.id, "t1_p");
        let gp = p.parent.as_deref().unwrap();
        assert_eq!(gp.id, "t1_g");
    }
}
