//! The decision engine: should the bot respond to an item, and how.
//!
//! `Classifier::decide` is total: every input gets a [`Decision`], and the
//! only error it can surface is a ledger failure. Side effects are limited
//! to the ledger: the mark is written *before* the caller is told to
//! respond, so a crash between mark and reply costs at most one missed
//! reply, never a duplicate.
//!
//! Decision order, per item:
//! 1. opt-out token anywhere in the raw text: skip, and deliberately leave
//!    the ledger untouched so an edited item can still trigger later
//! 2. reply-loop guard (comments only)
//! 3. keyword match over normalized text, with exact-match low-effort check
//! 4. known rank-bot author: forced low-effort match
//! 5. no match: the loose-feed dice roll, or skip without marking
//! 6. self-authored: mark and skip
//! 7. ledger gate: first marker wins the right to respond

use std::sync::Arc;

use rand::Rng;

use crate::config::BotConfig;
use crate::error::LedgerResult;
use crate::item::{Item, ItemKind};
use crate::ledger::Ledger;

/// Token an author can put anywhere in their text to opt out of replies.
/// Checked case-insensitively against the raw (non-normalized) text.
pub const OPT_OUT_TOKEN: &str = "!kibitzoff";

/// A known bot account that rates other bots; it gets the terse reply
/// regardless of keyword content.
pub const RANK_BOT: &str = "B0tRank";

/// Sides of the loose-feed die. One roll per unmatched item.
pub const LOOSE_ROLL_SIDES: u32 = 1000;

/// The winning face. A hit responds with the full reply despite no keyword.
pub const LOOSE_ROLL_HIT: u32 = 777;

/// Which reply template to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyVariant {
    /// The complete scripted message.
    Full,
    /// A terse one-liner, used when the text is nothing but a keyword.
    ShortPhrase,
}

/// The classifier's verdict for one item. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Do not respond.
    Skip,
    /// Respond with the given variant.
    Respond(ReplyVariant),
}

impl Decision {
    /// Whether this decision calls for a reply.
    pub fn should_respond(&self) -> bool {
        matches!(self, Decision::Respond(_))
    }
}

/// Pure decision function over items, backed by the dedup ledger.
///
/// Shared across all watcher threads; the ledger provides the only
/// synchronization the check-then-mark sequence needs.
pub struct Classifier {
    keywords: Vec<String>,
    username: String,
    loose_feeds: Vec<String>,
    ledger: Arc<Ledger>,
}

impl Classifier {
    /// Build a classifier from the bot configuration.
    pub fn new(config: &BotConfig, ledger: Arc<Ledger>) -> Self {
        Self {
            keywords: config.keywords.clone(),
            username: config.username.clone(),
            loose_feeds: config.loose_feeds.clone(),
            ledger,
        }
    }

    /// Decide whether to respond to `item` observed on `feed`.
    ///
    /// `rng` drives the loose-feed easter-egg roll; watchers pass
    /// `rand::thread_rng()`, tests pass a seeded generator.
    pub fn decide<R: Rng>(&self, item: &Item, feed: &str, rng: &mut R) -> LedgerResult<Decision> {
        // Opt-out short-circuits everything, including ledger marking.
        if self.has_opt_out(item) {
            return Ok(Decision::Skip);
        }

        if item.kind == ItemKind::Comment && self.is_reply_loop(item) {
            return Ok(Decision::Skip);
        }

        let mut matched = self.match_keywords(item);
        // The rank bot always gets the terse treatment, matched or not.
        if item.authored_by(RANK_BOT) {
            matched = Some(ReplyVariant::ShortPhrase);
        }

        let variant = match matched {
            Some(variant) => variant,
            None => {
                // No canonical decision is recorded for a miss: the ledger
                // stays untouched so a replayed miss rolls the die again.
                if self.is_loose_feed(feed)
                    && rng.gen_range(0..LOOSE_ROLL_SIDES) == LOOSE_ROLL_HIT
                {
                    ReplyVariant::Full
                } else {
                    return Ok(Decision::Skip);
                }
            }
        };

        // The bot's own items are remembered so a stream replay does not
        // reprocess them, but they never get a reply.
        if item.authored_by(&self.username) {
            self.ledger.mark_seen(&item.id)?;
            return Ok(Decision::Skip);
        }

        // At-most-once gate: only the first marker of this id responds.
        if self.ledger.mark_if_new(&item.id)? {
            Ok(Decision::Respond(variant))
        } else {
            Ok(Decision::Skip)
        }
    }

    /// Opt-out check against raw lowercased text, independent of normalization.
    fn has_opt_out(&self, item: &Item) -> bool {
        item.text_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(OPT_OUT_TOKEN))
    }

    /// Reply-loop guard: the author is replying to the bot's own reply to
    /// that same author. Requires comment -> comment ancestry.
    fn is_reply_loop(&self, item: &Item) -> bool {
        let Some(parent) = item.parent.as_deref() else {
            return false;
        };
        if parent.kind != ItemKind::Comment || !parent.authored_by(&self.username) {
            return false;
        }
        let Some(grandparent) = parent.parent.as_deref() else {
            return false;
        };
        grandparent.kind == ItemKind::Comment
            && match (&grandparent.author, &item.author) {
                (Some(gp), Some(cur)) => gp.eq_ignore_ascii_case(cur),
                _ => false,
            }
    }

    /// Substring keyword match over normalized fields. Each field is also
    /// checked independently for the exact-match (low-effort) condition.
    fn match_keywords(&self, item: &Item) -> Option<ReplyVariant> {
        let mut variant = None;
        for field in item.text_fields() {
            let normalized = normalize(field);
            for keyword in &self.keywords {
                if normalized.contains(keyword.as_str()) {
                    if normalized.trim() == keyword {
                        return Some(ReplyVariant::ShortPhrase);
                    }
                    variant.get_or_insert(ReplyVariant::Full);
                }
            }
        }
        variant
    }

    fn is_loose_feed(&self, feed: &str) -> bool {
        self.loose_feeds.iter().any(|f| f.eq_ignore_ascii_case(feed))
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("keywords", &self.keywords)
            .field("username", &self.username)
            .field("loose_feeds", &self.loose_feeds)
            .finish()
    }
}

/// Normalize text for keyword matching: lowercase, strip punctuation.
/// Whitespace is preserved so exact-match still sees token boundaries.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}
