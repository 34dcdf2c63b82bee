//! Reddit connector: OAuth, listing polls, and the imperative calls.
//!
//! Authentication uses the script-app password grant. The access token is
//! cached and refreshed shortly before expiry; a 401 mid-flight clears the
//! cache and retries the request once with a fresh token.
//!
//! Live streams are polling loops over the listing endpoints. Each stream
//! keeps a high-water set of fullnames so a poll only emits items it has
//! not yielded before; the durable ledger remains the real dedup authority,
//! so this set can be dropped at any time without correctness loss.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::{PlatformError, PlatformResult};
use crate::item::{Item, ItemKind, MessageKind};
use crate::platform::{ItemStream, OwnComment, Platform};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE: &str = "https://oauth.reddit.com";

/// Delay between listing polls when a poll comes back empty.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum items requested per listing poll.
const LISTING_LIMIT: usize = 100;

/// Refresh the token this long before its stated expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Cap on the per-stream high-water set. Clearing it is safe.
const SEEN_CAP: usize = 50_000;

struct Token {
    access_token: String,
    expires_at: Instant,
}

/// Authenticated HTTP client shared by all streams and calls.
struct RedditClient {
    agent: ureq::Agent,
    config: BotConfig,
    token: Mutex<Option<Token>>,
}

impl RedditClient {
    fn new(config: BotConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            config,
            token: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, fetching or refreshing as needed.
    fn bearer(&self) -> PlatformResult<String> {
        let mut slot = self.token.lock().unwrap();
        if let Some(token) = slot.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }
        let token = self.fetch_token()?;
        let access = token.access_token.clone();
        *slot = Some(token);
        Ok(access)
    }

    fn drop_token(&self) {
        *self.token.lock().unwrap() = None;
    }

    fn fetch_token(&self) -> PlatformResult<Token> {
        let basic = BASE64.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ));
        let response = self
            .agent
            .post(TOKEN_URL)
            .set("Authorization", &format!("Basic {basic}"))
            .set("User-Agent", &self.config.user_agent)
            .send_form(&[
                ("grant_type", "password"),
                ("username", &self.config.username),
                ("password", &self.config.password),
            ])
            .map_err(|e| match e {
                ureq::Error::Status(401, _) | ureq::Error::Status(403, _) => {
                    PlatformError::Auth {
                        message: format!("token endpoint rejected credentials: {e}"),
                    }
                }
                other => PlatformError::Transport {
                    message: format!("token request failed: {other}"),
                },
            })?;

        let body: Value = response.into_json().map_err(|e| PlatformError::Parse {
            message: format!("token response is not JSON: {e}"),
        })?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| PlatformError::Auth {
                message: format!("token response carries no access_token: {body}"),
            })?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);

        debug!(expires_in, "obtained access token");
        Ok(Token {
            access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in) - TOKEN_SLACK,
        })
    }

    /// GET an oauth endpoint, retrying once with a fresh token on 401.
    fn get(&self, path: &str) -> PlatformResult<Value> {
        match self.get_once(path) {
            Err(PlatformError::Auth { .. }) => {
                self.drop_token();
                self.get_once(path)
            }
            other => other,
        }
    }

    fn get_once(&self, path: &str) -> PlatformResult<Value> {
        let token = self.bearer()?;
        let response = self
            .agent
            .get(&format!("{OAUTH_BASE}{path}"))
            .set("Authorization", &format!("Bearer {token}"))
            .set("User-Agent", &self.config.user_agent)
            .call()
            .map_err(|e| request_error(path, e))?;
        response.into_json().map_err(|e| PlatformError::Parse {
            message: format!("{path}: response is not JSON: {e}"),
        })
    }

    /// POST a form to an oauth endpoint, retrying once on 401.
    fn post_form(&self, path: &str, form: &[(&str, &str)]) -> PlatformResult<Value> {
        match self.post_form_once(path, form) {
            Err(PlatformError::Auth { .. }) => {
                self.drop_token();
                self.post_form_once(path, form)
            }
            other => other,
        }
    }

    fn post_form_once(&self, path: &str, form: &[(&str, &str)]) -> PlatformResult<Value> {
        let token = self.bearer()?;
        let response = self
            .agent
            .post(&format!("{OAUTH_BASE}{path}"))
            .set("Authorization", &format!("Bearer {token}"))
            .set("User-Agent", &self.config.user_agent)
            .send_form(form)
            .map_err(|e| request_error(path, e))?;
        response.into_json().map_err(|e| PlatformError::Parse {
            message: format!("{path}: response is not JSON: {e}"),
        })
    }

    /// Fetch things by fullname via `/api/info`, keyed by fullname.
    ///
    /// Returns each hit as the parsed item plus its own parent fullname, so
    /// callers can walk one more level up if they need to.
    fn fetch_by_fullname(
        &self,
        fullnames: &[String],
    ) -> PlatformResult<HashMap<String, (Item, Option<String>)>> {
        let ids = fullnames.join(",");
        let listing = self.get(&format!("/api/info.json?id={ids}"))?;
        let mut found = HashMap::new();
        for child in listing_children(&listing)? {
            if let Some((item, parent_id)) = comment_from_json(&child) {
                found.insert(item.id.clone(), (item, parent_id));
            }
        }
        Ok(found)
    }
}

/// Map a ureq failure on an oauth call to a platform error.
fn request_error(path: &str, error: ureq::Error) -> PlatformError {
    match error {
        ureq::Error::Status(401, _) => PlatformError::Auth {
            message: format!("{path}: access token rejected"),
        },
        ureq::Error::Status(code, _) => PlatformError::Transport {
            message: format!("{path}: HTTP {code}"),
        },
        other => PlatformError::Transport {
            message: format!("{path}: {other}"),
        },
    }
}

// ---------------------------------------------------------------------------
// Listing JSON
// ---------------------------------------------------------------------------

/// The `data.children[].data` payloads of a listing, in listing order.
fn listing_children(listing: &Value) -> PlatformResult<Vec<Value>> {
    listing["data"]["children"]
        .as_array()
        .map(|children| children.iter().map(|c| c["data"].clone()).collect())
        .ok_or_else(|| PlatformError::Parse {
            message: format!("listing carries no data.children: {listing}"),
        })
}

/// Author handle, with the deleted-account placeholder mapped to `None`.
fn author_of(data: &Value) -> Option<String> {
    match data["author"].as_str() {
        None | Some("[deleted]") => None,
        Some(name) => Some(name.to_string()),
    }
}

/// Parse one comment payload into an item plus its parent fullname.
fn comment_from_json(data: &Value) -> Option<(Item, Option<String>)> {
    let id = data["name"].as_str()?;
    let body = data["body"].as_str().unwrap_or_default();
    let item = Item {
        id: id.to_string(),
        kind: ItemKind::Comment,
        author: author_of(data),
        body: Some(body.to_string()),
        title: None,
        selftext: None,
        message_kind: None,
        parent: None,
    };
    let parent_id = data["parent_id"].as_str().map(str::to_string);
    Some((item, parent_id))
}

/// Parse one submission payload.
fn submission_from_json(data: &Value) -> Option<Item> {
    let id = data["name"].as_str()?;
    Some(Item {
        id: id.to_string(),
        kind: ItemKind::Submission,
        author: author_of(data),
        body: None,
        title: data["title"].as_str().map(str::to_string),
        selftext: data["selftext"].as_str().map(str::to_string),
        message_kind: None,
        parent: None,
    })
}

/// Parse one unread-inbox payload into a message item plus parent fullname.
fn message_from_json(data: &Value) -> Option<(Item, Option<String>)> {
    let id = data["name"].as_str()?;
    let message_kind = if data["was_comment"].as_bool().unwrap_or(false) {
        match data["subject"].as_str() {
            Some("username mention") => MessageKind::UsernameMention,
            _ => MessageKind::CommentReply,
        }
    } else {
        MessageKind::PrivateMessage
    };
    let item = Item {
        id: id.to_string(),
        kind: ItemKind::Message,
        author: author_of(data),
        body: data["body"].as_str().map(str::to_string),
        title: None,
        selftext: None,
        message_kind: Some(message_kind),
        parent: None,
    };
    let parent_id = data["parent_id"].as_str().map(str::to_string);
    Some((item, parent_id))
}

/// Attach parent chains to freshly polled comments, two levels deep at most.
///
/// Parents are fetched in one `/api/info` batch; grandparents only for
/// parents the bot itself wrote (the only case the reply-loop guard reads
/// that deep).
fn materialize_parents(
    client: &RedditClient,
    batch: Vec<(Item, Option<String>)>,
) -> PlatformResult<Vec<Item>> {
    let wanted: Vec<String> = batch
        .iter()
        .filter_map(|(_, parent_id)| parent_id.clone())
        .filter(|id| id.starts_with("t1_"))
        .collect();
    let mut parents = if wanted.is_empty() {
        HashMap::new()
    } else {
        client.fetch_by_fullname(&wanted)?
    };

    let grandparent_wanted: Vec<String> = parents
        .values()
        .filter(|(item, _)| item.authored_by(&client.config.username))
        .filter_map(|(_, grandparent_id)| grandparent_id.clone())
        .filter(|id| id.starts_with("t1_"))
        .collect();
    let grandparents = if grandparent_wanted.is_empty() {
        HashMap::new()
    } else {
        client.fetch_by_fullname(&grandparent_wanted)?
    };

    for (_, (parent, grandparent_id)) in parents.iter_mut() {
        if let Some(gp_id) = grandparent_id {
            if let Some((grandparent, _)) = grandparents.get(gp_id) {
                parent.parent = Some(Box::new(grandparent.clone()));
            }
        }
    }

    Ok(batch
        .into_iter()
        .map(|(mut item, parent_id)| {
            if let Some(pid) = parent_id {
                if let Some((parent, _)) = parents.get(&pid) {
                    item.parent = Some(Box::new(parent.clone()));
                }
            }
            item
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

enum StreamKind {
    Comments,
    Submissions,
    Inbox,
}

/// Polling iterator over one listing endpoint. Never ends on its own; a
/// request failure is yielded as the final element.
struct ListingStream {
    client: Arc<RedditClient>,
    kind: StreamKind,
    feed: String,
    seen: HashSet<String>,
    ready: VecDeque<Item>,
    primed: bool,
}

impl ListingStream {
    fn new(client: Arc<RedditClient>, kind: StreamKind, feed: &str) -> Self {
        // Feed streams skip whatever is already in the listing at startup.
        // The unread inbox is the opposite: everything in it is backlog,
        // and items only leave the listing once marked read.
        let primed = matches!(kind, StreamKind::Inbox);
        Self {
            client,
            kind,
            feed: feed.to_string(),
            seen: HashSet::new(),
            ready: VecDeque::new(),
            primed,
        }
    }

    fn poll(&mut self) -> PlatformResult<()> {
        let path = match self.kind {
            StreamKind::Comments => {
                format!("/r/{}/comments.json?limit={LISTING_LIMIT}", self.feed)
            }
            StreamKind::Submissions => {
                format!("/r/{}/new.json?limit={LISTING_LIMIT}", self.feed)
            }
            StreamKind::Inbox => format!("/message/unread.json?limit={LISTING_LIMIT}"),
        };
        let listing = self.client.get(&path)?;
        let children = listing_children(&listing)?;

        if self.seen.len() > SEEN_CAP {
            // The ledger still dedups; this set only trims poll output.
            self.seen.clear();
        }

        // Listings are newest-first; emit oldest-first.
        let mut fresh: Vec<(Item, Option<String>)> = Vec::new();
        for data in children.iter().rev() {
            let parsed = match self.kind {
                StreamKind::Comments => comment_from_json(data),
                StreamKind::Inbox => message_from_json(data),
                StreamKind::Submissions => submission_from_json(data).map(|item| (item, None)),
            };
            let Some((item, parent_id)) = parsed else {
                continue;
            };
            if self.seen.insert(item.id.clone()) && self.primed {
                fresh.push((item, parent_id));
            }
        }

        // First poll only establishes the high-water mark.
        if !self.primed {
            self.primed = true;
            debug!(feed = %self.feed, watermark = self.seen.len(), "stream primed");
            return Ok(());
        }

        if !fresh.is_empty() {
            let items = match self.kind {
                StreamKind::Submissions => fresh.into_iter().map(|(item, _)| item).collect(),
                StreamKind::Comments | StreamKind::Inbox => {
                    materialize_parents(&self.client, fresh)?
                }
            };
            self.ready.extend(items);
        }
        Ok(())
    }
}

impl Iterator for ListingStream {
    type Item = PlatformResult<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }
            if let Err(e) = self.poll() {
                return Some(Err(e));
            }
            if self.ready.is_empty() {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RedditPlatform
// ---------------------------------------------------------------------------

/// Live [`Platform`] implementation over the Reddit OAuth API.
pub struct RedditPlatform {
    client: Arc<RedditClient>,
}

impl RedditPlatform {
    /// Build the platform handle. No network traffic happens until the
    /// first stream poll or call.
    pub fn new(config: &BotConfig) -> Self {
        Self {
            client: Arc::new(RedditClient::new(config.clone())),
        }
    }
}

impl Platform for RedditPlatform {
    fn comments(&self, feed: &str) -> PlatformResult<ItemStream> {
        Ok(Box::new(ListingStream::new(
            Arc::clone(&self.client),
            StreamKind::Comments,
            feed,
        )))
    }

    fn submissions(&self, feed: &str) -> PlatformResult<ItemStream> {
        Ok(Box::new(ListingStream::new(
            Arc::clone(&self.client),
            StreamKind::Submissions,
            feed,
        )))
    }

    fn inbox(&self) -> PlatformResult<ItemStream> {
        Ok(Box::new(ListingStream::new(
            Arc::clone(&self.client),
            StreamKind::Inbox,
            "inbox",
        )))
    }

    fn reply(&self, parent_id: &str, text: &str) -> PlatformResult<()> {
        let response = self.client.post_form(
            "/api/comment",
            &[("api_type", "json"), ("thing_id", parent_id), ("text", text)],
        )?;
        let errors = &response["json"]["errors"];
        if errors.as_array().is_some_and(|e| !e.is_empty()) {
            return Err(PlatformError::Delivery {
                item_id: parent_id.to_string(),
                message: errors.to_string(),
            });
        }
        Ok(())
    }

    fn mark_read(&self, message_id: &str) -> PlatformResult<()> {
        self.client
            .post_form("/api/read_message", &[("id", message_id)])?;
        Ok(())
    }

    fn own_recent_comments(
        &self,
        username: &str,
        limit: usize,
    ) -> PlatformResult<Vec<OwnComment>> {
        let listing = self
            .client
            .get(&format!("/user/{username}/comments.json?limit={limit}"))?;
        let mut comments = Vec::new();
        for data in listing_children(&listing)? {
            let Some(id) = data["name"].as_str() else {
                warn!("own-comment listing entry without fullname, skipping");
                continue;
            };
            comments.push(OwnComment {
                id: id.to_string(),
                score: data["score"].as_i64().unwrap_or(0),
            });
        }
        Ok(comments)
    }

    fn delete(&self, comment_id: &str) -> PlatformResult<()> {
        self.client.post_form("/api/del", &[("id", comment_id)])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn comment_parsing_extracts_fullname_author_and_parent() {
        let data = json!({
            "name": "t1_abc",
            "author": "alice",
            "body": "nice game",
            "parent_id": "t1_xyz"
        });
        let (item, parent_id) = comment_from_json(&data).unwrap();
        assert_eq!(item.id, "t1_abc");
        assert_eq!(item.author.as_deref(), Some("alice"));
        assert_eq!(item.body.as_deref(), Some("nice game"));
        assert_eq!(parent_id.as_deref(), Some("t1_xyz"));
    }

    #[test]
    fn deleted_author_becomes_none() {
        let data = json!({"name": "t1_abc", "author": "[deleted]", "body": "x"});
        let (item, _) = comment_from_json(&data).unwrap();
        assert!(item.author.is_none());
    }

    #[test]
    fn submission_parsing_keeps_title_and_selftext() {
        let data = json!({
            "name": "t3_abc",
            "author": "alice",
            "title": "petrosian appreciation thread",
            "selftext": "discuss"
        });
        let item = submission_from_json(&data).unwrap();
        assert_eq!(item.kind, ItemKind::Submission);
        assert_eq!(item.title.as_deref(), Some("petrosian appreciation thread"));
        assert_eq!(item.selftext.as_deref(), Some("discuss"));
    }

    #[test]
    fn inbox_kinds_are_classified_by_subject_and_was_comment() {
        let mention = json!({
            "name": "t1_m", "author": "alice", "body": "u/kibitzbot",
            "was_comment": true, "subject": "username mention"
        });
        let reply = json!({
            "name": "t1_r", "author": "bob", "body": "lol",
            "was_comment": true, "subject": "comment reply"
        });
        let pm = json!({
            "name": "t4_p", "author": "carol", "body": "hi",
            "was_comment": false, "subject": "hello"
        });

        let (m, _) = message_from_json(&mention).unwrap();
        let (r, _) = message_from_json(&reply).unwrap();
        let (p, _) = message_from_json(&pm).unwrap();
        assert_eq!(m.message_kind, Some(MessageKind::UsernameMention));
        assert_eq!(r.message_kind, Some(MessageKind::CommentReply));
        assert_eq!(p.message_kind, Some(MessageKind::PrivateMessage));
    }

    #[test]
    fn listing_children_rejects_non_listing_shapes() {
        assert!(listing_children(&json!({"error": 403})).is_err());

        let listing = json!({"data": {"children": [
            {"data": {"name": "t1_a"}},
            {"data": {"name": "t1_b"}}
        ]}});
        assert_eq!(listing_children(&listing).unwrap().len(), 2);
    }

    #[test]
    fn entry_without_fullname_is_skipped() {
        assert!(comment_from_json(&json!({"author": "alice", "body": "x"})).is_none());
        assert!(submission_from_json(&json!({"title": "x"})).is_none());
    }
}
