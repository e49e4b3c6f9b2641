//! Thread and comment data shapes.
//!
//! A thread lives entirely inside the attrs of a comment mark. These types are
//! the (de)serialized form of those attrs; there is no side store. The JSON
//! shape uses camelCase keys and every field defaults, so marks written by
//! older clients still deserialize.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use web_time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Reaction id (usually an emoji shortcode) to the users who reacted with it.
pub type Reactions = BTreeMap<SmolStr, BTreeSet<SmolStr>>;

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Fresh id for a thread or comment. Ids are never reused.
pub fn new_id() -> SmolStr {
    SmolStr::new(uuid::Uuid::new_v4().to_string())
}

/// One authored message in a thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Unique within the thread.
    #[serde(default)]
    pub id: SmolStr,
    /// None means anonymous.
    #[serde(default)]
    pub author_id: Option<SmolStr>,
    #[serde(default)]
    pub author_display_name: SmolStr,
    #[serde(default)]
    pub created_at: Timestamp,
    /// Opaque rich-content payload (itself a small document).
    #[serde(default)]
    pub content: Value,
    /// Deprecated plain-text body from before rich content. Read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_plain_text: Option<String>,
    /// Legacy per-comment flag, superseded by [`Thread::resolved`].
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reactions: Reactions,
}

impl Comment {
    /// Create a new comment with a fresh id.
    pub fn new(author: &Author, content: Value, created_at: Timestamp) -> Self {
        Self {
            id: new_id(),
            author_id: author.id.clone(),
            author_display_name: author.display_name.clone(),
            created_at,
            content,
            ..Default::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.author_id.is_none()
    }
}

/// The anchor-level annotation, carried as the attrs of a comment mark.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Globally unique. Empty only for corrupted (orphan) marks.
    #[serde(default)]
    pub id: SmolStr,
    /// Chronological.
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Last time each user viewed the thread. A missing entry means unread.
    #[serde(default)]
    pub last_opened: BTreeMap<SmolStr, Timestamp>,
    #[serde(default)]
    pub resolved: bool,
}

impl Thread {
    /// Start a thread with its first comment and a fresh id.
    pub fn new(first: Comment) -> Self {
        Self {
            id: new_id(),
            comments: vec![first],
            last_opened: BTreeMap::new(),
            resolved: false,
        }
    }

    /// Parse thread attrs from a mark.
    pub fn from_attrs(attrs: &Value) -> Result<Self, serde_json::Error> {
        Thread::deserialize(attrs)
    }

    /// Serialize into mark attrs.
    pub fn to_attrs(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// A mark that lost its id. See [`crate::scanner::orphan_sweep`].
    pub fn is_orphan(&self) -> bool {
        self.id.is_empty()
    }

    pub fn comment(&self, comment_id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == comment_id)
    }

    pub fn comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }

    /// Timestamp of the newest comment.
    pub fn latest_activity(&self) -> Option<Timestamp> {
        self.comments.iter().map(|c| c.created_at).max()
    }

    /// Record that `user_id` viewed the thread at `now`. Anonymous users
    /// have no entry to record.
    pub fn touch(&mut self, user_id: Option<&str>, now: Timestamp) {
        if let Some(user) = user_id.filter(|u| !u.is_empty()) {
            self.last_opened.insert(SmolStr::new(user), now);
        }
    }
}

/// Identity attached to new comments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Author {
    pub id: Option<SmolStr>,
    pub display_name: SmolStr,
}

impl Author {
    pub fn new(id: impl Into<SmolStr>, display_name: impl Into<SmolStr>) -> Self {
        let id = id.into();
        Self {
            id: (!id.is_empty()).then_some(id),
            display_name: display_name.into(),
        }
    }

    pub fn anonymous(display_name: impl Into<SmolStr>) -> Self {
        Self {
            id: None,
            display_name: display_name.into(),
        }
    }

    pub fn id_str(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// The document node a comment mark was found on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRef {
    /// Index of the node in the host's traversal order.
    pub index: usize,
    /// Size of the node in document positions.
    pub size: usize,
}

/// Ephemeral projection of a thread at its canonical document position.
///
/// Never persisted; always derived fresh by [`crate::scanner::scan`].
#[derive(Clone, Debug, PartialEq)]
pub struct CommentWithPosition {
    pub pos: usize,
    pub node: NodeRef,
    pub thread: Thread,
}

impl CommentWithPosition {
    pub fn id(&self) -> &str {
        &self.thread.id
    }

    /// End of the canonical node carrying the mark.
    pub fn end(&self) -> usize {
        self.pos + self.node.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thread_attrs_camel_case() {
        let mut thread = Thread::new(Comment::new(
            &Author::new("u1", "Ada"),
            json!({"type": "doc"}),
            100,
        ));
        thread.touch(Some("u1"), 100);

        let attrs = thread.to_attrs().unwrap();
        assert!(attrs.get("lastOpened").is_some());
        assert_eq!(attrs["comments"][0]["authorId"], "u1");
        assert_eq!(attrs["comments"][0]["createdAt"], 100);
        assert!(attrs["comments"][0].get("legacyPlainText").is_none());

        let back = Thread::from_attrs(&attrs).unwrap();
        assert_eq!(back, thread);
    }

    #[test]
    fn test_legacy_attrs_default() {
        let attrs = json!({
            "id": "t1",
            "comments": [{"id": "c1", "legacyPlainText": "old body"}]
        });
        let thread = Thread::from_attrs(&attrs).unwrap();
        assert_eq!(thread.id, "t1");
        assert!(!thread.resolved);
        assert!(thread.last_opened.is_empty());
        assert!(thread.comments[0].is_anonymous());
        assert_eq!(
            thread.comments[0].legacy_plain_text.as_deref(),
            Some("old body")
        );
    }

    #[test]
    fn test_missing_id_is_orphan() {
        let thread = Thread::from_attrs(&json!({"comments": []})).unwrap();
        assert!(thread.is_orphan());
    }

    #[test]
    fn test_touch_skips_anonymous() {
        let mut thread = Thread::default();
        thread.touch(None, 5);
        thread.touch(Some(""), 5);
        assert!(thread.last_opened.is_empty());
        thread.touch(Some("u2"), 7);
        assert_eq!(thread.last_opened.get("u2"), Some(&7));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_author_empty_id_is_anonymous() {
        assert_eq!(Author::new("", "Guest").id, None);
        assert_eq!(Author::new("u1", "Ada").id_str(), Some("u1"));
    }
}
