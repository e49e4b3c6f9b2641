//! Derived plugin state, recomputed on every transaction.
//!
//! Everything here is client-local. The comment list is replaced wholesale by
//! each rescan; the remaining fields change only through transaction meta.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::document::Transaction;
use crate::types::CommentWithPosition;

/// The focused thread(s). Several ids when a cluster is focused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveThread {
    pub from: usize,
    pub to: usize,
    pub ids: Vec<SmolStr>,
}

impl ActiveThread {
    pub fn single(from: usize, to: usize, id: impl Into<SmolStr>) -> Self {
        Self {
            from,
            to,
            ids: vec![id.into()],
        }
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.ids.iter().any(|id| id == thread_id)
    }
}

/// Unsent reply or edit buffer.
///
/// Keyed by thread (and comment, for edits) so it survives remounts of the
/// component that owns the editor; cleared on submit or explicit discard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub thread_id: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<SmolStr>,
    pub content: Value,
}

/// State changes a transaction asks for. `None` fields leave state alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateMeta {
    pub open: Option<bool>,
    pub active_thread: Option<Option<ActiveThread>>,
    pub draft: Option<Option<Draft>>,
    pub show_resolved: Option<bool>,
}

impl StateMeta {
    /// Drop focus and close the compose popup.
    pub fn defocus() -> Self {
        Self {
            open: Some(false),
            active_thread: Some(None),
            ..Default::default()
        }
    }

    pub fn activate(active: ActiveThread) -> Self {
        Self {
            open: Some(false),
            active_thread: Some(Some(active)),
            ..Default::default()
        }
    }

    pub fn clear_draft() -> Self {
        Self {
            draft: Some(None),
            ..Default::default()
        }
    }

    pub fn with_clear_draft(mut self) -> Self {
        self.draft = Some(None);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PluginState {
    /// Whether the compose-new-thread popup is open.
    pub open: bool,
    pub active_thread: Option<ActiveThread>,
    /// Document order, straight from the scanner.
    pub comments: Vec<CommentWithPosition>,
    pub show_resolved: bool,
    pub draft: Option<Draft>,
}

impl PluginState {
    pub fn init(comments: Vec<CommentWithPosition>) -> Self {
        Self {
            comments,
            ..Default::default()
        }
    }

    /// State after `tr`, given the fresh scan of the resulting document.
    pub fn apply(&self, tr: &Transaction, comments: Vec<CommentWithPosition>) -> Self {
        let mut next = Self {
            comments,
            ..self.clone()
        };

        if let Some(meta) = &tr.meta {
            if let Some(open) = meta.open {
                next.open = open;
            }
            if let Some(active) = &meta.active_thread {
                next.active_thread = active.clone();
            }
            if let Some(draft) = &meta.draft {
                next.draft = draft.clone();
            }
            if let Some(show) = meta.show_resolved {
                next.show_resolved = show;
            }
        }

        let active = next.active_thread.take();
        next.active_thread = active.and_then(|active| next.remap_active(active));
        next
    }

    /// Keep only ids still present and move the range to where they are now.
    fn remap_active(&self, active: ActiveThread) -> Option<ActiveThread> {
        let live: Vec<&CommentWithPosition> = active
            .ids
            .iter()
            .filter_map(|id| self.find(id))
            .collect();
        if live.is_empty() {
            tracing::debug!(
                target: "weaver::comments",
                ids = ?active.ids,
                "active thread no longer in document"
            );
            return None;
        }
        Some(ActiveThread {
            from: live.iter().map(|c| c.pos).min().unwrap_or(active.from),
            to: live.iter().map(|c| c.end()).max().unwrap_or(active.to),
            ids: live.iter().map(|c| c.thread.id.clone()).collect(),
        })
    }

    pub fn find(&self, thread_id: &str) -> Option<&CommentWithPosition> {
        crate::scanner::find_thread(&self.comments, thread_id)
    }

    /// Threads that get a floating bubble: unresolved, document order.
    pub fn visible_comments(&self) -> Vec<CommentWithPosition> {
        self.comments
            .iter()
            .filter(|c| !c.thread.resolved)
            .cloned()
            .collect()
    }

    /// Threads listed in the side panel, honouring the show-resolved filter.
    pub fn listed_comments(&self) -> Vec<&CommentWithPosition> {
        self.comments
            .iter()
            .filter(|c| self.show_resolved || !c.thread.resolved)
            .collect()
    }

    /// Index of the first active thread within `visible`.
    pub fn focused_index(&self, visible: &[CommentWithPosition]) -> Option<usize> {
        let active = self.active_thread.as_ref()?;
        visible.iter().position(|c| active.contains(&c.thread.id))
    }

    pub fn is_active(&self, thread_id: &str) -> bool {
        self.active_thread
            .as_ref()
            .is_some_and(|a| a.contains(thread_id))
    }

    pub fn update_draft(&mut self, draft: Draft) {
        self.draft = Some(draft);
    }

    pub fn clear_draft(&mut self) {
        self.draft = None;
    }

    /// Draft for this thread (and comment, when editing), if any.
    pub fn draft_for(&self, thread_id: &str, comment_id: Option<&str>) -> Option<&Draft> {
        self.draft
            .as_ref()
            .filter(|d| d.thread_id == thread_id && d.comment_id.as_deref() == comment_id)
    }
}
