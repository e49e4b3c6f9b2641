//! Host document interface.
//!
//! The comment engine never owns document structure. It reads comment marks
//! through [`CommentDocument::marked_nodes`] and writes them back through
//! [`Transaction`]s the host applies atomically. Remote peers may rewrite the
//! document between any two transactions; the engine rescans afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::DocumentError;
use crate::state::StateMeta;
use crate::types::Thread;

/// Default name of the comment mark type.
pub const COMMENT_MARK: &str = "comment";

/// A named, range-attached metadata object on inline content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attrs: Value,
}

impl Mark {
    pub fn new(name: impl Into<SmolStr>, attrs: Value) -> Self {
        Self {
            name: name.into(),
            attrs,
        }
    }

    /// Build a comment mark carrying `thread` as its attrs.
    pub fn comment(name: &str, thread: &Thread) -> Result<Self, serde_json::Error> {
        Ok(Self::new(name, thread.to_attrs()?))
    }
}

/// One `(node, mark)` pair returned by the host's scan primitive.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkedNode {
    /// Index of the node in traversal order.
    pub index: usize,
    /// Document position where the node starts.
    pub pos: usize,
    /// Node size in document positions.
    pub size: usize,
    pub mark: Mark,
}

impl MarkedNode {
    pub fn end(&self) -> usize {
        self.pos + self.size
    }
}

/// Where an anchor lives, which decides how it is resolved to pixels.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnchorContext {
    /// Regular host document content.
    Host,
    /// Inside an embedded sub-editor (e.g. a code block) with its own DOM.
    Embedded { region: SmolStr },
}

/// A single mark step.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    AddMark { from: usize, to: usize, mark: Mark },
    RemoveMark { from: usize, to: usize, mark: Mark },
}

/// An atomic batch of mark steps plus plugin-state metadata.
///
/// Hosts must apply every step or none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    pub steps: Vec<Step>,
    pub meta: Option<StateMeta>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transaction that only changes plugin state.
    pub fn meta_only(meta: StateMeta) -> Self {
        Self {
            steps: Vec::new(),
            meta: Some(meta),
        }
    }

    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> &mut Self {
        self.steps.push(Step::AddMark { from, to, mark });
        self
    }

    pub fn remove_mark(&mut self, from: usize, to: usize, mark: Mark) -> &mut Self {
        self.steps.push(Step::RemoveMark { from, to, mark });
        self
    }

    pub fn with_meta(mut self, meta: StateMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Whether applying this transaction touches the document at all.
    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.meta.is_none()
    }
}

/// What the comment engine needs from a host document.
pub trait CommentDocument {
    /// Document size in positions. Anchors beyond this are stale.
    fn size(&self) -> usize;

    /// Every node carrying a mark named `mark_name`, in document order.
    ///
    /// A node carrying several such marks yields one entry per mark.
    fn marked_nodes(&self, mark_name: &str) -> Vec<MarkedNode>;

    /// Apply all steps atomically.
    fn apply(&mut self, tr: &Transaction) -> Result<(), DocumentError>;

    /// Classify the anchor at `pos`.
    fn anchor_context(&self, _pos: usize) -> AnchorContext {
        AnchorContext::Host
    }

    /// Position of a node with the given id, if the host tracks node ids.
    fn node_position(&self, _node_id: &str) -> Option<usize> {
        None
    }

    /// Whether content at `pos` is folded away. Hidden anchors get no bubble.
    fn is_hidden(&self, _pos: usize) -> bool {
        false
    }
}
