//! Reference host document: a flat run of inline text nodes carrying marks.
//!
//! Positions are character offsets into the concatenated text. Adding or
//! removing a mark splits nodes at the range boundaries; afterwards adjacent
//! nodes with identical marks and region are merged back together, which is
//! the same normalisation a tree editor applies to inline content.
//!
//! This is what the CLI reads from disk and what the tests drive. Real hosts
//! implement [`CommentDocument`] over their own tree.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::document::{AnchorContext, CommentDocument, Mark, MarkedNode, Step, Transaction};
use crate::error::DocumentError;

/// A run of text sharing the same marks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    /// Embedded sub-editor region this text lives in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<SmolStr>,
    /// Stable node id (mention nodes and other addressable atoms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SmolStr>,
    /// Inside a folded section.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl InlineNode {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }

    pub fn in_region(mut self, region: impl Into<SmolStr>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<SmolStr>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn mergeable_with(&self, other: &InlineNode) -> bool {
        self.id.is_none()
            && other.id.is_none()
            && self.region == other.region
            && self.hidden == other.hidden
            && self.marks.len() == other.marks.len()
            && self.marks.iter().all(|m| other.marks.contains(m))
    }
}

fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

/// Flat inline document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineDocument {
    pub nodes: Vec<InlineNode>,
}

impl InlineDocument {
    pub fn new(nodes: Vec<InlineNode>) -> Self {
        let mut doc = Self { nodes };
        doc.normalize();
        doc
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![InlineNode::text(text)])
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let doc: InlineDocument = serde_json::from_str(json)?;
        Ok(Self::new(doc.nodes))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Concatenated text of all nodes.
    pub fn text(&self) -> String {
        self.nodes.iter().map(|n| n.text.as_str()).collect()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(InlineNode::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `mark` to every node in `from..to`, splitting at the edges.
    pub fn add_mark(&mut self, from: usize, to: usize, mark: Mark) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }
        let start = self.split_at(from);
        let end = self.split_at(to);
        for node in &mut self.nodes[start..end] {
            if !node.marks.contains(&mark) {
                node.marks.push(mark.clone());
            }
        }
        self.normalize();
        Ok(())
    }

    /// Remove this exact mark instance from every node in `from..to`.
    pub fn remove_mark(
        &mut self,
        from: usize,
        to: usize,
        mark: &Mark,
    ) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        if from == to {
            return Ok(());
        }
        let start = self.split_at(from);
        let end = self.split_at(to);
        for node in &mut self.nodes[start..end] {
            node.marks.retain(|m| m != mark);
        }
        self.normalize();
        Ok(())
    }

    /// Insert text at `pos`. Text typed strictly inside a node takes that
    /// node's marks; text at a node boundary starts unmarked.
    pub fn insert_text(&mut self, pos: usize, text: &str) -> Result<(), DocumentError> {
        self.check_range(pos, pos)?;
        if text.is_empty() {
            return Ok(());
        }

        let mut start = 0;
        let mut inside = None;
        for (i, node) in self.nodes.iter().enumerate() {
            let len = node.len();
            if start < pos && pos < start + len {
                inside = Some((i, pos - start));
                break;
            }
            start += len;
        }

        if let Some((i, offset)) = inside {
            let node = &mut self.nodes[i];
            let at = byte_index(&node.text, offset);
            node.text.insert_str(at, text);
            self.normalize();
            return Ok(());
        }

        let idx = self.split_at(pos);
        let region = idx
            .checked_sub(1)
            .and_then(|prev| self.nodes[prev].region.clone());
        let mut node = InlineNode::text(text);
        node.region = region;
        self.nodes.insert(idx, node);
        self.normalize();
        Ok(())
    }

    /// Fold or unfold `from..to`.
    pub fn set_hidden(&mut self, from: usize, to: usize, hidden: bool) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        let start = self.split_at(from);
        let end = self.split_at(to);
        for node in &mut self.nodes[start..end] {
            node.hidden = hidden;
        }
        self.normalize();
        Ok(())
    }

    /// Delete `from..to`. Marks on the deleted text go with it.
    pub fn delete_range(&mut self, from: usize, to: usize) -> Result<(), DocumentError> {
        self.check_range(from, to)?;
        let start = self.split_at(from);
        let end = self.split_at(to);
        self.nodes.drain(start..end);
        self.normalize();
        Ok(())
    }

    fn check_range(&self, from: usize, to: usize) -> Result<(), DocumentError> {
        if from > to {
            return Err(DocumentError::InvalidRange { from, to });
        }
        let size = self.len();
        if to > size {
            return Err(DocumentError::OutOfRange { from, to, size });
        }
        Ok(())
    }

    /// Ensure a node starts at `pos` and return its index.
    fn split_at(&mut self, pos: usize) -> usize {
        let mut start = 0;
        for i in 0..self.nodes.len() {
            let len = self.nodes[i].len();
            if pos == start {
                return i;
            }
            if pos < start + len {
                let node = &mut self.nodes[i];
                let at = byte_index(&node.text, pos - start);
                let right = InlineNode {
                    text: node.text.split_off(at),
                    marks: node.marks.clone(),
                    region: node.region.clone(),
                    id: None,
                    hidden: node.hidden,
                };
                self.nodes.insert(i + 1, right);
                return i + 1;
            }
            start += len;
        }
        self.nodes.len()
    }

    fn normalize(&mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        let mut merged: Vec<InlineNode> = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.text.is_empty() && node.id.is_none() {
                continue;
            }
            if let Some(last) = merged.last_mut() {
                if last.mergeable_with(&node) {
                    last.text.push_str(&node.text);
                    continue;
                }
            }
            merged.push(node);
        }
        self.nodes = merged;
    }
}

impl CommentDocument for InlineDocument {
    fn size(&self) -> usize {
        self.len()
    }

    fn marked_nodes(&self, mark_name: &str) -> Vec<MarkedNode> {
        let mut out = Vec::new();
        let mut pos = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            let size = node.len();
            for mark in node.marks.iter().filter(|m| m.name == mark_name) {
                out.push(MarkedNode {
                    index,
                    pos,
                    size,
                    mark: mark.clone(),
                });
            }
            pos += size;
        }
        out
    }

    fn apply(&mut self, tr: &Transaction) -> Result<(), DocumentError> {
        let mut next = self.clone();
        for step in &tr.steps {
            match step {
                Step::AddMark { from, to, mark } => next.add_mark(*from, *to, mark.clone())?,
                Step::RemoveMark { from, to, mark } => next.remove_mark(*from, *to, mark)?,
            }
        }
        *self = next;
        Ok(())
    }

    fn anchor_context(&self, pos: usize) -> AnchorContext {
        let mut start = 0;
        for node in &self.nodes {
            let len = node.len();
            if pos < start + len {
                return match &node.region {
                    Some(region) => AnchorContext::Embedded {
                        region: region.clone(),
                    },
                    None => AnchorContext::Host,
                };
            }
            start += len;
        }
        match self.nodes.last().and_then(|n| n.region.clone()) {
            Some(region) => AnchorContext::Embedded { region },
            None => AnchorContext::Host,
        }
    }

    fn node_position(&self, node_id: &str) -> Option<usize> {
        let mut pos = 0;
        for node in &self.nodes {
            if node.id.as_deref() == Some(node_id) {
                return Some(pos);
            }
            pos += node.len();
        }
        None
    }

    fn is_hidden(&self, pos: usize) -> bool {
        let mut start = 0;
        for node in &self.nodes {
            let len = node.len();
            if pos < start + len {
                return node.hidden;
            }
            start += len;
        }
        false
    }
}
