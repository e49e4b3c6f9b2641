//! Derives the comment list from the document's comment marks.
//!
//! The scan is the only source of comment state. It is re-run in full after
//! every transaction instead of being patched incrementally: remote peers can
//! restructure the document arbitrarily between transactions, and a rescan is
//! cheap next to typing latency.

use std::collections::HashSet;

use smol_str::SmolStr;

use crate::document::{CommentDocument, MarkedNode, Transaction};
use crate::types::{CommentWithPosition, NodeRef, Thread};

/// Output of [`scan`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanResult {
    /// One entry per thread id, in ascending document position.
    pub comments: Vec<CommentWithPosition>,
    /// Comment marks without an id. Never returned as threads.
    pub orphans: Vec<CommentWithPosition>,
}

impl ScanResult {
    pub fn find(&self, thread_id: &str) -> Option<&CommentWithPosition> {
        find_thread(&self.comments, thread_id)
    }
}

/// Parse a marked node's thread, or None if it is an orphan.
fn thread_of(node: &MarkedNode) -> Option<Thread> {
    match Thread::from_attrs(&node.mark.attrs) {
        Ok(thread) if !thread.is_orphan() => Some(thread),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(
                target: "weaver::comments",
                pos = node.pos,
                error = %e,
                "comment mark attrs do not parse as a thread"
            );
            None
        }
    }
}

/// Collect every comment thread in the document.
///
/// The first occurrence of a thread id in document order is canonical; later
/// instances (the same mark split across sibling nodes by other formatting)
/// are dropped. Marks without an id go to `orphans`.
pub fn scan<D: CommentDocument>(doc: &D, mark_name: &str) -> ScanResult {
    let mut nodes = doc.marked_nodes(mark_name);
    nodes.sort_by_key(|n| n.pos);

    let mut seen: HashSet<SmolStr> = HashSet::new();
    let mut result = ScanResult::default();

    for node in nodes {
        let node_ref = NodeRef {
            index: node.index,
            size: node.size,
        };
        match thread_of(&node) {
            Some(thread) => {
                if seen.insert(thread.id.clone()) {
                    result.comments.push(CommentWithPosition {
                        pos: node.pos,
                        node: node_ref,
                        thread,
                    });
                }
            }
            None => result.orphans.push(CommentWithPosition {
                pos: node.pos,
                node: node_ref,
                thread: Thread::from_attrs(&node.mark.attrs).unwrap_or_default(),
            }),
        }
    }

    if !result.orphans.is_empty() {
        tracing::warn!(
            target: "weaver::comments",
            orphans = result.orphans.len(),
            "found comment marks without a thread id"
        );
    }

    result
}

/// Every physical mark instance of `thread_id`, in document order.
pub fn thread_ranges<D: CommentDocument>(
    doc: &D,
    mark_name: &str,
    thread_id: &str,
) -> Vec<MarkedNode> {
    doc.marked_nodes(mark_name)
        .into_iter()
        .filter(|node| thread_of(node).is_some_and(|t| t.id == thread_id))
        .collect()
}

/// Corrective transaction stripping every id-less comment mark.
///
/// Orphans are removed, never repaired: the thread they belonged to cannot be
/// reconstructed. Returns None when the document is clean.
pub fn orphan_sweep<D: CommentDocument>(doc: &D, mark_name: &str) -> Option<Transaction> {
    let mut tr = Transaction::new();
    for node in doc.marked_nodes(mark_name) {
        if thread_of(&node).is_none() {
            tr.remove_mark(node.pos, node.end(), node.mark);
        }
    }
    tr.doc_changed().then_some(tr)
}

pub fn find_thread<'a>(
    comments: &'a [CommentWithPosition],
    thread_id: &str,
) -> Option<&'a CommentWithPosition> {
    comments.iter().find(|c| c.thread.id == thread_id)
}
