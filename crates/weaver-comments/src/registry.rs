//! Thread id to rendered bubble handle.
//!
//! Hosts register the element they rendered for each bubble together with
//! the anchor position it was rendered for. Entries whose thread left the
//! document are pruned after every rescan so stale handles never linger.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::types::CommentWithPosition;

#[derive(Clone, Debug, PartialEq)]
pub struct Anchored<E> {
    pub element: E,
    pub pos: usize,
}

#[derive(Clone, Debug)]
pub struct AnchorRegistry<E> {
    entries: HashMap<SmolStr, Anchored<E>>,
}

impl<E> Default for AnchorRegistry<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E> AnchorRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the handle for `thread_id`.
    pub fn insert(&mut self, thread_id: impl Into<SmolStr>, element: E, pos: usize) {
        self.entries
            .insert(thread_id.into(), Anchored { element, pos });
    }

    pub fn get(&self, thread_id: &str) -> Option<&Anchored<E>> {
        self.entries.get(thread_id)
    }

    pub fn remove(&mut self, thread_id: &str) -> Option<Anchored<E>> {
        self.entries.remove(thread_id)
    }

    /// Drop entries for threads not in `comments` and refresh positions of
    /// the rest. Returns how many entries were dropped.
    pub fn prune(&mut self, comments: &[CommentWithPosition]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, anchored| {
            match comments.iter().find(|c| c.thread.id == *id) {
                Some(comment) => {
                    anchored.pos = comment.pos;
                    true
                }
                None => false,
            }
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::trace!(target: "weaver::comments", dropped, "pruned anchor registry");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Anchored<E>)> {
        self.entries.iter()
    }
}
