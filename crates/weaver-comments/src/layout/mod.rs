//! Floating comment bubble layout.
//!
//! Stateless: every pass takes the visible threads, their measured heights
//! and anchor offsets, and the focused index, and places every bubble from
//! scratch. Nothing carries over between passes.
//!
//! The pass runs in three stages:
//! 1. entries are built from measurements, skipping anchors past the end of
//!    the document and anchors the host could not resolve this pass;
//! 2. on small screens, entries anchored on the same line merge into
//!    clusters ([`aggregate`]);
//! 3. the two-pass sweep assigns tops so nothing overlaps ([`sweep`]).

mod aggregate;
mod resolver;
mod sweep;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::policy;
use crate::types::CommentWithPosition;

pub use aggregate::aggregate;
pub use resolver::{
    AnchorResolver, Coords, EmbeddedRegionResolver, HostDocumentResolver, ResolverSet, measure,
};
pub use sweep::{Placement, SweepItem, sweep};

/// Measured geometry of one thread's bubble and anchor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Rendered bubble height.
    pub height: f64,
    /// Viewport-relative top of the anchor text.
    pub anchor_top: f64,
}

/// Thread id to measurement, for every visible thread.
pub type Measurements = HashMap<SmolStr, Measurement>;

/// Output of [`measure`]: geometry for the threads that resolved, plus the
/// ids whose anchor is not rendered right now (folded, virtualised).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Measured {
    pub measurements: Measurements,
    pub unresolved: HashSet<SmolStr>,
}

impl From<Measurements> for Measured {
    fn from(measurements: Measurements) -> Self {
        Self {
            measurements,
            unresolved: HashSet::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Viewport {
    /// Top of the editor in scrolled-content coordinates.
    pub editor_top: f64,
    pub scroll_offset: f64,
    pub height: f64,
    pub width: f64,
}

/// Layout constants, in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub top_offset: f64,
    /// Minimum vertical gap between bubbles.
    pub spacing: f64,
    /// Space kept free under the focused bubble (the reply composer).
    pub reserved_footer: f64,
    pub base_inset: f64,
    pub focused_inset: f64,
    /// Viewports narrower than this aggregate same-line threads.
    pub small_screen_width: f64,
    pub aggregation_tolerance: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            top_offset: 8.0,
            spacing: 10.0,
            reserved_footer: 64.0,
            base_inset: 16.0,
            focused_inset: 24.0,
            small_screen_width: 1024.0,
            aggregation_tolerance: 1.0,
        }
    }
}

impl LayoutConfig {
    pub fn is_small_screen(&self, viewport: &Viewport) -> bool {
        viewport.width < self.small_screen_width
    }
}

/// One laid-out bubble: a single thread, or a cluster on small screens.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubblePosition {
    /// Member threads in document order. Never empty.
    pub thread_ids: Vec<SmolStr>,
    pub top: f64,
    pub height: f64,
    /// Horizontal inset from the bubble column edge.
    pub inset: f64,
    pub focused: bool,
    /// Unread comments across all members.
    pub unread_count: usize,
    pub any_unread: bool,
}

/// What clicking a bubble does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterAction {
    Open(SmolStr),
    /// Several threads share the bubble; ask which one.
    Disambiguate(Vec<SmolStr>),
}

impl BubblePosition {
    pub fn is_cluster(&self) -> bool {
        self.thread_ids.len() > 1
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn click_action(&self) -> ClusterAction {
        match self.thread_ids.as_slice() {
            [single] => ClusterAction::Open(single.clone()),
            ids => ClusterAction::Disambiguate(ids.to_vec()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayoutOutcome {
    Placed(Vec<BubblePosition>),
    /// Measurements do not match the visible threads (the list changed
    /// between measuring and laying out); skip this pass and wait for the
    /// next trigger.
    Stale,
}

impl LayoutOutcome {
    pub fn placed(&self) -> Option<&[BubblePosition]> {
        match self {
            LayoutOutcome::Placed(bubbles) => Some(bubbles),
            LayoutOutcome::Stale => None,
        }
    }
}

/// Everything one layout pass reads.
#[derive(Clone, Copy, Debug)]
pub struct LayoutInput<'a> {
    /// Unresolved, unhidden threads in document order.
    pub visible: &'a [CommentWithPosition],
    pub measurements: &'a Measurements,
    /// Threads to leave out of this pass because their anchor did not
    /// resolve.
    pub unresolved: &'a HashSet<SmolStr>,
    /// Index into `visible`.
    pub focused: Option<usize>,
    pub viewport: Viewport,
    pub doc_size: usize,
    /// Whose unread counts the badges show.
    pub user_id: &'a str,
}

/// A bubble before placement.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub thread_ids: Vec<SmolStr>,
    pub anchor_top: f64,
    pub height: f64,
    pub unread_count: usize,
    pub any_unread: bool,
}

impl Entry {
    fn sweep_item(&self) -> SweepItem {
        SweepItem {
            anchor_top: self.anchor_top,
            height: self.height,
        }
    }
}

/// Run one layout pass.
pub fn compute_layout(input: &LayoutInput<'_>, config: &LayoutConfig) -> LayoutOutcome {
    let LayoutInput {
        visible,
        measurements,
        unresolved,
        focused,
        viewport,
        doc_size,
        user_id,
    } = *input;

    let expected = visible
        .iter()
        .filter(|c| !unresolved.contains(c.id()))
        .count();
    if measurements.len() != expected {
        tracing::debug!(
            target: "weaver::comments::layout",
            measured = measurements.len(),
            expected,
            "measurement count mismatch, skipping pass"
        );
        return LayoutOutcome::Stale;
    }

    let mut entries = Vec::with_capacity(visible.len());
    let mut focus = None;
    for (index, comment) in visible.iter().enumerate() {
        if unresolved.contains(comment.id()) {
            tracing::trace!(
                target: "weaver::comments::layout",
                thread_id = comment.id(),
                "anchor not rendered, leaving bubble out"
            );
            continue;
        }
        let Some(measurement) = measurements.get(comment.id()) else {
            tracing::debug!(
                target: "weaver::comments::layout",
                thread_id = comment.id(),
                "thread has no measurement, skipping pass"
            );
            return LayoutOutcome::Stale;
        };
        if comment.pos > doc_size {
            tracing::trace!(
                target: "weaver::comments::layout",
                thread_id = comment.id(),
                pos = comment.pos,
                doc_size,
                "anchor past end of document"
            );
            continue;
        }
        if focused == Some(index) {
            focus = Some(entries.len());
        }
        entries.push(Entry {
            thread_ids: vec![comment.thread.id.clone()],
            anchor_top: measurement.anchor_top,
            height: measurement.height,
            unread_count: policy::unread_count(&comment.thread, user_id),
            any_unread: policy::is_unread(&comment.thread, user_id),
        });
    }

    if config.is_small_screen(&viewport) {
        (entries, focus) = aggregate(entries, focus, config.aggregation_tolerance);
    }

    let items: Vec<SweepItem> = entries.iter().map(Entry::sweep_item).collect();
    let placements = sweep(&items, focus, &viewport, config);

    let bubbles: Vec<BubblePosition> = entries
        .into_iter()
        .zip(placements)
        .enumerate()
        .map(|(index, (entry, placement))| BubblePosition {
            thread_ids: entry.thread_ids,
            top: placement.top,
            height: entry.height,
            inset: placement.inset,
            focused: focus == Some(index),
            unread_count: entry.unread_count,
            any_unread: entry.any_unread,
        })
        .collect();

    tracing::trace!(
        target: "weaver::comments::layout",
        bubbles = bubbles.len(),
        ?focus,
        "layout pass complete"
    );
    LayoutOutcome::Placed(bubbles)
}
