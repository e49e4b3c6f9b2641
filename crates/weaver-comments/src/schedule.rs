//! Coalesces layout triggers behind a short delay.
//!
//! Layout reads measured geometry, which is only valid once the host has
//! re-rendered. Triggers arriving in a burst (typing, scrolling) collapse into
//! a single run; the host polls the scheduler from its frame or timer loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

/// Why a layout pass was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutTrigger {
    DocumentChanged,
    Resize,
    Scroll,
    /// A section of the document was folded or unfolded.
    Fold,
    DraftChanged,
    /// Forced re-aggregation, optionally moving focus.
    Reaggregate { focus: Option<usize> },
}

/// A coalesced, due layout pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutRequest {
    /// `Some` if any coalesced trigger overrode focus; the latest one wins.
    pub focus_override: Option<Option<usize>>,
    /// Number of triggers folded into this pass.
    pub triggers: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Delay between the first trigger of a burst and the layout pass.
    pub delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { delay_ms: 20 }
    }
}

impl ScheduleConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Clone, Debug)]
struct Pending {
    due: Instant,
    focus_override: Option<Option<usize>>,
    triggers: usize,
}

#[derive(Clone, Debug)]
pub struct LayoutScheduler {
    delay: Duration,
    pending: Option<Pending>,
}

impl LayoutScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a trigger. Only the first trigger of a burst sets the deadline.
    pub fn request(&mut self, trigger: LayoutTrigger, now: Instant) {
        let delay = self.delay;
        let pending = self.pending.get_or_insert_with(|| Pending {
            due: now + delay,
            focus_override: None,
            triggers: 0,
        });
        pending.triggers += 1;
        if let LayoutTrigger::Reaggregate { focus } = trigger {
            pending.focus_override = Some(focus);
        }
        tracing::trace!(
            target: "weaver::comments::layout",
            ?trigger,
            coalesced = pending.triggers,
            "layout requested"
        );
    }

    /// Take the pending request if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<LayoutRequest> {
        if self.pending.as_ref().is_none_or(|p| now < p.due) {
            return None;
        }
        self.pending.take().map(|p| LayoutRequest {
            focus_override: p.focus_override,
            triggers: p.triggers,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Drop any pending request without running it.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

impl Default for LayoutScheduler {
    fn default() -> Self {
        Self::new(ScheduleConfig::default().delay())
    }
}
