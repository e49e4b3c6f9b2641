//! Per-engine notification bus for "re-run layout" requests.
//!
//! Each [`CommentEngine`](crate::CommentEngine) owns one bus and emits on it
//! when a coalesced layout pass comes due. The layout owner listens. Nothing
//! is queued; an emit with no subscribers is dropped.

/// Events published on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadsEvent {
    /// Re-run the layout sweep. `Some` overrides the focal index for this
    /// pass; `Some(None)` lays out with nothing focused.
    PositionComments { focus: Option<Option<usize>> },
}

/// Handle returned by [`ThreadsBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ThreadsEvent)>;

#[derive(Default)]
pub struct ThreadsBus {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl std::fmt::Debug for ThreadsBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadsBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ThreadsBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ThreadsEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener, in subscription order.
    pub fn emit(&mut self, event: ThreadsEvent) {
        tracing::trace!(
            target: "weaver::comments",
            ?event,
            listeners = self.listeners.len(),
            "threads bus emit"
        );
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
