//! Host glue: owns the document and everything derived from it.
//!
//! The engine is the one place transactions are applied. Every dispatch
//! applies the steps, rescans, sweeps orphans if the scan found any,
//! recomputes plugin state and schedules a layout pass. The bus hears about
//! the pass once [`CommentEngine::poll_layout`] finds it due.
//! Notifications are delivered only after the transaction has landed.


use std::ops::Range;

use serde_json::Value;
use smol_str::SmolStr;
use web_time::Instant;

use crate::config::CommentsConfig;
use crate::document::{CommentDocument, Transaction};
use crate::error::{CommentError, DocumentError};
use crate::events::{ThreadsBus, ThreadsEvent};
use crate::layout::{
    LayoutInput, LayoutOutcome, Measured, ResolverSet, Viewport, compute_layout, measure,
};
use crate::mentions::contains_mention_node;
use crate::notify::{NoopNotifier, Notifier, deliver};
use crate::ops::{self, Mutation, Ops};
use crate::registry::AnchorRegistry;
use crate::scanner::{orphan_sweep, scan};
use crate::schedule::{LayoutRequest, LayoutScheduler, LayoutTrigger};
use crate::state::{ActiveThread, Draft, PluginState, StateMeta};
use crate::types::{Author, CommentWithPosition, Timestamp, now_ms};

/// The local user. An empty id means anonymous.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: SmolStr,
    pub display_name: SmolStr,
}

impl Session {
    pub fn new(user_id: impl Into<SmolStr>, display_name: impl Into<SmolStr>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    pub fn anonymous(display_name: impl Into<SmolStr>) -> Self {
        Self::new("", display_name)
    }

    /// The user id, or None when anonymous.
    pub fn user(&self) -> Option<&str> {
        Some(self.user_id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn author(&self) -> Author {
        Author::new(self.user_id.clone(), self.display_name.clone())
    }
}

/// A destructive operation awaiting confirmation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestructiveAction {
    DeleteComment {
        thread_id: SmolStr,
        comment_id: SmolStr,
    },
    DeleteThread {
        thread_id: SmolStr,
    },
}

/// Returned by the `request_delete_*` methods; pass it back to
/// [`CommentEngine::confirm`] or [`CommentEngine::cancel`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct ConfirmationRequest {
    pub action: DestructiveAction,
    /// Focus to put back if the user backs out.
    pub restore: Option<ActiveThread>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeepLinkKind {
    /// `id` is a thread id or a comment id.
    Comment,
    /// `id` is a mention node id, in a comment or in the document body.
    Mention,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeepLink {
    pub kind: DeepLinkKind,
    pub id: SmolStr,
}

/// Where a deep link landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeepLinkTarget {
    /// The thread was opened and focused.
    Thread { thread_id: SmolStr },
    /// A mention in the document body; the host scrolls there.
    Position(usize),
}

type Clock = Box<dyn Fn() -> Timestamp>;

pub struct CommentEngine<D, N = NoopNotifier> {
    doc: D,
    notifier: N,
    session: Session,
    config: CommentsConfig,
    state: PluginState,
    bus: ThreadsBus,
    scheduler: LayoutScheduler,
    clock: Clock,
}

impl<D: CommentDocument> CommentEngine<D> {
    /// Take ownership of `doc` and derive the initial state from it.
    pub fn new(doc: D, session: Session) -> Self {
        let config = CommentsConfig::default();
        let mut engine = Self {
            doc,
            notifier: NoopNotifier,
            session,
            scheduler: LayoutScheduler::new(config.schedule.delay()),
            config,
            state: PluginState::default(),
            bus: ThreadsBus::new(),
            clock: Box::new(now_ms),
        };
        engine.reinit();
        engine
    }
}

impl<D: CommentDocument, N: Notifier> CommentEngine<D, N> {
    pub fn with_notifier<M: Notifier>(self, notifier: M) -> CommentEngine<D, M> {
        CommentEngine {
            doc: self.doc,
            notifier,
            session: self.session,
            config: self.config,
            state: self.state,
            bus: self.bus,
            scheduler: self.scheduler,
            clock: self.clock,
        }
    }

    pub fn with_config(mut self, config: CommentsConfig) -> Self {
        self.scheduler = LayoutScheduler::new(config.schedule.delay());
        self.config = config;
        self.reinit();
        self
    }

    /// Replace the wall clock, for deterministic timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn reinit(&mut self) {
        let comments = self.rescan();
        self.state = PluginState::init(comments);
    }

    pub fn document(&self) -> &D {
        &self.doc
    }

    pub fn into_document(self) -> D {
        self.doc
    }

    pub fn state(&self) -> &PluginState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &CommentsConfig {
        &self.config
    }

    pub fn bus_mut(&mut self) -> &mut ThreadsBus {
        &mut self.bus
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    pub fn comments(&self) -> &[CommentWithPosition] {
        &self.state.comments
    }

    pub fn find(&self, thread_id: &str) -> Option<&CommentWithPosition> {
        self.state.find(thread_id)
    }

    fn ops(&self) -> Ops<'_, D> {
        Ops::new(&self.doc, &self.config.mark_name)
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Scan the document, stripping orphan marks first if there are any.
    fn rescan(&mut self) -> Vec<CommentWithPosition> {
        let mark_name = self.config.mark_name.clone();
        let result = scan(&self.doc, &mark_name);
        if result.orphans.is_empty() {
            return result.comments;
        }
        let Some(sweep) = orphan_sweep(&self.doc, &mark_name) else {
            return result.comments;
        };
        match self.doc.apply(&sweep) {
            Ok(()) => {
                tracing::warn!(
                    target: "weaver::comments",
                    removed = sweep.steps.len(),
                    "swept orphan comment marks"
                );
                scan(&self.doc, &mark_name).comments
            }
            Err(e) => {
                tracing::error!(
                    target: "weaver::comments",
                    error = %e,
                    "orphan sweep rejected by document"
                );
                result.comments
            }
        }
    }

    /// Apply `tr` and bring derived state up to date.
    pub fn dispatch(&mut self, tr: Transaction) -> Result<(), CommentError> {
        if tr.doc_changed() {
            self.doc.apply(&tr)?;
        }
        self.refresh(&tr, trigger_for(&tr));
        Ok(())
    }

    fn refresh(&mut self, tr: &Transaction, trigger: LayoutTrigger) {
        let comments = self.rescan();
        self.state = self.state.apply(tr, comments);
        self.scheduler.request(trigger, Instant::now());
        tracing::trace!(
            target: "weaver::comments",
            steps = tr.steps.len(),
            comments = self.state.comments.len(),
            "dispatched"
        );
    }

    fn run(&mut self, mutation: Mutation) -> Result<SmolStr, CommentError> {
        let Mutation {
            thread_id,
            transaction,
            notifications,
        } = mutation;
        self.dispatch(transaction)?;
        deliver(&mut self.notifier, &notifications);
        Ok(thread_id)
    }

    /// Apply an edit made outside the engine (a remote peer, an undo) and
    /// rescan.
    pub fn apply_remote<F>(&mut self, edit: F) -> Result<(), CommentError>
    where
        F: FnOnce(&mut D) -> Result<(), DocumentError>,
    {
        edit(&mut self.doc)?;
        self.refresh(&Transaction::new(), LayoutTrigger::DocumentChanged);
        Ok(())
    }

    pub fn create_thread(
        &mut self,
        range: Range<usize>,
        content: Value,
    ) -> Result<SmolStr, CommentError> {
        let author = self.session.author();
        let mutation = self.ops().create_thread(range, content, &author, self.now())?;
        self.run(mutation)
    }

    pub fn add_comment(&mut self, thread_id: &str, content: Value) -> Result<(), CommentError> {
        let author = self.session.author();
        let mutation = self
            .ops()
            .add_comment(thread_id, content, &author, self.now())?;
        self.run(mutation).map(drop)
    }

    pub fn edit_comment(
        &mut self,
        thread_id: &str,
        comment_id: &str,
        content: Value,
    ) -> Result<(), CommentError> {
        let mutation = self.ops().edit_comment(
            thread_id,
            comment_id,
            content,
            self.session.user(),
            self.now(),
        )?;
        self.run(mutation).map(drop)
    }

    pub fn delete_comment(&mut self, thread_id: &str, comment_id: &str) -> Result<(), CommentError> {
        let mutation = self
            .ops()
            .delete_comment(thread_id, comment_id, self.session.user())?;
        self.run(mutation).map(drop)
    }

    pub fn delete_thread(&mut self, thread_id: &str) -> Result<(), CommentError> {
        let mutation = self.ops().delete_thread(thread_id)?;
        self.run(mutation).map(drop)
    }

    /// Toggle the session user's reaction. Anonymous users cannot react.
    pub fn toggle_reaction(
        &mut self,
        thread_id: &str,
        comment_id: &str,
        reaction_id: &str,
    ) -> Result<(), CommentError> {
        let Some(user) = self.session.user() else {
            return Ok(());
        };
        let mutation = self
            .ops()
            .toggle_reaction(thread_id, comment_id, reaction_id, user)?;
        self.run(mutation).map(drop)
    }

    pub fn toggle_resolved(
        &mut self,
        thread_id: &str,
        force: Option<bool>,
    ) -> Result<(), CommentError> {
        let mutation =
            self.ops()
                .toggle_resolved(thread_id, force, self.session.user(), self.now())?;
        self.run(mutation).map(drop)
    }

    pub fn mark_unread(&mut self, thread_id: &str) -> Result<(), CommentError> {
        let Some(user) = self.session.user() else {
            return Ok(());
        };
        let mutation = self.ops().mark_unread(thread_id, user)?;
        self.run(mutation).map(drop)
    }

    /// Focus a thread and record that the session user has seen it.
    pub fn open_thread(&mut self, thread_id: &str) -> Result<(), CommentError> {
        let comment = self
            .find(thread_id)
            .ok_or_else(|| CommentError::ThreadNotFound(thread_id.into()))?;
        let meta = StateMeta::activate(ActiveThread::single(
            comment.pos,
            comment.end(),
            comment.thread.id.clone(),
        ));

        let tr = match self.session.user() {
            Some(user) => self
                .ops()
                .mark_read(thread_id, user, self.now())?
                .transaction
                .with_meta(meta),
            None => Transaction::meta_only(meta),
        };
        self.dispatch(tr)
    }

    /// Focus several threads at once (a cluster picked on a small screen).
    pub fn focus_threads(&mut self, thread_ids: &[SmolStr]) -> Result<(), CommentError> {
        let live: Vec<&CommentWithPosition> =
            thread_ids.iter().filter_map(|id| self.find(id)).collect();
        let (Some(from), Some(to)) = (
            live.iter().map(|c| c.pos).min(),
            live.iter().map(|c| c.end()).max(),
        ) else {
            return self.defocus();
        };
        let active = ActiveThread {
            from,
            to,
            ids: live.iter().map(|c| c.thread.id.clone()).collect(),
        };
        self.dispatch(Transaction::meta_only(StateMeta::activate(active)))
    }

    pub fn defocus(&mut self) -> Result<(), CommentError> {
        self.dispatch(Transaction::meta_only(StateMeta::defocus()))
    }

    /// Open or close the compose-new-thread popup.
    pub fn set_composer_open(&mut self, open: bool) -> Result<(), CommentError> {
        self.dispatch(Transaction::meta_only(StateMeta {
            open: Some(open),
            ..Default::default()
        }))
    }

    pub fn toggle_show_resolved(&mut self) -> Result<(), CommentError> {
        self.dispatch(Transaction::meta_only(StateMeta {
            show_resolved: Some(!self.state.show_resolved),
            ..Default::default()
        }))
    }

    pub fn update_draft(&mut self, draft: Draft) -> Result<(), CommentError> {
        self.dispatch(ops::update_draft(draft))
    }

    pub fn clear_draft(&mut self) -> Result<(), CommentError> {
        self.dispatch(ops::clear_draft())
    }

    /// Validate a comment deletion and ask for confirmation. Focus is
    /// released while the dialog is up.
    pub fn request_delete_comment(
        &mut self,
        thread_id: &str,
        comment_id: &str,
    ) -> Result<ConfirmationRequest, CommentError> {
        let comment = self
            .find(thread_id)
            .ok_or_else(|| CommentError::ThreadNotFound(thread_id.into()))?;
        ops::check_deletable(&comment.thread, thread_id, comment_id, self.session.user())?;
        self.request(DestructiveAction::DeleteComment {
            thread_id: thread_id.into(),
            comment_id: comment_id.into(),
        })
    }

    pub fn request_delete_thread(
        &mut self,
        thread_id: &str,
    ) -> Result<ConfirmationRequest, CommentError> {
        if self.find(thread_id).is_none() {
            return Err(CommentError::ThreadNotFound(thread_id.into()));
        }
        self.request(DestructiveAction::DeleteThread {
            thread_id: thread_id.into(),
        })
    }

    fn request(&mut self, action: DestructiveAction) -> Result<ConfirmationRequest, CommentError> {
        let request = ConfirmationRequest {
            action,
            restore: self.state.active_thread.clone(),
        };
        self.defocus()?;
        Ok(request)
    }

    /// Carry out a confirmed deletion. A surviving thread gets its focus back.
    pub fn confirm(&mut self, request: ConfirmationRequest) -> Result<(), CommentError> {
        match &request.action {
            DestructiveAction::DeleteComment {
                thread_id,
                comment_id,
            } => {
                self.delete_comment(thread_id, comment_id)?;
                self.restore_focus(request.restore)
            }
            DestructiveAction::DeleteThread { thread_id } => self.delete_thread(thread_id),
        }
    }

    /// Back out of a deletion, restoring the focus it took away.
    pub fn cancel(&mut self, request: ConfirmationRequest) -> Result<(), CommentError> {
        self.restore_focus(request.restore)
    }

    fn restore_focus(&mut self, restore: Option<ActiveThread>) -> Result<(), CommentError> {
        self.dispatch(Transaction::meta_only(StateMeta {
            active_thread: Some(restore),
            ..Default::default()
        }))
    }

    /// Resolve a deep link and focus what it points at.
    pub fn open_deep_link(
        &mut self,
        link: &DeepLink,
    ) -> Result<Option<DeepLinkTarget>, CommentError> {
        let id = link.id.as_str();
        let thread_id = match link.kind {
            DeepLinkKind::Comment => self
                .state
                .comments
                .iter()
                .find(|c| c.thread.id == id || c.thread.comment(id).is_some())
                .map(|c| c.thread.id.clone()),
            DeepLinkKind::Mention => self
                .state
                .comments
                .iter()
                .find(|c| {
                    c.thread
                        .comments
                        .iter()
                        .any(|comment| contains_mention_node(&comment.content, id))
                })
                .map(|c| c.thread.id.clone()),
        };

        if let Some(thread_id) = thread_id {
            self.open_thread(&thread_id)?;
            return Ok(Some(DeepLinkTarget::Thread { thread_id }));
        }

        let body_mention = match link.kind {
            DeepLinkKind::Mention => self.doc.node_position(id),
            DeepLinkKind::Comment => None,
        };
        if let Some(pos) = body_mention {
            return Ok(Some(DeepLinkTarget::Position(pos)));
        }

        tracing::debug!(target: "weaver::comments", ?link, "deep link target not found");
        Ok(None)
    }

    /// Threads that get a bubble: unresolved and not folded away.
    pub fn visible_comments(&self) -> Vec<CommentWithPosition> {
        self.state
            .visible_comments()
            .into_iter()
            .filter(|c| !self.doc.is_hidden(c.pos))
            .collect()
    }

    /// Index of the focused thread within [`Self::visible_comments`].
    pub fn focused_index(&self) -> Option<usize> {
        self.state.focused_index(&self.visible_comments())
    }

    /// Measure the visible threads. `height_of` returns a bubble's rendered
    /// height, or None if it has not rendered yet.
    pub fn measure<H>(&self, resolvers: &ResolverSet, height_of: H) -> Measured
    where
        H: Fn(&str) -> Option<f64>,
    {
        measure(&self.doc, &self.visible_comments(), resolvers, height_of)
    }

    pub fn layout(&self, measured: &Measured, viewport: Viewport) -> LayoutOutcome {
        self.layout_with_focus(measured, viewport, None)
    }

    /// Layout with an optional focus override from a [`LayoutRequest`].
    pub fn layout_with_focus(
        &self,
        measured: &Measured,
        viewport: Viewport,
        focus_override: Option<Option<usize>>,
    ) -> LayoutOutcome {
        let visible = self.visible_comments();
        let focused = focus_override.unwrap_or_else(|| self.state.focused_index(&visible));
        compute_layout(
            &LayoutInput {
                visible: &visible,
                measurements: &measured.measurements,
                unresolved: &measured.unresolved,
                focused,
                viewport,
                doc_size: self.doc.size(),
                user_id: &self.session.user_id,
            },
            &self.config.layout,
        )
    }

    /// Drop registered bubble handles whose thread is gone.
    pub fn prune_anchors<E>(&self, registry: &mut AnchorRegistry<E>) -> usize {
        registry.prune(&self.state.comments)
    }

    /// Record a host-side layout trigger (resize, scroll, fold).
    pub fn request_layout(&mut self, trigger: LayoutTrigger) {
        self.scheduler.request(trigger, Instant::now());
    }

    /// Take the coalesced layout pass if it is due and announce it on the
    /// bus. Hosts call this from their frame or timer loop after rendering.
    pub fn poll_layout(&mut self, now: Instant) -> Option<LayoutRequest> {
        let request = self.scheduler.poll(now)?;
        self.bus.emit(ThreadsEvent::PositionComments {
            focus: request.focus_override,
        });
        Some(request)
    }
}

fn trigger_for(tr: &Transaction) -> LayoutTrigger {
    match &tr.meta {
        Some(meta) if !tr.doc_changed() && meta.draft.is_some() => LayoutTrigger::DraftChanged,
        _ => LayoutTrigger::DocumentChanged,
    }
}
