//! Transaction-producing thread and comment operations.
//!
//! Every operation reads the thread from its canonical mark, computes new
//! attrs, and returns one transaction that removes and re-adds the mark on
//! every physical instance of that thread id. Validation happens first; a
//! rejected operation never produces a transaction.

use std::ops::Range;

use serde_json::Value;
use smol_str::SmolStr;

use crate::document::{CommentDocument, Mark, Transaction};
use crate::error::{CommentError, DocumentError};
use crate::mentions::{Mention, collect_mentions, new_mentions};
use crate::notify::Notification;
use crate::policy;
use crate::scanner::thread_ranges;
use crate::state::{ActiveThread, Draft, StateMeta};
use crate::types::{Author, Comment, Thread, Timestamp};

/// A validated mutation ready to dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    /// Thread the mutation targets (the new id, for creation).
    pub thread_id: SmolStr,
    pub transaction: Transaction,
    /// Delivered after the transaction is applied.
    pub notifications: Vec<Notification>,
}

impl Mutation {
    fn new(thread_id: impl Into<SmolStr>, transaction: Transaction) -> Self {
        Self {
            thread_id: thread_id.into(),
            transaction,
            notifications: Vec::new(),
        }
    }

    fn notify(mut self, notifications: impl IntoIterator<Item = Notification>) -> Self {
        self.notifications.extend(notifications);
        self
    }
}

fn mention_notifications(mentions: Vec<Mention>) -> impl Iterator<Item = Notification> {
    mentions.into_iter().map(|m| Notification::Mentioned {
        user_id: m.user_id,
        node_id: m.node_id,
        from_comment: true,
    })
}

/// Operations against one document and comment mark type.
pub struct Ops<'a, D> {
    doc: &'a D,
    mark_name: &'a str,
}

impl<'a, D: CommentDocument> Ops<'a, D> {
    pub fn new(doc: &'a D, mark_name: &'a str) -> Self {
        Self { doc, mark_name }
    }

    /// Read the canonical thread, apply `edit`, and rewrite every instance.
    fn rewrite<F>(&self, thread_id: &str, edit: F) -> Result<(Transaction, Thread), CommentError>
    where
        F: FnOnce(&mut Thread) -> Result<(), CommentError>,
    {
        let instances = thread_ranges(self.doc, self.mark_name, thread_id);
        let first = instances
            .first()
            .ok_or_else(|| CommentError::ThreadNotFound(thread_id.into()))?;

        let mut thread = Thread::from_attrs(&first.mark.attrs)?;
        edit(&mut thread)?;
        let mark = Mark::comment(self.mark_name, &thread)?;

        let mut tr = Transaction::new();
        for instance in &instances {
            tr.remove_mark(instance.pos, instance.end(), instance.mark.clone());
            tr.add_mark(instance.pos, instance.end(), mark.clone());
        }

        tracing::trace!(
            target: "weaver::comments",
            thread_id,
            instances = instances.len(),
            "rewrote thread attrs"
        );
        Ok((tr, thread))
    }

    /// Start a thread on `range` with its first comment, and focus it.
    pub fn create_thread(
        &self,
        range: Range<usize>,
        content: Value,
        author: &Author,
        now: Timestamp,
    ) -> Result<Mutation, CommentError> {
        if range.start >= range.end {
            return Err(CommentError::EmptySelection);
        }
        let size = self.doc.size();
        if range.end > size {
            return Err(DocumentError::OutOfRange {
                from: range.start,
                to: range.end,
                size,
            }
            .into());
        }

        let mentions = collect_mentions(&content);
        let mut thread = Thread::new(Comment::new(author, content, now));
        thread.touch(author.id_str(), now);

        let mut tr = Transaction::new();
        tr.add_mark(
            range.start,
            range.end,
            Mark::comment(self.mark_name, &thread)?,
        );
        let active = ActiveThread::single(range.start, range.end, thread.id.clone());
        let tr = tr.with_meta(StateMeta::activate(active).with_clear_draft());

        tracing::debug!(
            target: "weaver::comments",
            thread_id = %thread.id,
            from = range.start,
            to = range.end,
            "created thread"
        );

        Ok(Mutation::new(thread.id.clone(), tr)
            .notify([Notification::ThreadCreated {
                thread_id: thread.id.clone(),
            }])
            .notify(mention_notifications(mentions)))
    }

    /// Append a reply. Resolved threads reject replies.
    pub fn add_comment(
        &self,
        thread_id: &str,
        content: Value,
        author: &Author,
        now: Timestamp,
    ) -> Result<Mutation, CommentError> {
        let mentions = collect_mentions(&content);
        let (tr, thread) = self.rewrite(thread_id, |thread| {
            if policy::is_resolved(thread) {
                return Err(CommentError::ThreadResolved(thread_id.into()));
            }
            thread.comments.push(Comment::new(author, content, now));
            thread.touch(author.id_str(), now);
            Ok(())
        })?;

        let participants: Vec<SmolStr> = policy::participants(&thread)
            .into_iter()
            .filter(|p| Some(p.as_str()) != author.id_str())
            .collect();

        Ok(
            Mutation::new(thread_id, tr.with_meta(StateMeta::clear_draft()))
                .notify([Notification::CommentAdded {
                    participants,
                    thread_id: thread_id.into(),
                }])
                .notify(mention_notifications(mentions)),
        )
    }

    /// Replace a comment's content. Only its author may edit it.
    pub fn edit_comment(
        &self,
        thread_id: &str,
        comment_id: &str,
        content: Value,
        requester: Option<&str>,
        now: Timestamp,
    ) -> Result<Mutation, CommentError> {
        let mut mentions = Vec::new();
        let (tr, _) = self.rewrite(thread_id, |thread| {
            if !policy::can_modify_comment(thread, comment_id, requester) {
                return Err(match thread.comment(comment_id) {
                    None => comment_not_found(thread_id, comment_id),
                    Some(_) => CommentError::NotAuthor(comment_id.into()),
                });
            }
            thread.touch(requester, now);
            let comment = thread
                .comment_mut(comment_id)
                .ok_or_else(|| comment_not_found(thread_id, comment_id))?;
            mentions = new_mentions(&comment.content, &content);
            comment.content = content;
            comment.edited = true;
            Ok(())
        })?;

        Ok(
            Mutation::new(thread_id, tr.with_meta(StateMeta::clear_draft()))
                .notify(mention_notifications(mentions)),
        )
    }

    /// Delete one comment. The last comment of a thread cannot be deleted
    /// this way, whoever asks.
    pub fn delete_comment(
        &self,
        thread_id: &str,
        comment_id: &str,
        requester: Option<&str>,
    ) -> Result<Mutation, CommentError> {
        let (tr, _) = self.rewrite(thread_id, |thread| {
            check_deletable(thread, thread_id, comment_id, requester)?;
            thread.comments.retain(|c| c.id != comment_id);
            Ok(())
        })?;
        Ok(Mutation::new(thread_id, tr))
    }

    /// Strip the thread's mark from every node carrying it.
    pub fn delete_thread(&self, thread_id: &str) -> Result<Mutation, CommentError> {
        let instances = thread_ranges(self.doc, self.mark_name, thread_id);
        if instances.is_empty() {
            return Err(CommentError::ThreadNotFound(thread_id.into()));
        }
        let mut tr = Transaction::new();
        for instance in instances {
            tr.remove_mark(instance.pos, instance.end(), instance.mark);
        }
        tracing::debug!(target: "weaver::comments", thread_id, "deleted thread");
        Ok(Mutation::new(thread_id, tr))
    }

    /// Add `user_id` to the reaction, or remove them if already present.
    pub fn toggle_reaction(
        &self,
        thread_id: &str,
        comment_id: &str,
        reaction_id: &str,
        user_id: &str,
    ) -> Result<Mutation, CommentError> {
        let (tr, _) = self.rewrite(thread_id, |thread| {
            let comment = thread
                .comment_mut(comment_id)
                .ok_or_else(|| comment_not_found(thread_id, comment_id))?;
            let users = comment.reactions.entry(reaction_id.into()).or_default();
            if !users.remove(user_id) {
                users.insert(user_id.into());
            }
            if users.is_empty() {
                comment.reactions.remove(reaction_id);
            }
            Ok(())
        })?;
        Ok(Mutation::new(thread_id, tr))
    }

    /// Set `resolved` to `force`, or flip it. Always drops focus.
    pub fn toggle_resolved(
        &self,
        thread_id: &str,
        force: Option<bool>,
        current_user: Option<&str>,
        now: Timestamp,
    ) -> Result<Mutation, CommentError> {
        let (tr, thread) = self.rewrite(thread_id, |thread| {
            thread.resolved = force.unwrap_or(!thread.resolved);
            thread.touch(current_user, now);
            Ok(())
        })?;
        tracing::debug!(
            target: "weaver::comments",
            thread_id,
            resolved = thread.resolved,
            "toggled resolution"
        );
        Ok(Mutation::new(
            thread_id,
            tr.with_meta(StateMeta::defocus()),
        ))
    }

    /// Forget that `user_id` opened the thread. Absence of the entry is what
    /// encodes unread.
    pub fn mark_unread(&self, thread_id: &str, user_id: &str) -> Result<Mutation, CommentError> {
        let (tr, _) = self.rewrite(thread_id, |thread| {
            thread.last_opened.remove(user_id);
            Ok(())
        })?;
        Ok(Mutation::new(
            thread_id,
            tr.with_meta(StateMeta::defocus()),
        ))
    }

    /// Record that `user_id` viewed the thread now.
    pub fn mark_read(
        &self,
        thread_id: &str,
        user_id: &str,
        now: Timestamp,
    ) -> Result<Mutation, CommentError> {
        let (tr, _) = self.rewrite(thread_id, |thread| {
            thread.touch(Some(user_id), now);
            Ok(())
        })?;
        Ok(Mutation::new(thread_id, tr))
    }
}

fn comment_not_found(thread_id: &str, comment_id: &str) -> CommentError {
    CommentError::CommentNotFound {
        thread_id: thread_id.into(),
        comment_id: comment_id.into(),
    }
}

/// Deletion rules shared by the operation and the confirmation gate.
pub fn check_deletable(
    thread: &Thread,
    thread_id: &str,
    comment_id: &str,
    requester: Option<&str>,
) -> Result<(), CommentError> {
    if thread.comment(comment_id).is_none() {
        return Err(comment_not_found(thread_id, comment_id));
    }
    if policy::is_sole_comment(thread) {
        return Err(CommentError::SoleComment(comment_id.into()));
    }
    if !policy::can_modify_comment(thread, comment_id, requester) {
        return Err(CommentError::NotAuthor(comment_id.into()));
    }
    Ok(())
}

/// Meta-only transaction storing a draft.
pub fn update_draft(draft: Draft) -> Transaction {
    Transaction::meta_only(StateMeta {
        draft: Some(Some(draft)),
        ..Default::default()
    })
}

/// Meta-only transaction discarding the draft.
pub fn clear_draft() -> Transaction {
    Transaction::meta_only(StateMeta::clear_draft())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::COMMENT_MARK;
    use crate::inline::{InlineDocument, InlineNode};
    use crate::policy::is_unread;
    use crate::scanner::scan;
    use serde_json::json;
    use std::collections::HashSet;

    fn ops(doc: &InlineDocument) -> Ops<'_, InlineDocument> {
        Ops::new(doc, COMMENT_MARK)
    }

    fn u1() -> Author {
        Author::new("u1", "Ada")
    }

    fn u2() -> Author {
        Author::new("u2", "Grace")
    }

    fn text(s: &str) -> Value {
        json!({"type": "doc", "content": [{"type": "text", "text": s}]})
    }

    fn apply(doc: &mut InlineDocument, mutation: &Mutation) {
        doc.apply(&mutation.transaction).unwrap();
    }

    fn run<F>(doc: &mut InlineDocument, f: F) -> Mutation
    where
        F: FnOnce(&Ops<'_, InlineDocument>) -> Result<Mutation, CommentError>,
    {
        let mutation = f(&ops(doc)).unwrap();
        apply(doc, &mutation);
        mutation
    }

    fn thread(doc: &InlineDocument, id: &str) -> Thread {
        scan(doc, COMMENT_MARK).find(id).unwrap().thread.clone()
    }

    /// Document with one thread by u1 at 10..20.
    fn seeded() -> (InlineDocument, SmolStr) {
        let mut doc = InlineDocument::from_text("0123456789abcdefghij0123456789");
        let m = ops(&doc).create_thread(10..20, text("hi"), &u1(), 1_000).unwrap();
        apply(&mut doc, &m);
        (doc, m.thread_id)
    }

    #[test]
    fn test_create_thread_scenario() {
        let (doc, id) = seeded();
        let result = scan(&doc, COMMENT_MARK);
        assert_eq!(result.comments.len(), 1);
        let c = &result.comments[0];
        assert_eq!((c.pos, c.end()), (10, 20));
        assert_eq!(c.thread.id, id);
        assert_eq!(c.thread.comments.len(), 1);
        assert!(!c.thread.resolved);
        assert!(is_unread(&c.thread, "u2"));
        assert!(!is_unread(&c.thread, "u1"));
    }

    #[test]
    fn test_create_thread_meta_and_notifications() {
        let doc = InlineDocument::from_text("some text here");
        let m = ops(&doc)
            .create_thread(
                0..4,
                json!({"type": "doc", "content": [
                    {"type": "mention", "attrs": {"id": "m1", "userId": "u9"}}
                ]}),
                &Author::anonymous("Guest"),
                5,
            )
            .unwrap();
        let meta = m.transaction.meta.clone().unwrap();
        assert_eq!(
            meta.active_thread,
            Some(Some(ActiveThread::single(0, 4, m.thread_id.clone())))
        );
        assert_eq!(meta.open, Some(false));
        assert_eq!(
            m.notifications,
            vec![
                Notification::ThreadCreated {
                    thread_id: m.thread_id.clone()
                },
                Notification::Mentioned {
                    user_id: "u9".into(),
                    node_id: "m1".into(),
                    from_comment: true
                },
            ]
        );

        let mut doc = doc;
        apply(&mut doc, &m);
        // Anonymous creators have no lastOpened entry.
        assert!(thread(&doc, &m.thread_id).last_opened.is_empty());
    }

    #[test]
    fn test_create_rejects_empty_and_out_of_range() {
        let doc = InlineDocument::from_text("abc");
        assert!(matches!(
            ops(&doc).create_thread(2..2, text("x"), &u1(), 0),
            Err(CommentError::EmptySelection)
        ));
        assert!(matches!(
            ops(&doc).create_thread(1..9, text("x"), &u1(), 0),
            Err(CommentError::Document(DocumentError::OutOfRange { size: 3, .. }))
        ));
    }

    #[test]
    fn test_add_comment_notifies_other_participants() {
        let (mut doc, id) = seeded();
        let m = ops(&doc).add_comment(&id, text("reply"), &u2(), 2_000).unwrap();
        assert_eq!(
            m.notifications,
            vec![Notification::CommentAdded {
                participants: vec!["u1".into()],
                thread_id: id.clone()
            }]
        );
        apply(&mut doc, &m);

        let t = thread(&doc, &id);
        assert_eq!(t.comments.len(), 2);
        assert_eq!(t.comments[1].author_id.as_deref(), Some("u2"));
        assert_eq!(t.last_opened.get("u2"), Some(&2_000));
        assert!(is_unread(&t, "u1"));
        assert!(!is_unread(&t, "u2"));
    }

    #[test]
    fn test_resolved_thread_rejects_replies() {
        let (mut doc, id) = seeded();
        let m = ops(&doc).toggle_resolved(&id, None, Some("u1"), 1_500).unwrap();
        assert_eq!(m.transaction.meta, Some(StateMeta::defocus()));
        apply(&mut doc, &m);
        assert!(thread(&doc, &id).resolved);

        let before = doc.clone();
        let err = ops(&doc).add_comment(&id, text("late"), &u2(), 2_000).unwrap_err();
        assert!(matches!(err, CommentError::ThreadResolved(ref t) if *t == id));
        assert_eq!(doc, before);
        assert_eq!(thread(&doc, &id).comments.len(), 1);

        // Forcing keeps it resolved; flipping reopens.
        run(&mut doc, |o| o.toggle_resolved(&id, Some(true), None, 0));
        assert!(thread(&doc, &id).resolved);
        run(&mut doc, |o| o.toggle_resolved(&id, None, None, 0));
        assert!(!thread(&doc, &id).resolved);
    }

    #[test]
    fn test_edit_comment_author_only() {
        let (mut doc, id) = seeded();
        let cid = thread(&doc, &id).comments[0].id.clone();

        let err = ops(&doc)
            .edit_comment(&id, &cid, text("hijack"), Some("u2"), 3)
            .unwrap_err();
        assert!(matches!(err, CommentError::NotAuthor(_)));
        let err = ops(&doc)
            .edit_comment(&id, &cid, text("anon"), None, 3)
            .unwrap_err();
        assert!(matches!(err, CommentError::NotAuthor(_)));
        let err = ops(&doc)
            .edit_comment(&id, "nope", text("x"), Some("u1"), 3)
            .unwrap_err();
        assert!(matches!(err, CommentError::CommentNotFound { .. }));

        let m = ops(&doc)
            .edit_comment(&id, &cid, text("hello"), Some("u1"), 3_000)
            .unwrap();
        apply(&mut doc, &m);
        let t = thread(&doc, &id);
        assert!(t.comments[0].edited);
        assert_eq!(t.comments[0].content, text("hello"));
        assert_eq!(t.last_opened.get("u1"), Some(&3_000));
    }

    #[test]
    fn test_anonymous_comments_editable_by_anonymous() {
        let mut doc = InlineDocument::from_text("anonymous notes");
        let m = ops(&doc)
            .create_thread(0..9, text("a"), &Author::anonymous("Guest"), 1)
            .unwrap();
        apply(&mut doc, &m);
        let id = m.thread_id;
        run(&mut doc, |o| {
            o.add_comment(&id, text("b"), &Author::anonymous("Guest"), 2)
        });
        let cid = thread(&doc, &id).comments[1].id.clone();

        assert!(ops(&doc).edit_comment(&id, &cid, text("c"), None, 3).is_ok());
        assert!(matches!(
            ops(&doc).delete_comment(&id, &cid, Some("u1")),
            Err(CommentError::NotAuthor(_))
        ));
        let m = ops(&doc).delete_comment(&id, &cid, None).unwrap();
        apply(&mut doc, &m);
        assert_eq!(thread(&doc, &id).comments.len(), 1);
    }

    #[test]
    fn test_sole_comment_guard_ignores_identity() {
        let (doc, id) = seeded();
        let cid = thread(&doc, &id).comments[0].id.clone();
        for requester in [Some("u1"), Some("u2"), None] {
            assert!(matches!(
                ops(&doc).delete_comment(&id, &cid, requester),
                Err(CommentError::SoleComment(_))
            ));
        }
    }

    #[test]
    fn test_delete_comment_and_thread() {
        let (mut doc, id) = seeded();
        run(&mut doc, |o| o.add_comment(&id, text("r"), &u2(), 2));
        let reply = thread(&doc, &id).comments[1].id.clone();

        run(&mut doc, |o| o.delete_comment(&id, &reply, Some("u2")));
        assert_eq!(thread(&doc, &id).comments.len(), 1);

        run(&mut doc, |o| o.delete_thread(&id));
        assert!(scan(&doc, COMMENT_MARK).comments.is_empty());
        assert_eq!(doc.nodes.len(), 1);

        assert!(matches!(
            ops(&doc).delete_thread(&id),
            Err(CommentError::ThreadNotFound(_))
        ));
    }

    #[test]
    fn test_toggle_reaction_symmetric() {
        let (mut doc, id) = seeded();
        let cid = thread(&doc, &id).comments[0].id.clone();

        run(&mut doc, |o| o.toggle_reaction(&id, &cid, "+1", "u2"));
        run(&mut doc, |o| o.toggle_reaction(&id, &cid, "+1", "u1"));
        let reactions = thread(&doc, &id).comments[0].reactions.clone();
        assert_eq!(reactions["+1"].len(), 2);

        run(&mut doc, |o| o.toggle_reaction(&id, &cid, "+1", "u2"));
        run(&mut doc, |o| o.toggle_reaction(&id, &cid, "+1", "u1"));
        assert!(thread(&doc, &id).comments[0].reactions.is_empty());
    }

    #[test]
    fn test_unread_monotonicity() {
        let (mut doc, id) = seeded();
        run(&mut doc, |o| o.mark_unread(&id, "u1"));
        assert!(is_unread(&thread(&doc, &id), "u1"));

        run(&mut doc, |o| o.mark_read(&id, "u1", 5_000));
        assert!(!is_unread(&thread(&doc, &id), "u1"));

        run(&mut doc, |o| o.mark_unread(&id, "u1"));
        run(&mut doc, |o| o.toggle_resolved(&id, None, Some("u1"), 6_000));
        assert!(!is_unread(&thread(&doc, &id), "u1"));
    }

    #[test]
    fn test_rewrite_touches_every_split_instance() {
        let (mut doc, id) = seeded();
        // Bold splits the comment range across three nodes.
        doc.add_mark(12, 15, Mark::new("bold", Value::Null)).unwrap();
        assert_eq!(thread_ranges(&doc, COMMENT_MARK, &id).len(), 3);

        let m = ops(&doc).add_comment(&id, text("r"), &u2(), 9).unwrap();
        assert_eq!(m.transaction.steps.len(), 6);
        apply(&mut doc, &m);

        let instances = thread_ranges(&doc, COMMENT_MARK, &id);
        assert_eq!(instances.len(), 3);
        let attrs: HashSet<String> = instances
            .iter()
            .map(|n| n.mark.attrs.to_string())
            .collect();
        assert_eq!(attrs.len(), 1);
        assert_eq!(thread(&doc, &id).comments.len(), 2);
    }

    #[test]
    fn test_ids_stay_unique_across_operations() {
        let mut doc = InlineDocument::new(vec![InlineNode::text("a".repeat(40))]);
        let mut ids = Vec::new();
        for start in [0, 10, 20] {
            let m = ops(&doc).create_thread(start..start + 5, text("x"), &u1(), 1).unwrap();
            apply(&mut doc, &m);
            ids.push(m.thread_id);
        }
        for id in &ids {
            run(&mut doc, |o| o.add_comment(id, text("y"), &u2(), 2));
            run(&mut doc, |o| o.add_comment(id, text("z"), &u1(), 3));
        }
        let victim = thread(&doc, &ids[1]).comments[1].id.clone();
        run(&mut doc, |o| o.delete_comment(&ids[1], &victim, Some("u2")));

        let result = scan(&doc, COMMENT_MARK);
        let thread_ids: HashSet<_> = result.comments.iter().map(|c| c.thread.id.clone()).collect();
        assert_eq!(thread_ids.len(), 3);
        for c in &result.comments {
            let comment_ids: HashSet<_> = c.thread.comments.iter().map(|c| c.id.clone()).collect();
            assert_eq!(comment_ids.len(), c.thread.comments.len());
        }
    }

    #[test]
    fn test_draft_transactions() {
        let tr = update_draft(Draft {
            thread_id: "t".into(),
            comment_id: None,
            content: text("wip"),
        });
        assert!(!tr.doc_changed());
        assert!(matches!(tr.meta.unwrap().draft, Some(Some(_))));
        assert_eq!(clear_draft().meta.unwrap().draft, Some(None));
    }
}
