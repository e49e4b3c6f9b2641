//! Read and resolution predicates.
//!
//! These are the single source of truth for UI enablement (menu items,
//! badges) and for the authorization checks in [`crate::ops`].

use smol_str::SmolStr;

use crate::types::Thread;

/// Whether `thread` has comments newer than `user_id` last saw.
///
/// Anonymous users (empty id) never see threads as unread. A user with no
/// `lastOpened` entry has seen nothing.
pub fn is_unread(thread: &Thread, user_id: &str) -> bool {
    if user_id.is_empty() {
        return false;
    }
    let last_opened = thread.last_opened.get(user_id).copied().unwrap_or(0);
    thread
        .latest_activity()
        .is_some_and(|latest| latest > last_opened)
}

/// Number of comments `user_id` has not seen yet.
pub fn unread_count(thread: &Thread, user_id: &str) -> usize {
    if user_id.is_empty() {
        return 0;
    }
    let last_opened = thread.last_opened.get(user_id).copied().unwrap_or(0);
    thread
        .comments
        .iter()
        .filter(|c| c.created_at > last_opened)
        .count()
}

pub fn is_resolved(thread: &Thread) -> bool {
    thread.resolved
}

/// A sole comment cannot be deleted on its own; delete the thread instead.
pub fn is_sole_comment(thread: &Thread) -> bool {
    thread.comments.len() == 1
}

pub fn is_comment_author(thread: &Thread, comment_id: &str, user_id: &str) -> bool {
    thread
        .comment(comment_id)
        .and_then(|c| c.author_id.as_deref())
        .is_some_and(|author| author == user_id)
}

pub fn is_anonymous_comment(thread: &Thread, comment_id: &str) -> bool {
    thread.comment(comment_id).is_some_and(|c| c.is_anonymous())
}

/// Whether `user_id` may edit or delete the comment.
///
/// Authors may modify their own comments. Anonymous comments have no identity
/// to check, so any anonymous caller may modify them.
pub fn can_modify_comment(thread: &Thread, comment_id: &str, user_id: Option<&str>) -> bool {
    match user_id.filter(|u| !u.is_empty()) {
        Some(user) => is_comment_author(thread, comment_id, user),
        None => is_anonymous_comment(thread, comment_id),
    }
}

/// Distinct author ids across the thread, in first-comment order.
pub fn participants(thread: &Thread) -> Vec<SmolStr> {
    let mut out: Vec<SmolStr> = Vec::new();
    for author in thread.comments.iter().filter_map(|c| c.author_id.as_ref()) {
        if !out.contains(author) {
            out.push(author.clone());
        }
    }
    out
}
