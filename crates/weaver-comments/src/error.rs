//! Error types for comment operations.

use smol_str::SmolStr;
use thiserror::Error;

/// Errors that can occur when producing or applying a comment mutation.
///
/// Everything except `Document` and `Serialization` is a routine validation
/// failure: the UI is expected to have disabled the action already, and no
/// transaction is produced when one of these is returned.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CommentError {
    /// Tried to create a thread on a collapsed selection.
    #[error("cannot comment on an empty selection")]
    EmptySelection,

    /// Resolved threads are frozen to new replies.
    #[error("thread {0} is resolved")]
    ThreadResolved(SmolStr),

    /// Requester is not the author of the comment.
    #[error("only the author can modify comment {0}")]
    NotAuthor(SmolStr),

    /// The comment is the last one in its thread; delete the thread instead.
    #[error("comment {0} is the only comment in its thread")]
    SoleComment(SmolStr),

    /// No mark in the document carries this thread id.
    #[error("thread {0} not found")]
    ThreadNotFound(SmolStr),

    /// Thread exists but has no comment with this id.
    #[error("comment {comment_id} not found in thread {thread_id}")]
    CommentNotFound {
        thread_id: SmolStr,
        comment_id: SmolStr,
    },

    /// The host document rejected the transaction.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Thread attrs could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a host document while applying a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentError {
    /// A step addressed a range outside the document.
    #[error("range {from}..{to} is outside the document (size {size})")]
    OutOfRange { from: usize, to: usize, size: usize },

    /// A step had its bounds reversed.
    #[error("invalid range {from}..{to}")]
    InvalidRange { from: usize, to: usize },
}

/// A notification hook failed. Never propagated into document state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

impl From<&str> for NotifyError {
    fn from(s: &str) -> Self {
        NotifyError(s.to_string())
    }
}

impl From<String> for NotifyError {
    fn from(s: String) -> Self {
        NotifyError(s)
    }
}
