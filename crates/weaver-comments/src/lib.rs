//! weaver-comments: mark-anchored comment threads for collaborative documents.
//!
//! Threads live entirely in the attrs of a comment mark on the document, so
//! they replicate with the document and need no side store. This crate
//! provides:
//! - `CommentDocument` trait the host document implements, plus
//!   `InlineDocument` as a reference host
//! - the scanner that derives the comment list from marks
//! - transaction-producing operations with author and resolution rules
//! - `PluginState`, the client-local state machine (focus, drafts, filters)
//! - the bubble layout sweep and small-screen aggregation
//! - `CommentEngine`, which ties it all together for a host

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod events;
pub mod inline;
pub mod layout;
pub mod mentions;
pub mod notify;
pub mod ops;
pub mod policy;
pub mod registry;
pub mod scanner;
pub mod schedule;
pub mod state;
pub mod types;

pub use config::{CommentsConfig, ConfigError};
pub use document::{
    AnchorContext, COMMENT_MARK, CommentDocument, Mark, MarkedNode, Step, Transaction,
};
pub use engine::{
    CommentEngine, ConfirmationRequest, DeepLink, DeepLinkKind, DeepLinkTarget,
    DestructiveAction, Session,
};
pub use error::{CommentError, DocumentError, NotifyError};
pub use events::{SubscriptionId, ThreadsBus, ThreadsEvent};
pub use inline::{InlineDocument, InlineNode};
pub use layout::{
    BubblePosition, ClusterAction, LayoutConfig, LayoutOutcome, Measured, Measurement, Measurements,
    Viewport, compute_layout,
};
pub use notify::{NoopNotifier, Notification, Notifier};
pub use ops::{Mutation, Ops};
pub use registry::AnchorRegistry;
pub use scanner::{ScanResult, orphan_sweep, scan, thread_ranges};
pub use schedule::{LayoutRequest, LayoutScheduler, LayoutTrigger, ScheduleConfig};
pub use smol_str::SmolStr;
pub use state::{ActiveThread, Draft, PluginState, StateMeta};
pub use types::{Author, Comment, CommentWithPosition, Thread, Timestamp};
