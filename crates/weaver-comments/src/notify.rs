//! Outbound notification hooks.
//!
//! Delivery (email, push) belongs to the host. Hooks are fire-and-forget: a
//! failure is logged and never fed back into document state.

use smol_str::SmolStr;

use crate::error::NotifyError;

/// A notification produced by a mutation, delivered after it is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A new thread was created; every collaborator may care.
    ThreadCreated { thread_id: SmolStr },
    /// A reply landed in a thread these users participate in.
    CommentAdded {
        participants: Vec<SmolStr>,
        thread_id: SmolStr,
    },
    /// A user was mentioned.
    Mentioned {
        user_id: SmolStr,
        node_id: SmolStr,
        from_comment: bool,
    },
}

/// Host-side delivery hooks.
pub trait Notifier {
    fn on_thread_created(&mut self, _thread_id: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    fn on_comment(&mut self, participants: &[SmolStr], thread_id: &str)
    -> Result<(), NotifyError>;

    fn on_mention(
        &mut self,
        user_id: &str,
        node_id: &str,
        from_comment: bool,
    ) -> Result<(), NotifyError>;
}

/// Notifier that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn on_comment(&mut self, _: &[SmolStr], _: &str) -> Result<(), NotifyError> {
        Ok(())
    }

    fn on_mention(&mut self, _: &str, _: &str, _: bool) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Notifier that records what it was asked to deliver.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub delivered: Vec<Notification>,
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn on_thread_created(&mut self, thread_id: &str) -> Result<(), NotifyError> {
        self.delivered.push(Notification::ThreadCreated {
            thread_id: thread_id.into(),
        });
        Ok(())
    }

    fn on_comment(&mut self, participants: &[SmolStr], thread_id: &str) -> Result<(), NotifyError> {
        self.delivered.push(Notification::CommentAdded {
            participants: participants.to_vec(),
            thread_id: thread_id.into(),
        });
        Ok(())
    }

    fn on_mention(
        &mut self,
        user_id: &str,
        node_id: &str,
        from_comment: bool,
    ) -> Result<(), NotifyError> {
        self.delivered.push(Notification::Mentioned {
            user_id: user_id.into(),
            node_id: node_id.into(),
            from_comment,
        });
        Ok(())
    }
}

/// Hand each notification to `notifier`, logging failures.
pub fn deliver<N: Notifier + ?Sized>(notifier: &mut N, notifications: &[Notification]) {
    for notification in notifications {
        let result = match notification {
            Notification::ThreadCreated { thread_id } => notifier.on_thread_created(thread_id),
            Notification::CommentAdded {
                participants,
                thread_id,
            } => {
                if participants.is_empty() {
                    continue;
                }
                notifier.on_comment(participants, thread_id)
            }
            Notification::Mentioned {
                user_id,
                node_id,
                from_comment,
            } => notifier.on_mention(user_id, node_id, *from_comment),
        };
        if let Err(e) = result {
            tracing::warn!(
                target: "weaver::comments",
                error = %e,
                ?notification,
                "notification hook failed"
            );
        }
    }
}
