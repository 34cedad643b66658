//! Side effects are returned from operations as explicit events and routed
//! by the caller, never fired from inside storage.

use crate::models::{Id, ReportReason, User};

/// Who should hear about something, resolved at the time of the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: Id,
    pub email: String,
    pub display_name: String,
}

impl Recipient {
    /// `None` when the user has no address to write to.
    pub fn of(user: &User) -> Option<Self> {
        let email = user.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some(Self {
            user_id: user.id,
            email: email.to_string(),
            display_name: user.display_name().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    UserRegistered {
        user: Recipient,
    },
    ThreadLiked {
        thread_id: Id,
        thread_title: String,
        author: Recipient,
        liker_name: String,
    },
    ReplyCreated {
        thread_id: Id,
        reply_id: Id,
        thread_title: String,
        author: Recipient,
        replier_name: String,
    },
    ReportFiled {
        report_id: Id,
        thread_id: Id,
        thread_title: String,
        reason: ReportReason,
        description: String,
        reporter_name: String,
        /// Thread author, when present and reachable.
        author: Option<Recipient>,
        /// Set when the thread author holds the Moderator role.
        author_is_moderator: bool,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered { .. } => "user_registered",
            DomainEvent::ThreadLiked { .. } => "thread_liked",
            DomainEvent::ReplyCreated { .. } => "reply_created",
            DomainEvent::ReportFiled { .. } => "report_filed",
        }
    }
}
