//! Transactional notifications: what gets sent for which event, and how.

pub mod mailer;
pub mod templates;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::DomainEvent;
use crate::retry::{JobHandler, RetryQueue};
pub use mailer::{LogMailer, Mailer, SmtpMailer};
pub use templates::Site;

/// Characters of a report description forwarded to moderators.
pub const REPORT_EXCERPT_CHARS: usize = 100;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    ThreadReply,
    ThreadLike,
    /// Kept for forward compatibility; no current flow emits it.
    ReplyLike,
    ReportFiled,
    AdminGeneric,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Welcome => "welcome",
            Self::ThreadReply => "thread_reply",
            Self::ThreadLike => "thread_like",
            Self::ReplyLike => "reply_like",
            Self::ReportFiled => "report_filed",
            Self::AdminGeneric => "admin_generic",
        };
        f.write_str(s)
    }
}

/// A notification kind together with its template data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    Welcome { to: String, user_name: String },
    ThreadReply { to: String, reply_author_name: String, thread_title: String },
    ThreadLike { to: String, liker_name: String, thread_title: String },
    ReplyLike { to: String, liker_name: String, thread_title: String },
    ReportFiled { to: String, reporter_name: String, thread_title: String, reason: String },
    AdminGeneric { to: String, subject: String, message: String, details: Vec<(String, String)> },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Welcome { .. } => NotificationKind::Welcome,
            Self::ThreadReply { .. } => NotificationKind::ThreadReply,
            Self::ThreadLike { .. } => NotificationKind::ThreadLike,
            Self::ReplyLike { .. } => NotificationKind::ReplyLike,
            Self::ReportFiled { .. } => NotificationKind::ReportFiled,
            Self::AdminGeneric { .. } => NotificationKind::AdminGeneric,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Welcome { to, .. }
            | Self::ThreadReply { to, .. }
            | Self::ThreadLike { to, .. }
            | Self::ReplyLike { to, .. }
            | Self::ReportFiled { to, .. }
            | Self::AdminGeneric { to, .. } => to,
        }
    }
}

/// A fully rendered message, HTML and plain-text bodies together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Formats notifications and hands them to a transport.
pub struct Dispatcher {
    mailer: Arc<dyn Mailer>,
    site: Site,
}

impl Dispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, site: Site) -> Self {
        Self { mailer, site }
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let email = templates::render(notification, &self.site);
        self.mailer.deliver(&email).await?;
        info!(kind = %notification.kind(), to = %email.to, "notification sent");
        Ok(())
    }
}

#[async_trait]
impl JobHandler<Notification> for Dispatcher {
    type Error = SendError;

    async fn handle(&self, job: &Notification) -> Result<(), SendError> {
        self.send(job).await
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Notifications owed for one domain event.
pub fn notifications_for(event: &DomainEvent) -> Vec<Notification> {
    match event {
        DomainEvent::UserRegistered { user } => vec![Notification::Welcome {
            to: user.email.clone(),
            user_name: user.display_name.clone(),
        }],
        DomainEvent::ThreadLiked { thread_title, author, liker_name, .. } => vec![Notification::ThreadLike {
            to: author.email.clone(),
            liker_name: liker_name.clone(),
            thread_title: thread_title.clone(),
        }],
        DomainEvent::ReplyCreated { thread_title, author, replier_name, .. } => vec![Notification::ThreadReply {
            to: author.email.clone(),
            reply_author_name: replier_name.clone(),
            thread_title: thread_title.clone(),
        }],
        DomainEvent::ReportFiled {
            thread_title,
            reason,
            description,
            reporter_name,
            author,
            author_is_moderator,
            ..
        } => {
            let Some(author) = author else { return Vec::new() };
            let mut out = vec![Notification::ReportFiled {
                to: author.email.clone(),
                reporter_name: reporter_name.clone(),
                thread_title: thread_title.clone(),
                reason: reason.label().to_string(),
            }];
            if *author_is_moderator {
                out.push(Notification::AdminGeneric {
                    to: author.email.clone(),
                    subject: format!("New Report: {thread_title}"),
                    message: format!(
                        "A report has been submitted for the thread by {}",
                        author.display_name
                    ),
                    details: vec![
                        ("Thread".into(), thread_title.clone()),
                        ("Reason".into(), reason.label().to_string()),
                        ("Reporter".into(), reporter_name.clone()),
                        ("Description".into(), excerpt(description, REPORT_EXCERPT_CHARS)),
                    ],
                });
            }
            out
        }
    }
}

/// How a notification leaves the request.
#[derive(Clone)]
pub enum Delivery {
    /// Sent inline; failures are logged and dropped.
    Immediate,
    /// Handed to the background retry runner.
    Queued(RetryQueue<Notification>),
}

/// Routes domain events to the dispatcher. Never fails the caller.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<Dispatcher>,
    delivery: Delivery,
}

impl Notifier {
    pub fn new(dispatcher: Arc<Dispatcher>, delivery: Delivery) -> Self {
        Self { dispatcher, delivery }
    }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in &events {
            for notification in notifications_for(event) {
                self.deliver(event.name(), notification).await;
            }
        }
    }

    async fn deliver(&self, event: &str, notification: Notification) {
        let kind = notification.kind();
        match &self.delivery {
            Delivery::Immediate => {
                if let Err(e) = self.dispatcher.send(&notification).await {
                    warn!(%event, %kind, error = %e, "notification failed; dropped");
                }
            }
            Delivery::Queued(queue) => {
                if queue.enqueue(notification).is_err() {
                    warn!(%event, %kind, "retry queue closed; notification dropped");
                }
            }
        }
    }
}
