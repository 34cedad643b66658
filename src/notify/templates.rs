//! Fixed subject/body templates for each notification kind.
//!
//! Bodies are built as HTML with maud (so every interpolated value is
//! escaped) and then degraded to plain text for the alternative part.

use maud::{html, Markup};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Notification, OutgoingEmail};

/// Site identity used in subjects and links.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    pub url: String,
}

impl Site {
    fn forum_link(&self) -> String {
        format!("{}/forum", self.url.trim_end_matches('/'))
    }
}

pub fn render(notification: &Notification, site: &Site) -> OutgoingEmail {
    let (subject, body) = match notification {
        Notification::Welcome { user_name, .. } => (
            format!("Welcome to {}!", site.name),
            html! {
                h2 { "Welcome to " (site.name) ", " (user_name) "!" }
                p { "Thank you for creating an account on our forum." }
                p { "You can now:" }
                ul {
                    li { "Create and participate in discussions" }
                    li { "Reply to threads" }
                    li { "Like and react to posts" }
                    li { "Join our community" }
                }
                p { "If you have any questions, feel free to reach out to us." }
                p { "Happy discussing!" }
            },
        ),
        Notification::ThreadReply { reply_author_name, thread_title, .. } => (
            format!("New reply to your thread: {thread_title}"),
            html! {
                h3 { "You have a new reply!" }
                p { strong { (reply_author_name) } " replied to your thread:" }
                p { em { "\"" (thread_title) "\"" } }
                p { "Click the link below to view the reply:" }
                p { a href=(site.forum_link()) { "View Thread" } }
            },
        ),
        Notification::ThreadLike { liker_name, thread_title, .. } => (
            format!("Your thread was liked: {thread_title}"),
            html! {
                h3 { "Your thread received a like!" }
                p { strong { (liker_name) } " liked your thread:" }
                p { em { "\"" (thread_title) "\"" } }
                p { a href=(site.forum_link()) { "View Thread" } }
            },
        ),
        Notification::ReplyLike { liker_name, thread_title, .. } => (
            format!("Your reply was liked: {thread_title}"),
            html! {
                h3 { "Your reply received a like!" }
                p { strong { (liker_name) } " liked your reply in:" }
                p { em { "\"" (thread_title) "\"" } }
                p { a href=(site.forum_link()) { "View Reply" } }
            },
        ),
        Notification::ReportFiled { reporter_name, thread_title, reason, .. } => (
            format!("Your thread has been reported: {thread_title}"),
            html! {
                h3 { "Your thread has been reported" }
                p { strong { (reporter_name) } " reported your thread:" }
                p { em { "\"" (thread_title) "\"" } }
                p { strong { "Reason:" } " " (reason) }
                p { "Our moderation team will review this report shortly." }
                p { a href=(site.forum_link()) { "View Thread" } }
            },
        ),
        Notification::AdminGeneric { subject, message, details, .. } => (
            subject.clone(),
            admin_body(subject, message, details),
        ),
    };
    let html = body.into_string();
    let text = strip_tags(&html);
    OutgoingEmail { to: notification.recipient().to_string(), subject, html, text }
}

fn admin_body(subject: &str, message: &str, details: &[(String, String)]) -> Markup {
    html! {
        h3 { (subject) }
        p { (message) }
        @if !details.is_empty() {
            p { strong { "Details:" } }
            ul {
                @for (key, value) in details {
                    li { strong { (key) ":" } " " (value) }
                }
            }
        }
    }
}

static BLOCK_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(p|h[1-6]|li|ul|ol|div|blockquote|pre)\s*>|<br\s*/?>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Plain-text rendition of an HTML body: markup removed, entities decoded,
/// one line per block element.
pub fn strip_tags(html: &str) -> String {
    let with_breaks = BLOCK_END.replace_all(html, "\n");
    let bare = ANY_TAG.replace_all(&with_breaks, "");
    let decoded = bare
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
