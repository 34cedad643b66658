use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::events::DomainEvent;
use crate::models::{Id, Reply};
use crate::policy::Actor;
use crate::repo::Repo;
use crate::users;

/// Post a reply. Locked threads refuse new replies.
pub async fn create_reply(
    repo: &dyn Repo,
    actor: &Actor,
    thread_id: Id,
    content: &str,
) -> ServiceResult<(Reply, Vec<DomainEvent>)> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ServiceError::Invalid("reply content must not be empty".into()));
    }
    let thread = repo.get_thread(thread_id).await?;
    if thread.locked {
        return Err(ServiceError::Locked);
    }
    let reply = repo.create_reply(thread_id, actor.user_id, content.to_string()).await?;
    info!(reply_id = reply.id, thread_id, author = actor.user_id, "reply created");

    let mut events = Vec::new();
    if let Some(author_id) = thread.author_id.filter(|a| *a != actor.user_id) {
        if let Some(author) = users::recipient(repo, author_id).await {
            events.push(DomainEvent::ReplyCreated {
                thread_id,
                reply_id: reply.id,
                thread_title: thread.title,
                author,
                replier_name: users::display_name(repo, actor.user_id).await,
            });
        }
    }
    Ok((reply, events))
}

/// Soft-delete a reply. Moderators may target any reply; everyone else
/// only sees their own, so a foreign reply is simply `NotFound`.
pub async fn delete_reply(repo: &dyn Repo, actor: &Actor, reply_id: Id) -> ServiceResult<Reply> {
    let scope = if actor.is_moderator() { None } else { Some(actor.user_id) };
    let reply = repo.find_reply(reply_id, scope).await?;
    let deleted = repo.soft_delete_reply(reply.id).await?;
    info!(reply_id, by = actor.user_id, moderator = scope.is_none(), "reply soft-deleted");
    Ok(deleted)
}
