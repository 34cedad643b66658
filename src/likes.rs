use tracing::debug;

use crate::error::ServiceResult;
use crate::events::DomainEvent;
use crate::models::{Id, LikeState};
use crate::policy::Actor;
use crate::repo::Repo;
use crate::users;

/// Flip the caller's like on a thread.
///
/// The flip and the counter update happen in one storage step, so the
/// returned count always equals the number of like rows. A new like on
/// somebody else's thread yields `ThreadLiked` for its author.
pub async fn toggle_like(
    repo: &dyn Repo,
    actor: &Actor,
    thread_id: Id,
) -> ServiceResult<(LikeState, Vec<DomainEvent>)> {
    let state = repo.toggle_like(thread_id, actor.user_id).await?;
    debug!(thread_id, user_id = actor.user_id, liked = state.liked, count = state.like_count, "like toggled");

    let mut events = Vec::new();
    if !state.liked {
        return Ok((state, events));
    }
    let Ok(thread) = repo.get_thread(thread_id).await else {
        return Ok((state, events));
    };
    let Some(author_id) = thread.author_id.filter(|a| *a != actor.user_id) else {
        return Ok((state, events));
    };
    if let Some(author) = users::recipient(repo, author_id).await {
        events.push(DomainEvent::ThreadLiked {
            thread_id,
            thread_title: thread.title,
            author,
            liker_name: users::display_name(repo, actor.user_id).await,
        });
    }
    Ok((state, events))
}
