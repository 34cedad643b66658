//! Thread authoring, reading and removal, plus the category lookup table.

use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Category, Id, NewCategory, NewThread, Thread, ThreadDetail, ThreadFilter};
use crate::policy::Actor;
use crate::render::render_markdown;
use crate::resources::remove_resource_files;
use crate::repo::Repo;
use crate::storage::BlobStore;

/// Splits free-text tag input on commas; blanks dropped, repeats collapsed.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for name in input.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }
    tags
}

pub async fn create_thread(repo: &dyn Repo, actor: &Actor, mut new: NewThread) -> ServiceResult<Thread> {
    new.title = new.title.trim().to_string();
    if new.title.is_empty() {
        return Err(ServiceError::Invalid("title must not be empty".into()));
    }
    if new.content.trim().is_empty() {
        return Err(ServiceError::Invalid("content must not be empty".into()));
    }
    let tags = parse_tags(&new.tags);
    let thread = repo.create_thread(actor.user_id, new, &tags).await?;
    info!(thread_id = thread.id, author = actor.user_id, tags = tags.len(), "thread created");
    Ok(thread)
}

pub async fn list_threads(repo: &dyn Repo, filter: &ThreadFilter) -> ServiceResult<Vec<Thread>> {
    Ok(repo.list_threads(filter).await?)
}

/// Reader view of a thread. Deleted replies never appear here.
pub async fn thread_detail(repo: &dyn Repo, viewer: Option<&Actor>, thread_id: Id) -> ServiceResult<ThreadDetail> {
    let thread = repo.get_thread(thread_id).await?;
    let tags = repo.thread_tags(thread_id).await?;
    let replies = repo.list_replies(thread_id, false).await?;
    let resources = repo.list_resources(thread_id).await?;
    let liked = match viewer {
        Some(actor) => repo.has_liked(thread_id, actor.user_id).await?,
        None => false,
    };
    Ok(ThreadDetail {
        content_html: render_markdown(&thread.content),
        is_author: viewer.is_some_and(|a| a.is_author(&thread)),
        is_moderator: viewer.is_some_and(Actor::is_moderator),
        thread,
        tags,
        replies,
        resources,
        liked,
    })
}

pub async fn set_locked(repo: &dyn Repo, actor: &Actor, thread_id: Id, locked: bool) -> ServiceResult<Thread> {
    if !actor.can_moderate() {
        return Err(ServiceError::Denied);
    }
    let thread = repo.set_locked(thread_id, locked).await?;
    info!(thread_id, locked, by = actor.user_id, "thread lock changed");
    Ok(thread)
}

/// Author or moderator. Each resource loses its blob and then its record;
/// a blob failure stops there and leaves the thread and the remaining
/// resources in place.
pub async fn delete_thread(repo: &dyn Repo, blobs: &dyn BlobStore, actor: &Actor, thread_id: Id) -> ServiceResult<()> {
    let thread = repo.get_thread(thread_id).await?;
    if !(actor.is_author(&thread) || actor.can_moderate()) {
        return Err(ServiceError::Denied);
    }
    for resource in repo.list_resources(thread_id).await? {
        remove_resource_files(repo, blobs, &resource).await?;
    }
    repo.delete_thread(thread_id).await?;
    info!(thread_id, by = actor.user_id, "thread deleted");
    Ok(())
}

pub async fn list_categories(repo: &dyn Repo) -> ServiceResult<Vec<Category>> {
    Ok(repo.list_categories().await?)
}

pub async fn create_category(repo: &dyn Repo, actor: &Actor, new: NewCategory) -> ServiceResult<Category> {
    if !actor.is_staff() {
        return Err(ServiceError::Denied);
    }
    let name = new.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::Invalid("category name must not be empty".into()));
    }
    Ok(repo.create_category(NewCategory { name }).await?)
}
