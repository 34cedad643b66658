//! Profiles, role administration and account removal.

use tracing::{info, warn};

use crate::auth::Role;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{DomainEvent, Recipient};
use crate::models::{Id, UpsertProfile, User};
use crate::policy::Actor;
use crate::repo::Repo;

/// Name shown in notifications when the acting user has no profile yet.
const ANONYMOUS: &str = "A forum member";

fn normalize(profile: UpsertProfile) -> ServiceResult<UpsertProfile> {
    let username = profile.username.trim().to_string();
    if username.is_empty() {
        return Err(ServiceError::Invalid("username must not be empty".into()));
    }
    let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(UpsertProfile { username, email: clean(profile.email), full_name: clean(profile.full_name) })
}

/// Create or update the caller's profile. The first registration also
/// grants the base role and yields `UserRegistered`.
pub async fn register_profile(
    repo: &dyn Repo,
    user_id: Id,
    profile: UpsertProfile,
) -> ServiceResult<(User, Vec<DomainEvent>)> {
    let profile = normalize(profile)?;
    let (user, created) = repo.upsert_user(user_id, profile).await?;
    let mut events = Vec::new();
    if created {
        repo.grant_role(user.id, Role::User).await?;
        info!(user_id = user.id, username = %user.username, "user registered");
        if let Some(recipient) = Recipient::of(&user) {
            events.push(DomainEvent::UserRegistered { user: recipient });
        }
    }
    Ok((user, events))
}

pub async fn grant_role(repo: &dyn Repo, actor: &Actor, user_id: Id, role: Role) -> ServiceResult<()> {
    if !actor.is_staff() {
        return Err(ServiceError::Denied);
    }
    repo.grant_role(user_id, role).await?;
    info!(by = actor.user_id, user_id, ?role, "role granted");
    Ok(())
}

pub async fn revoke_role(repo: &dyn Repo, actor: &Actor, user_id: Id, role: Role) -> ServiceResult<()> {
    if !actor.is_staff() {
        return Err(ServiceError::Denied);
    }
    repo.revoke_role(user_id, role).await?;
    info!(by = actor.user_id, user_id, ?role, "role revoked");
    Ok(())
}

/// Removes the account; authored content stays behind with a null author.
pub async fn delete_user(repo: &dyn Repo, actor: &Actor, user_id: Id) -> ServiceResult<()> {
    if !actor.is_staff() {
        return Err(ServiceError::Denied);
    }
    repo.delete_user(user_id).await?;
    info!(by = actor.user_id, user_id, "user deleted");
    Ok(())
}

/// Notification target for a user; lookup failures only cost the notification.
pub(crate) async fn recipient(repo: &dyn Repo, user_id: Id) -> Option<Recipient> {
    match repo.get_user(user_id).await {
        Ok(user) => Recipient::of(&user),
        Err(e) => {
            warn!(user_id, error = %e, "no notification target");
            None
        }
    }
}

pub(crate) async fn display_name(repo: &dyn Repo, user_id: Id) -> String {
    repo.get_user(user_id)
        .await
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|_| ANONYMOUS.to_string())
}
