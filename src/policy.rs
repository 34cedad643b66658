//! Capability checks consulted before every mutating forum operation.
//!
//! An [`Actor`] is built per request from the caller's id and the roles
//! currently stored for them. Nothing here is cached between requests.

use std::collections::HashSet;

use crate::auth::Role;
use crate::models::{Id, Reply, Thread, ThreadResource};
use crate::repo::{Repo, RepoResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Id,
    roles: HashSet<Role>,
}

impl Actor {
    pub fn new(user_id: Id, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { user_id, roles: roles.into_iter().collect() }
    }

    /// Resolve the caller's current roles from storage.
    pub async fn load(repo: &dyn Repo, user_id: Id) -> RepoResult<Self> {
        let roles = repo.user_roles(user_id).await?;
        Ok(Self::new(user_id, roles))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_moderator(&self) -> bool {
        self.has_role(Role::Moderator)
    }

    pub fn is_staff(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Report triage, thread locking and thread removal are open to
    /// moderators and staff alike.
    pub fn can_moderate(&self) -> bool {
        self.is_moderator() || self.is_staff()
    }

    pub fn is_author<T: Authored + ?Sized>(&self, item: &T) -> bool {
        item.author() == Some(self.user_id)
    }
}

/// Anything with a (nullable) owning user.
pub trait Authored {
    fn author(&self) -> Option<Id>;
}

impl Authored for Thread {
    fn author(&self) -> Option<Id> {
        self.author_id
    }
}

impl Authored for Reply {
    fn author(&self) -> Option<Id> {
        self.author_id
    }
}

impl Authored for ThreadResource {
    fn author(&self) -> Option<Id> {
        self.uploaded_by
    }
}
