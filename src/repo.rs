use chrono::Utc;

use crate::auth::Role;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Threads per listing page.
pub const PAGE_SIZE: usize = 10;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// Insert or update a profile; the flag is true when the user is new.
    async fn upsert_user(&self, id: Id, profile: UpsertProfile) -> RepoResult<(User, bool)>;
    /// Unknown users simply have no roles.
    async fn user_roles(&self, id: Id) -> RepoResult<Vec<Role>>;
    async fn grant_role(&self, id: Id, role: Role) -> RepoResult<()>;
    async fn revoke_role(&self, id: Id, role: Role) -> RepoResult<()>;
    /// Content is kept with nulled author references; likes go with the user.
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn list_threads(&self, filter: &ThreadFilter) -> RepoResult<Vec<Thread>>;
    /// Creates the thread and attaches `tag_names`, creating missing tags.
    async fn create_thread(&self, author_id: Id, new: NewThread, tag_names: &[String]) -> RepoResult<Thread>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>>;
    async fn set_locked(&self, id: Id, locked: bool) -> RepoResult<Thread>;
    /// Cascades to replies, likes, reports and resource records.
    async fn delete_thread(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    async fn list_replies(&self, thread_id: Id, include_deleted: bool) -> RepoResult<Vec<Reply>>;
    async fn create_reply(&self, thread_id: Id, author_id: Id, content: String) -> RepoResult<Reply>;
    /// Visible reply lookup, optionally restricted to one author.
    async fn find_reply(&self, id: Id, author_scope: Option<Id>) -> RepoResult<Reply>;
    async fn soft_delete_reply(&self, id: Id) -> RepoResult<Reply>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// Flip the (thread, user) like and adjust the counter in one atomic step.
    async fn toggle_like(&self, thread_id: Id, user_id: Id) -> RepoResult<LikeState>;
    async fn has_liked(&self, thread_id: Id, user_id: Id) -> RepoResult<bool>;
    async fn count_likes(&self, thread_id: Id) -> RepoResult<i64>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// `Conflict` when the reporter already reported this thread.
    async fn create_report(&self, thread_id: Id, reporter_id: Id, new: NewReport) -> RepoResult<Report>;
    async fn has_reported(&self, thread_id: Id, reporter_id: Id) -> RepoResult<bool>;
    async fn get_report(&self, id: Id) -> RepoResult<Report>;
    async fn list_reports(&self, filter: ReportFilter) -> RepoResult<Vec<Report>>;
    /// Compare-and-set on the status; `Conflict` when it is no longer `from`.
    async fn transition_report(&self, id: Id, from: ReportStatus, to: ReportStatus, handled_by: Id) -> RepoResult<Report>;
}

#[async_trait]
pub trait ResourceRepo: Send + Sync {
    async fn create_resource(&self, new: NewThreadResource) -> RepoResult<ThreadResource>;
    async fn get_resource(&self, id: Id) -> RepoResult<ThreadResource>;
    async fn list_resources(&self, thread_id: Id) -> RepoResult<Vec<ThreadResource>>;
    async fn delete_resource(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + CategoryRepo + ThreadRepo + ReplyRepo + LikeRepo + ReportRepo + ResourceRepo {}

impl<T> Repo for T where T: UserRepo + CategoryRepo + ThreadRepo + ReplyRepo + LikeRepo + ReportRepo + ResourceRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        roles: HashMap<Id, Vec<Role>>,
        categories: HashMap<Id, Category>,
        tags: HashMap<Id, Tag>,
        threads: HashMap<Id, Thread>,
        thread_tags: Vec<(Id, Id)>, // (thread, tag)
        replies: HashMap<Id, Reply>,
        likes: HashMap<Id, Like>,
        reports: HashMap<Id, Report>,
        resources: HashMap<Id, ThreadResource>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn thread_mut(&mut self, id: Id) -> RepoResult<&mut Thread> {
            self.threads.get_mut(&id).ok_or(RepoError::NotFound)
        }

        fn like_of(&self, thread_id: Id, user_id: Id) -> Option<Id> {
            self.likes
                .values()
                .find(|l| l.thread_id == thread_id && l.user_id == user_id)
                .map(|l| l.id)
        }
    }

    /// Single-lock store: every mutation, counter maintenance included,
    /// happens under one write guard.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Non-persistent store (tests, throwaway runs).
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Store backed by `<dir>/state.json`, loaded now and rewritten after each mutation.
        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("[inmem] Loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("[inmem] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let bytes = match self.state.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => return,
            };
            match bytes {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(&**path, bytes) {
                        tracing::error!("[inmem] Failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => tracing::error!("[inmem] Failed to encode snapshot: {e}"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::ephemeral() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn upsert_user(&self, id: Id, profile: UpsertProfile) -> RepoResult<(User, bool)> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.username == profile.username && u.id != id) {
                return Err(RepoError::Conflict);
            }
            let created = !s.users.contains_key(&id);
            let user = s.users.entry(id).or_insert_with(|| User {
                id,
                username: String::new(),
                email: None,
                full_name: None,
                created_at: Utc::now(),
            });
            user.username = profile.username;
            user.email = profile.email;
            user.full_name = profile.full_name;
            let user = user.clone();
            drop(s);
            self.persist();
            Ok((user, created))
        }
        async fn user_roles(&self, id: Id) -> RepoResult<Vec<Role>> {
            Ok(self.read()?.roles.get(&id).cloned().unwrap_or_default())
        }
        async fn grant_role(&self, id: Id, role: Role) -> RepoResult<()> {
            let mut s = self.write()?;
            if !s.users.contains_key(&id) { return Err(RepoError::NotFound); }
            let roles = s.roles.entry(id).or_default();
            if !roles.contains(&role) { roles.push(role); }
            drop(s);
            self.persist();
            Ok(())
        }
        async fn revoke_role(&self, id: Id, role: Role) -> RepoResult<()> {
            let mut s = self.write()?;
            if let Some(roles) = s.roles.get_mut(&id) { roles.retain(|r| *r != role); }
            drop(s);
            self.persist();
            Ok(())
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.users.remove(&id).is_none() { return Err(RepoError::NotFound); }
            s.roles.remove(&id);
            // likes leave with the user; keep counters in step
            let gone: Vec<Like> = s.likes.values().filter(|l| l.user_id == id).cloned().collect();
            for like in gone {
                s.likes.remove(&like.id);
                if let Some(t) = s.threads.get_mut(&like.thread_id) { t.like_count -= 1; }
            }
            for t in s.threads.values_mut().filter(|t| t.author_id == Some(id)) { t.author_id = None; }
            for r in s.replies.values_mut().filter(|r| r.author_id == Some(id)) { r.author_id = None; }
            for r in s.reports.values_mut() {
                if r.reporter_id == Some(id) { r.reporter_id = None; }
                if r.handled_by == Some(id) { r.handled_by = None; }
            }
            for r in s.resources.values_mut().filter(|r| r.uploaded_by == Some(id)) { r.uploaded_by = None; }
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            let mut v: Vec<_> = self.read()?.categories.values().cloned().collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }
        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let mut s = self.write()?;
            if s.categories.values().any(|c| c.name == new.name) { return Err(RepoError::Conflict); }
            let id = s.next_id();
            let category = Category { id, name: new.name };
            s.categories.insert(id, category.clone());
            drop(s);
            self.persist();
            Ok(category)
        }
        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.categories.remove(&id).is_none() { return Err(RepoError::NotFound); }
            for t in s.threads.values_mut().filter(|t| t.category_id == Some(id)) { t.category_id = None; }
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn list_threads(&self, filter: &ThreadFilter) -> RepoResult<Vec<Thread>> {
            let s = self.read()?;
            let tag_id = match filter.tag.as_deref() {
                Some(name) => match s.tags.values().find(|t| t.name == name) {
                    Some(t) => Some(t.id),
                    None => return Ok(Vec::new()),
                },
                None => None,
            };
            let mut v: Vec<_> = s.threads.values()
                .filter(|t| filter.category_id.map_or(true, |c| t.category_id == Some(c)))
                .filter(|t| filter.author_id.map_or(true, |a| t.author_id == Some(a)))
                .filter(|t| tag_id.map_or(true, |tag| s.thread_tags.contains(&(t.id, tag))))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));  // latest first
            let page = filter.page.unwrap_or(1).max(1) as usize;
            Ok(v.into_iter().skip((page - 1) * PAGE_SIZE).take(PAGE_SIZE).collect())
        }
        async fn create_thread(&self, author_id: Id, new: NewThread, tag_names: &[String]) -> RepoResult<Thread> {
            let mut s = self.write()?;
            if let Some(c) = new.category_id {
                if !s.categories.contains_key(&c) { return Err(RepoError::NotFound); }
            }
            let now = Utc::now();
            let id = s.next_id();
            let thread = Thread {
                id,
                title: new.title,
                content: new.content,
                author_id: Some(author_id),
                category_id: new.category_id,
                locked: false,
                like_count: 0,
                created_at: now,
                updated_at: now,
            };
            s.threads.insert(id, thread.clone());
            for name in tag_names {
                let tag_id = match s.tags.values().find(|t| &t.name == name) {
                    Some(t) => t.id,
                    None => {
                        let tag_id = s.next_id();
                        s.tags.insert(tag_id, Tag { id: tag_id, name: name.clone() });
                        tag_id
                    }
                };
                if !s.thread_tags.contains(&(id, tag_id)) { s.thread_tags.push((id, tag_id)); }
            }
            drop(s);
            self.persist();
            Ok(thread)
        }
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            self.read()?.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.thread_tags.iter()
                .filter(|(t, _)| *t == id)
                .filter_map(|(_, tag)| s.tags.get(tag).cloned())
                .collect();
            v.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(v)
        }
        async fn set_locked(&self, id: Id, locked: bool) -> RepoResult<Thread> {
            let mut s = self.write()?;
            let thread = s.thread_mut(id)?;
            thread.locked = locked;
            thread.updated_at = Utc::now();
            let updated = thread.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.threads.remove(&id).is_none() { return Err(RepoError::NotFound); }
            s.thread_tags.retain(|(t, _)| *t != id);
            s.replies.retain(|_, r| r.thread_id != id);
            s.likes.retain(|_, l| l.thread_id != id);
            s.reports.retain(|_, r| r.thread_id != id);
            s.resources.retain(|_, r| r.thread_id != id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyRepo for InMemRepo {
        async fn list_replies(&self, thread_id: Id, include_deleted: bool) -> RepoResult<Vec<Reply>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.replies
                .values()
                .filter(|r| r.thread_id == thread_id && (include_deleted || !r.is_deleted))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));    // ascending
            Ok(v)
        }
        async fn create_reply(&self, thread_id: Id, author_id: Id, content: String) -> RepoResult<Reply> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&thread_id) { return Err(RepoError::NotFound); }
            let now = Utc::now();
            let id = s.next_id();
            let reply = Reply {
                id,
                thread_id,
                content,
                author_id: Some(author_id),
                is_deleted: false,
                created_at: now,
                updated_at: now,
            };
            s.replies.insert(id, reply.clone());
            drop(s);
            self.persist();
            Ok(reply)
        }
        async fn find_reply(&self, id: Id, author_scope: Option<Id>) -> RepoResult<Reply> {
            let s = self.read()?;
            s.replies.get(&id)
                .filter(|r| !r.is_deleted)
                .filter(|r| author_scope.map_or(true, |a| r.author_id == Some(a)))
                .cloned()
                .ok_or(RepoError::NotFound)
        }
        async fn soft_delete_reply(&self, id: Id) -> RepoResult<Reply> {
            let mut s = self.write()?;
            let reply = s.replies.get_mut(&id).ok_or(RepoError::NotFound)?;
            reply.is_deleted = true;
            reply.updated_at = Utc::now();
            let updated = reply.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn toggle_like(&self, thread_id: Id, user_id: Id) -> RepoResult<LikeState> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&thread_id) { return Err(RepoError::NotFound); }
            let liked = match s.like_of(thread_id, user_id) {
                Some(like_id) => {
                    s.likes.remove(&like_id);
                    s.thread_mut(thread_id)?.like_count -= 1;
                    false
                }
                None => {
                    let id = s.next_id();
                    s.likes.insert(id, Like { id, thread_id, user_id, created_at: Utc::now() });
                    s.thread_mut(thread_id)?.like_count += 1;
                    true
                }
            };
            let like_count = s.thread_mut(thread_id)?.like_count;
            drop(s);
            self.persist();
            Ok(LikeState { liked, like_count })
        }
        async fn has_liked(&self, thread_id: Id, user_id: Id) -> RepoResult<bool> {
            Ok(self.read()?.like_of(thread_id, user_id).is_some())
        }
        async fn count_likes(&self, thread_id: Id) -> RepoResult<i64> {
            Ok(self.read()?.likes.values().filter(|l| l.thread_id == thread_id).count() as i64)
        }
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn create_report(&self, thread_id: Id, reporter_id: Id, new: NewReport) -> RepoResult<Report> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&thread_id) { return Err(RepoError::NotFound); }
            // uniqueness is decided under the same guard as the insert
            if s.reports.values().any(|r| r.thread_id == thread_id && r.reporter_id == Some(reporter_id)) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = s.next_id();
            let report = Report {
                id,
                thread_id,
                reporter_id: Some(reporter_id),
                reason: new.reason,
                description: new.description,
                status: ReportStatus::Pending,
                handled_by: None,
                created_at: now,
                updated_at: now,
            };
            s.reports.insert(id, report.clone());
            drop(s);
            self.persist();
            Ok(report)
        }
        async fn has_reported(&self, thread_id: Id, reporter_id: Id) -> RepoResult<bool> {
            Ok(self.read()?.reports.values().any(|r| r.thread_id == thread_id && r.reporter_id == Some(reporter_id)))
        }
        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            self.read()?.reports.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn list_reports(&self, filter: ReportFilter) -> RepoResult<Vec<Report>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.reports.values()
                .filter(|r| filter.status.map_or(true, |st| r.status == st))
                .filter(|r| filter.reason.map_or(true, |re| r.reason == re))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }
        async fn transition_report(&self, id: Id, from: ReportStatus, to: ReportStatus, handled_by: Id) -> RepoResult<Report> {
            let mut s = self.write()?;
            let report = s.reports.get_mut(&id).ok_or(RepoError::NotFound)?;
            if report.status != from { return Err(RepoError::Conflict); }
            report.status = to;
            report.handled_by = Some(handled_by);
            report.updated_at = Utc::now();
            let updated = report.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl ResourceRepo for InMemRepo {
        async fn create_resource(&self, new: NewThreadResource) -> RepoResult<ThreadResource> {
            let mut s = self.write()?;
            if !s.threads.contains_key(&new.thread_id) { return Err(RepoError::NotFound); }
            let id = s.next_id();
            let resource = ThreadResource {
                id,
                thread_id: new.thread_id,
                title: new.title,
                file_key: new.file_key,
                file_type: new.file_type,
                mime: new.mime,
                uploaded_by: Some(new.uploaded_by),
                description: new.description,
                created_at: Utc::now(),
            };
            s.resources.insert(id, resource.clone());
            drop(s);
            self.persist();
            Ok(resource)
        }
        async fn get_resource(&self, id: Id) -> RepoResult<ThreadResource> {
            self.read()?.resources.get(&id).cloned().ok_or(RepoError::NotFound)
        }
        async fn list_resources(&self, thread_id: Id) -> RepoResult<Vec<ThreadResource>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.resources.values().filter(|r| r.thread_id == thread_id).cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));   // newest first
            Ok(v)
        }
        async fn delete_resource(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            if s.resources.remove(&id).is_none() { return Err(RepoError::NotFound); }
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const THREAD_COLS: &str = "id, title, content, author_id, category_id, locked, like_count, created_at, updated_at";
    const REPLY_COLS: &str = "id, thread_id, content, author_id, is_deleted, created_at, updated_at";
    const REPORT_COLS: &str = "id, thread_id, reporter_id, reason, description, status, handled_by, created_at, updated_at";
    const RESOURCE_COLS: &str = "id, thread_id, title, file_key, file_type, mime, uploaded_by, description, created_at";

    fn map_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>("SELECT id, username, email, full_name, created_at FROM users WHERE id=$1")
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn upsert_user(&self, id: Id, profile: UpsertProfile) -> RepoResult<(User, bool)> {
            // xmax = 0 only for freshly inserted rows
            let (user, created) = sqlx::query_as::<_, (Id, String, Option<String>, Option<String>, chrono::DateTime<Utc>, bool)>(r#"
                INSERT INTO users (id, username, email, full_name) VALUES ($1,$2,$3,$4)
                ON CONFLICT (id) DO UPDATE SET username = EXCLUDED.username, email = EXCLUDED.email, full_name = EXCLUDED.full_name
                RETURNING id, username, email, full_name, created_at, (xmax = 0) AS created
            "#)
                .bind(id).bind(&profile.username).bind(&profile.email).bind(&profile.full_name)
                .fetch_one(&self.pool).await.map_err(map_err)
                .map(|(id, username, email, full_name, created_at, created)| {
                    (User { id, username, email, full_name, created_at }, created)
                })?;
            Ok((user, created))
        }
        async fn user_roles(&self, id: Id) -> RepoResult<Vec<Role>> {
            sqlx::query_scalar::<_, Role>("SELECT role FROM user_roles WHERE user_id=$1")
                .bind(id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn grant_role(&self, id: Id, role: Role) -> RepoResult<()> {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1,$2) ON CONFLICT DO NOTHING")
                .bind(id).bind(role)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }
        async fn revoke_role(&self, id: Id, role: Role) -> RepoResult<()> {
            sqlx::query("DELETE FROM user_roles WHERE user_id=$1 AND role=$2")
                .bind(id).bind(role)
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }
        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            // likes cascade with the user; take their counter share with them
            sqlx::query("UPDATE threads t SET like_count = t.like_count - 1 FROM likes l WHERE l.thread_id = t.id AND l.user_id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            let res = sqlx::query("DELETE FROM users WHERE id=$1")
                .bind(id)
                .execute(&mut *tx).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            tx.commit().await.map_err(map_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>("INSERT INTO categories (name) VALUES ($1) RETURNING id, name")
                .bind(&new.name)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM categories WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn list_threads(&self, filter: &ThreadFilter) -> RepoResult<Vec<Thread>> {
            let page = filter.page.unwrap_or(1).max(1) as i64;
            let sql = format!(r#"
                SELECT {THREAD_COLS} FROM threads t
                WHERE ($1::bigint IS NULL OR t.category_id = $1)
                  AND ($2::bigint IS NULL OR t.author_id = $2)
                  AND ($3::text IS NULL OR EXISTS (
                        SELECT 1 FROM thread_tags tt JOIN tags g ON g.id = tt.tag_id
                        WHERE tt.thread_id = t.id AND g.name = $3))
                ORDER BY t.created_at DESC, t.id DESC
                LIMIT $4 OFFSET $5
            "#);
            sqlx::query_as::<_, Thread>(&sql)
                .bind(filter.category_id)
                .bind(filter.author_id)
                .bind(filter.tag.as_deref())
                .bind(PAGE_SIZE as i64)
                .bind((page - 1) * PAGE_SIZE as i64)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn create_thread(&self, author_id: Id, new: NewThread, tag_names: &[String]) -> RepoResult<Thread> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            let thread = sqlx::query_as::<_, Thread>(&format!(
                "INSERT INTO threads (title, content, author_id, category_id) VALUES ($1,$2,$3,$4) RETURNING {THREAD_COLS}"
            ))
                .bind(&new.title).bind(&new.content).bind(author_id).bind(new.category_id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            for name in tag_names {
                // no-op update so RETURNING yields the existing row too
                let tag_id: Id = sqlx::query_scalar(
                    "INSERT INTO tags (name) VALUES ($1) ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id"
                )
                    .bind(name)
                    .fetch_one(&mut *tx).await.map_err(map_err)?;
                sqlx::query("INSERT INTO thread_tags (thread_id, tag_id) VALUES ($1,$2) ON CONFLICT DO NOTHING")
                    .bind(thread.id).bind(tag_id)
                    .execute(&mut *tx).await.map_err(map_err)?;
            }
            tx.commit().await.map_err(map_err)?;
            Ok(thread)
        }
        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLS} FROM threads WHERE id=$1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn thread_tags(&self, id: Id) -> RepoResult<Vec<Tag>> {
            sqlx::query_as::<_, Tag>(
                "SELECT g.id, g.name FROM tags g JOIN thread_tags tt ON tt.tag_id = g.id WHERE tt.thread_id=$1 ORDER BY g.name"
            )
                .bind(id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn set_locked(&self, id: Id, locked: bool) -> RepoResult<Thread> {
            sqlx::query_as::<_, Thread>(&format!(
                "UPDATE threads SET locked=$2, updated_at=now() WHERE id=$1 RETURNING {THREAD_COLS}"
            ))
                .bind(id).bind(locked)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn delete_thread(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM threads WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl ReplyRepo for PgRepo {
        async fn list_replies(&self, thread_id: Id, include_deleted: bool) -> RepoResult<Vec<Reply>> {
            sqlx::query_as::<_, Reply>(&format!(
                "SELECT {REPLY_COLS} FROM replies WHERE thread_id=$1 AND ($2 OR NOT is_deleted) ORDER BY created_at ASC, id ASC"
            ))
                .bind(thread_id).bind(include_deleted)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn create_reply(&self, thread_id: Id, author_id: Id, content: String) -> RepoResult<Reply> {
            sqlx::query_as::<_, Reply>(&format!(
                "INSERT INTO replies (thread_id, content, author_id) VALUES ($1,$2,$3) RETURNING {REPLY_COLS}"
            ))
                .bind(thread_id).bind(&content).bind(author_id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn find_reply(&self, id: Id, author_scope: Option<Id>) -> RepoResult<Reply> {
            sqlx::query_as::<_, Reply>(&format!(
                "SELECT {REPLY_COLS} FROM replies WHERE id=$1 AND NOT is_deleted AND ($2::bigint IS NULL OR author_id = $2)"
            ))
                .bind(id).bind(author_scope)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn soft_delete_reply(&self, id: Id) -> RepoResult<Reply> {
            sqlx::query_as::<_, Reply>(&format!(
                "UPDATE replies SET is_deleted=TRUE, updated_at=now() WHERE id=$1 RETURNING {REPLY_COLS}"
            ))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn toggle_like(&self, thread_id: Id, user_id: Id) -> RepoResult<LikeState> {
            let mut tx = self.pool.begin().await.map_err(map_err)?;
            // row lock serialises toggles on the same thread
            sqlx::query("SELECT id FROM threads WHERE id=$1 FOR UPDATE")
                .bind(thread_id)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            let removed = sqlx::query("DELETE FROM likes WHERE thread_id=$1 AND user_id=$2")
                .bind(thread_id).bind(user_id)
                .execute(&mut *tx).await.map_err(map_err)?
                .rows_affected();
            let (liked, delta) = if removed > 0 {
                (false, -1i64)
            } else {
                let inserted = sqlx::query(
                    "INSERT INTO likes (thread_id, user_id) VALUES ($1,$2) ON CONFLICT (thread_id, user_id) DO NOTHING"
                )
                    .bind(thread_id).bind(user_id)
                    .execute(&mut *tx).await.map_err(map_err)?
                    .rows_affected();
                (true, if inserted > 0 { 1 } else { 0 })
            };
            let like_count: i64 = sqlx::query_scalar(
                "UPDATE threads SET like_count = like_count + $2 WHERE id=$1 RETURNING like_count"
            )
                .bind(thread_id).bind(delta)
                .fetch_one(&mut *tx).await.map_err(map_err)?;
            tx.commit().await.map_err(map_err)?;
            Ok(LikeState { liked, like_count })
        }
        async fn has_liked(&self, thread_id: Id, user_id: Id) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM likes WHERE thread_id=$1 AND user_id=$2)")
                .bind(thread_id).bind(user_id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn count_likes(&self, thread_id: Id) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE thread_id=$1")
                .bind(thread_id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn create_report(&self, thread_id: Id, reporter_id: Id, new: NewReport) -> RepoResult<Report> {
            // unique (thread_id, reporter_id) decides races
            sqlx::query_as::<_, Report>(&format!(
                "INSERT INTO reports (thread_id, reporter_id, reason, description) VALUES ($1,$2,$3,$4) RETURNING {REPORT_COLS}"
            ))
                .bind(thread_id).bind(reporter_id).bind(new.reason).bind(&new.description)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn has_reported(&self, thread_id: Id, reporter_id: Id) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reports WHERE thread_id=$1 AND reporter_id=$2)")
                .bind(thread_id).bind(reporter_id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            sqlx::query_as::<_, Report>(&format!("SELECT {REPORT_COLS} FROM reports WHERE id=$1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn list_reports(&self, filter: ReportFilter) -> RepoResult<Vec<Report>> {
            sqlx::query_as::<_, Report>(&format!(r#"
                SELECT {REPORT_COLS} FROM reports
                WHERE ($1::report_status IS NULL OR status = $1)
                  AND ($2::report_reason IS NULL OR reason = $2)
                ORDER BY created_at DESC, id DESC
            "#))
                .bind(filter.status).bind(filter.reason)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn transition_report(&self, id: Id, from: ReportStatus, to: ReportStatus, handled_by: Id) -> RepoResult<Report> {
            let updated = sqlx::query_as::<_, Report>(&format!(
                "UPDATE reports SET status=$3, handled_by=$4, updated_at=now() WHERE id=$1 AND status=$2 RETURNING {REPORT_COLS}"
            ))
                .bind(id).bind(from).bind(to).bind(handled_by)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            match updated {
                Some(r) => Ok(r),
                // either gone or moved underneath us
                None => self.get_report(id).await.and(Err(RepoError::Conflict)),
            }
        }
    }

    #[async_trait]
    impl ResourceRepo for PgRepo {
        async fn create_resource(&self, new: NewThreadResource) -> RepoResult<ThreadResource> {
            sqlx::query_as::<_, ThreadResource>(&format!(r#"
                INSERT INTO thread_resources (thread_id, title, file_key, file_type, mime, uploaded_by, description)
                VALUES ($1,$2,$3,$4,$5,$6,$7) RETURNING {RESOURCE_COLS}
            "#))
                .bind(new.thread_id).bind(&new.title).bind(&new.file_key).bind(new.file_type)
                .bind(&new.mime).bind(new.uploaded_by).bind(&new.description)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn get_resource(&self, id: Id) -> RepoResult<ThreadResource> {
            sqlx::query_as::<_, ThreadResource>(&format!("SELECT {RESOURCE_COLS} FROM thread_resources WHERE id=$1"))
                .bind(id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }
        async fn list_resources(&self, thread_id: Id) -> RepoResult<Vec<ThreadResource>> {
            sqlx::query_as::<_, ThreadResource>(&format!(
                "SELECT {RESOURCE_COLS} FROM thread_resources WHERE thread_id=$1 ORDER BY created_at DESC, id DESC"
            ))
                .bind(thread_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }
        async fn delete_resource(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM thread_resources WHERE id=$1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }
}
