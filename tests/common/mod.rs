#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use quorum::models::{Id, NewThread, Thread, UpsertProfile, User};
use quorum::notify::{Mailer, OutgoingEmail, SendError};
use quorum::policy::Actor;
use quorum::repo::inmem::InMemRepo;
use quorum::repo::{ThreadRepo, UserRepo};
use quorum::storage::{BlobStore, BlobStoreError};

// ---------------- In-memory mock BlobStore (tests only) ----------------
#[derive(Default)]
pub struct MockBlobStore {
    pub inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_deletes: AtomicBool,
    /// 1-based index of a single delete call that fails.
    pub fail_nth_delete: Mutex<Option<usize>>,
    pub delete_calls: AtomicUsize,
}

impl MockBlobStore {
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BlobStore for MockBlobStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(key) {
            return Err(BlobStoreError::Duplicate);
        }
        map.insert(key.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError> {
        let map = self.inner.lock().unwrap();
        map.get(key).cloned().ok_or(BlobStoreError::NotFound)
    }
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let n = self.delete_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_deletes.load(Ordering::SeqCst) || *self.fail_nth_delete.lock().unwrap() == Some(n) {
            return Err(BlobStoreError::Other("storage unavailable".into()));
        }
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------- Mail transport that remembers what it was given ----------------
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub attempts: AtomicU32,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        let m = Self::default();
        m.fail.store(true, Ordering::SeqCst);
        m
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ---------------- Seed helpers ----------------
pub async fn user(repo: &InMemRepo, id: Id, name: &str) -> User {
    let profile = UpsertProfile {
        username: name.to_string(),
        email: Some(format!("{name}@example.com")),
        full_name: None,
    };
    repo.upsert_user(id, profile).await.unwrap().0
}

pub async fn user_without_email(repo: &InMemRepo, id: Id, name: &str) -> User {
    let profile = UpsertProfile { username: name.to_string(), email: None, full_name: None };
    repo.upsert_user(id, profile).await.unwrap().0
}

pub async fn thread(repo: &InMemRepo, author: Id, title: &str) -> Thread {
    let new = NewThread {
        title: title.to_string(),
        content: format!("Body of *{title}*"),
        category_id: None,
        tags: String::new(),
    };
    repo.create_thread(author, new, &[]).await.unwrap()
}

pub async fn actor(repo: &InMemRepo, id: Id) -> Actor {
    Actor::load(repo, id).await.unwrap()
}
