//! Store wrapper with switchable failures.
//!
//! Delegates everything to a real in-memory [`SqliteStore`] except the
//! operations that have been told to fail, which return a closed-pool error.

use message_mirror::error::{MirrorError, Result};
use message_mirror::message::{CommitMap, Message, MirroredMessage};
use message_mirror::store::{BoxFuture, MessageRepository, SqliteStore};
use message_mirror::target::RepositoryTarget;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct FailingStore {
    inner: SqliteStore,
    fail_registration: AtomicBool,
    fail_deactivation: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_registration: AtomicBool::new(false),
            fail_deactivation: AtomicBool::new(false),
        }
    }

    pub fn fail_registration(&self, on: bool) {
        self.fail_registration.store(on, Ordering::SeqCst);
    }

    pub fn fail_deactivation(&self, on: bool) {
        self.fail_deactivation.store(on, Ordering::SeqCst);
    }

    fn refused<T: Send + 'static>() -> BoxFuture<'static, T> {
        Box::pin(async { Err(MirrorError::LocalStore(sqlx::Error::PoolClosed)) })
    }
}

impl MessageRepository for FailingStore {
    fn insert_message(&self, content: String, timestamp: String) -> BoxFuture<'_, Message> {
        self.inner.insert_message(content, timestamp)
    }

    fn get_message(&self, id: i64) -> BoxFuture<'_, Option<Message>> {
        self.inner.get_message(id)
    }

    fn list_messages(&self, limit: u32, offset: u32) -> BoxFuture<'_, Vec<MirroredMessage>> {
        self.inner.list_messages(limit, offset)
    }

    fn messages_missing(&self, repository: String, limit: u32) -> BoxFuture<'_, Vec<Message>> {
        self.inner.messages_missing(repository, limit)
    }

    fn sync_repositories(&self, targets: Vec<RepositoryTarget>) -> BoxFuture<'_, ()> {
        self.inner.sync_repositories(targets)
    }

    fn register_repository(&self, target: RepositoryTarget) -> BoxFuture<'_, ()> {
        if self.fail_registration.load(Ordering::SeqCst) {
            return Self::refused();
        }
        self.inner.register_repository(target)
    }

    fn deactivate_repository(&self, owner: String, name: String) -> BoxFuture<'_, bool> {
        if self.fail_deactivation.load(Ordering::SeqCst) {
            return Self::refused();
        }
        self.inner.deactivate_repository(owner, name)
    }

    fn record_commits(&self, message_id: i64, commits: CommitMap) -> BoxFuture<'_, usize> {
        self.inner.record_commits(message_id, commits)
    }

    fn lookup_commits(&self, message_id: i64) -> BoxFuture<'_, CommitMap> {
        self.inner.lookup_commits(message_id)
    }
}
