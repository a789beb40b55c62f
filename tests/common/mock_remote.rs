//! In-memory content service for testing.
//!
//! Behaves like a tiny GitHub: repositories hold files with blob shas,
//! writes produce commits, stale revisions conflict. Every call is recorded,
//! and failures or delays can be injected per repository.

use message_mirror::error::{MirrorError, Result};
use message_mirror::remote::{CommitInfo, ContentService, DirEntry, EntryKind, RemoteFile, WriteOutcome};
use message_mirror::store::BoxFuture;
use message_mirror::target::RepositoryTarget;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub repository: String,
    pub operation: &'static str,
    pub path: String,
}

/// Failure injected for every call to a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    NotFound,
    Conflict,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    sha: String,
}

#[derive(Default)]
struct Repo {
    /// Path → file, ordered so listings are deterministic.
    files: BTreeMap<String, StoredFile>,
    head: Option<String>,
    /// Commit sha → commit message.
    commits: HashMap<String, String>,
}

pub struct MockRemote {
    repos: RwLock<HashMap<String, Repo>>,
    failures: RwLock<HashMap<String, Failure>>,
    delays: RwLock<HashMap<String, Duration>>,
    calls: RwLock<Vec<Call>>,
    /// Repositories whose `get_repository` is allowed to succeed.
    existing: RwLock<HashSet<String>>,
    counter: AtomicUsize,
    report_commit_sha: AtomicBool,
}

impl MockRemote {
    /// A service where the given repositories exist and are empty.
    pub fn with_repos(keys: &[&str]) -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            delays: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            existing: RwLock::new(keys.iter().map(|k| k.to_string()).collect()),
            counter: AtomicUsize::new(0),
            report_commit_sha: AtomicBool::new(true),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn set_failure(&self, repository: &str, failure: Failure) {
        self.failures.write().await.insert(repository.to_string(), failure);
    }

    pub async fn clear_failure(&self, repository: &str) {
        self.failures.write().await.remove(repository);
    }

    pub async fn set_delay(&self, repository: &str, delay: Duration) {
        self.delays.write().await.insert(repository.to_string(), delay);
    }

    /// Stop returning commit shas from writes (forces the branch-head fallback).
    pub fn omit_commit_sha(&self) {
        self.report_commit_sha.store(false, Ordering::SeqCst);
    }

    /// Put a file directly, bypassing the write path.
    pub async fn put_file(&self, repository: &str, path: &str, content: &[u8]) {
        let sha = self.next("blob");
        let commit = self.next("commit");
        let mut repos = self.repos.write().await;
        let repo = repos.entry(repository.to_string()).or_default();
        repo.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_vec(),
                sha,
            },
        );
        repo.commits.insert(commit.clone(), format!("Put {}", path));
        repo.head = Some(commit);
    }

    /// Drop a commit from history, as a force-push would.
    pub async fn forget_commit(&self, repository: &str, sha: &str) {
        if let Some(repo) = self.repos.write().await.get_mut(repository) {
            repo.commits.remove(sha);
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.read().await.clone()
    }

    pub async fn count_calls(&self, repository: &str, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.repository == repository && c.operation == operation)
            .count()
    }

    pub async fn file(&self, repository: &str, path: &str) -> Option<Vec<u8>> {
        let repos = self.repos.read().await;
        repos.get(repository)?.files.get(path).map(|f| f.content.clone())
    }

    pub async fn file_count(&self, repository: &str) -> usize {
        let repos = self.repos.read().await;
        repos.get(repository).map(|r| r.files.len()).unwrap_or(0)
    }

    pub async fn head(&self, repository: &str) -> Option<String> {
        let repos = self.repos.read().await;
        repos.get(repository)?.head.clone()
    }

    pub async fn commit_message(&self, repository: &str, sha: &str) -> Option<String> {
        let repos = self.repos.read().await;
        repos.get(repository)?.commits.get(sha).cloned()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn next(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Record the call, sleep if configured, and apply any injected failure.
    async fn enter(&self, target: &RepositoryTarget, operation: &'static str, path: &str) -> Result<()> {
        let key = target.key();
        self.calls.write().await.push(Call {
            repository: key.clone(),
            operation,
            path: path.to_string(),
        });

        let delay = self.delays.read().await.get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.failures.read().await.get(&key) {
            None => Ok(()),
            Some(Failure::Unavailable) => Err(MirrorError::remote(&key, "injected outage")),
            Some(Failure::NotFound) => Err(MirrorError::RemoteNotFound {
                repository: key,
                path: path.to_string(),
            }),
            Some(Failure::Conflict) => Err(MirrorError::RemoteConflict {
                repository: key,
                path: path.to_string(),
            }),
        }
    }

    async fn write(&self, target: &RepositoryTarget, path: &str, content: &[u8], message: &str) -> WriteOutcome {
        let sha = self.next("blob");
        let commit = self.next("commit");
        let mut repos = self.repos.write().await;
        let repo = repos.entry(target.key()).or_default();
        repo.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_vec(),
                sha,
            },
        );
        repo.commits.insert(commit.clone(), message.to_string());
        repo.head = Some(commit.clone());

        WriteOutcome {
            commit_sha: self.report_commit_sha.load(Ordering::SeqCst).then_some(commit),
        }
    }
}

impl ContentService for MockRemote {
    fn get_repository<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.enter(target, "get_repository", "").await?;
            if self.existing.read().await.contains(&target.key()) {
                Ok(())
            } else {
                Err(MirrorError::RemoteNotFound {
                    repository: target.key(),
                    path: String::new(),
                })
            }
        })
    }

    fn get_file<'a>(&'a self, target: &'a RepositoryTarget, path: &'a str) -> BoxFuture<'a, Option<RemoteFile>> {
        Box::pin(async move {
            self.enter(target, "get_file", path).await?;
            let repos = self.repos.read().await;
            Ok(repos
                .get(&target.key())
                .and_then(|r| r.files.get(path))
                .map(|f| RemoteFile {
                    content: f.content.clone(),
                    sha: f.sha.clone(),
                }))
        })
    }

    fn create_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
    ) -> BoxFuture<'a, WriteOutcome> {
        Box::pin(async move {
            self.enter(target, "create_file", path).await?;
            let exists = self
                .repos
                .read()
                .await
                .get(&target.key())
                .is_some_and(|r| r.files.contains_key(path));
            if exists {
                return Err(MirrorError::RemoteConflict {
                    repository: target.key(),
                    path: path.to_string(),
                });
            }
            Ok(self.write(target, path, content, message).await)
        })
    }

    fn update_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
        revision: &'a str,
    ) -> BoxFuture<'a, WriteOutcome> {
        Box::pin(async move {
            self.enter(target, "update_file", path).await?;
            let current = self
                .repos
                .read()
                .await
                .get(&target.key())
                .and_then(|r| r.files.get(path))
                .map(|f| f.sha.clone());
            match current {
                None => Err(MirrorError::RemoteNotFound {
                    repository: target.key(),
                    path: path.to_string(),
                }),
                Some(sha) if sha != revision => Err(MirrorError::RemoteConflict {
                    repository: target.key(),
                    path: path.to_string(),
                }),
                Some(_) => Ok(self.write(target, path, content, message).await),
            }
        })
    }

    fn list_directory<'a>(&'a self, target: &'a RepositoryTarget, path: &'a str) -> BoxFuture<'a, Vec<DirEntry>> {
        Box::pin(async move {
            self.enter(target, "list_directory", path).await?;
            let prefix = format!("{}/", path.trim_matches('/'));
            let repos = self.repos.read().await;
            let entries: Vec<DirEntry> = repos
                .get(&target.key())
                .map(|r| {
                    r.files
                        .keys()
                        .filter_map(|p| {
                            let name = p.strip_prefix(&prefix)?;
                            (!name.contains('/')).then(|| DirEntry {
                                name: name.to_string(),
                                path: p.clone(),
                                kind: EntryKind::File,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            // Git has no empty directories.
            if entries.is_empty() {
                return Err(MirrorError::RemoteNotFound {
                    repository: target.key(),
                    path: path.to_string(),
                });
            }
            Ok(entries)
        })
    }

    fn get_branch_head<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, String> {
        Box::pin(async move {
            self.enter(target, "get_branch_head", &target.branch).await?;
            let repos = self.repos.read().await;
            Ok(repos
                .get(&target.key())
                .and_then(|r| r.head.clone())
                .unwrap_or_else(|| "initial-commit".to_string()))
        })
    }

    fn get_commit<'a>(&'a self, target: &'a RepositoryTarget, sha: &'a str) -> BoxFuture<'a, Option<CommitInfo>> {
        Box::pin(async move {
            self.enter(target, "get_commit", sha).await?;
            let repos = self.repos.read().await;
            Ok(repos
                .get(&target.key())
                .and_then(|r| r.commits.get(sha))
                .map(|message| CommitInfo {
                    sha: sha.to_string(),
                    message: message.clone(),
                    author: Some("mock".to_string()),
                    date: None,
                }))
        })
    }
}
