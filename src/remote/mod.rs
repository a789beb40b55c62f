// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Repository content service interface.
//!
//! Everything the mirror needs from a source-control hosting API, expressed
//! against a [`RepositoryTarget`]. The production implementation is
//! [`GitHubClient`]; tests substitute an in-memory fake.
//!
//! # Error contract
//!
//! Implementations must map failures onto the remote error variants:
//!
//! | Situation | Error |
//! |-----------|-------|
//! | Repository, branch or directory does not exist | `RemoteNotFound` |
//! | Stale revision token on update, file already exists on create | `RemoteConflict` |
//! | Anything else (transport, timeout, auth, rate limit, 5xx) | `RemoteUnavailable` |
//!
//! `get_file` and `get_commit` report a missing file or commit as `Ok(None)`,
//! not as an error.

pub mod github;
mod guarded;

pub use github::GitHubClient;
pub use guarded::GuardedRemote;

use crate::store::BoxFuture;
use crate::target::RepositoryTarget;
use serde::Serialize;

/// A file read from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Decoded file body.
    pub content: Vec<u8>,
    /// Revision token to pass to `update_file`.
    pub sha: String,
}

/// Result of a create or update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Commit created by the write, when the service reports it.
    pub commit_sha: Option<String>,
}

/// A commit as reported by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Path from the repository root.
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    /// Whether this entry looks like a mirrored message file.
    pub fn is_json_file(&self) -> bool {
        self.kind == EntryKind::File && self.name.ends_with(".json")
    }
}

/// Remote repository operations used by replication, push and remote reads.
pub trait ContentService: Send + Sync + 'static {
    /// Succeeds if the repository exists and is accessible.
    fn get_repository<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, ()>;

    /// Read a file on the target's branch. `Ok(None)` if it does not exist.
    fn get_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
    ) -> BoxFuture<'a, Option<RemoteFile>>;

    /// Create a new file on the target's branch.
    fn create_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
    ) -> BoxFuture<'a, WriteOutcome>;

    /// Replace an existing file, guarded by its current revision token.
    fn update_file<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
        revision: &'a str,
    ) -> BoxFuture<'a, WriteOutcome>;

    /// List a directory on the target's branch.
    fn list_directory<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        path: &'a str,
    ) -> BoxFuture<'a, Vec<DirEntry>>;

    /// Head commit of the target's branch.
    fn get_branch_head<'a>(&'a self, target: &'a RepositoryTarget) -> BoxFuture<'a, String>;

    /// Look up a commit by hash. `Ok(None)` if the repository has no such commit.
    fn get_commit<'a>(
        &'a self,
        target: &'a RepositoryTarget,
        sha: &'a str,
    ) -> BoxFuture<'a, Option<CommitInfo>>;
}
