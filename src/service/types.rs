//! Result types returned by the service.

use crate::message::CommitMap;
use crate::remote::CommitInfo;
use serde::Serialize;
use std::fmt;

/// Errors kept per target in a push report.
pub const MAX_REPORTED_ERRORS: usize = 5;

/// A newly stored message and the repositories it reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedMessage {
    pub id: i64,
    pub content: String,
    pub timestamp: String,
    /// `owner/name` → commit hash, successes only.
    pub repositories: CommitMap,
}

/// Outcome of pushing to one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetPushStatus {
    pub repository: String,
    /// Messages that had no ledger entry for this target.
    pub attempted: usize,
    /// Of those, how many were written and recorded.
    pub mirrored: usize,
    pub failed: usize,
    /// Branch head after the push, if it could be read.
    pub head_commit: Option<String>,
    /// The first few errors, in the order they happened.
    pub errors: Vec<String>,
}

impl TargetPushStatus {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    /// Count a failure, keeping its text if there is still room.
    pub fn note_error(&mut self, error: impl fmt::Display) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error.to_string());
        }
    }

    /// Nothing failed and the head commit was read.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errors.is_empty() && self.head_commit.is_some()
    }
}

/// Per-target report of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub targets: Vec<TargetPushStatus>,
}

impl PushReport {
    pub fn total_mirrored(&self) -> usize {
        self.targets.iter().map(|t| t.mirrored).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.targets.iter().map(|t| t.failed).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.targets.iter().all(TargetPushStatus::is_clean)
    }
}

impl fmt::Display for TargetPushStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.head_commit.as_deref().unwrap_or("unknown");
        write!(
            f,
            "{}: {} pending, {} mirrored, {} failed (head {})",
            self.repository, self.attempted, self.mirrored, self.failed, head
        )?;
        for error in &self.errors {
            write!(f, "\n    - {}", error)?;
        }
        Ok(())
    }
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.targets.is_empty() {
            return write!(f, "No repositories configured.");
        }
        for status in &self.targets {
            writeln!(f, "{}", status)?;
        }
        write!(
            f,
            "Total: {} mirrored, {} failed across {} repositories",
            self.total_mirrored(),
            self.total_failed(),
            self.targets.len()
        )
    }
}

/// What the repository said about one recorded hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The commit exists in the repository.
    Verified,
    /// The repository answered but has no such commit (history rewritten).
    Missing,
    /// The repository could not be asked.
    Unreachable,
}

/// One ledger entry checked against its repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAudit {
    pub repository: String,
    pub commit_hash: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every ledger entry of one message, checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub message_id: i64,
    pub entries: Vec<CommitAudit>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.status == AuditStatus::Verified)
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "Message {} has no recorded commits.", self.message_id);
        }
        write!(f, "Message {}:", self.message_id)?;
        for entry in &self.entries {
            write!(f, "\n  {} {} ", entry.repository, entry.commit_hash)?;
            match (entry.status, &entry.commit, &entry.error) {
                (AuditStatus::Verified, Some(commit), _) => {
                    write!(f, "ok ({})", commit.message.lines().next().unwrap_or(""))?
                }
                (AuditStatus::Verified, None, _) => write!(f, "ok")?,
                (AuditStatus::Missing, _, _) => write!(f, "MISSING")?,
                (AuditStatus::Unreachable, _, error) => {
                    write!(f, "unreachable: {}", error.as_deref().unwrap_or("unknown error"))?
                }
            }
        }
        Ok(())
    }
}
