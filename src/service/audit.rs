// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Audit: check a message's ledger entries against the repositories.
//!
//! A recorded hash can stop resolving if a repository's history is rewritten.
//! The audit asks each repository for the commit, concurrently, and reports
//! one status per entry. Repositories that were unregistered are still
//! asked, on their default branch.

use super::types::{AuditReport, AuditStatus, CommitAudit};
use super::MirrorService;
use crate::error::{MirrorError, Result};
use crate::target::RepositoryTarget;
use futures::future::join_all;
use tracing::{info, warn};

impl MirrorService {
    /// Check every ledger entry of `message_id`.
    ///
    /// An unknown message is a `Validation` error. Remote failures become
    /// `Unreachable` entries, never an error for the whole audit.
    pub async fn audit_message(&self, message_id: i64) -> Result<AuditReport> {
        if self.store.get_message(message_id).await?.is_none() {
            return Err(MirrorError::validation(format!("Message {} not found", message_id)));
        }
        let ledger = self.store.lookup_commits(message_id).await?;

        let mut pending = Vec::with_capacity(ledger.len());
        for (key, hash) in ledger {
            let target = match self.registry.get(&key).await {
                Some(target) => target,
                None => RepositoryTarget::from_key(&key)?,
            };
            pending.push((target, hash));
        }

        let entries = join_all(
            pending
                .iter()
                .map(|(target, hash)| self.audit_entry(target, hash)),
        )
        .await;

        let report = AuditReport { message_id, entries };
        info!(message_id, entries = report.entries.len(), clean = report.is_clean(), "Ledger audit finished");
        Ok(report)
    }

    async fn audit_entry(&self, target: &RepositoryTarget, hash: &str) -> CommitAudit {
        let mut entry = CommitAudit {
            repository: target.key(),
            commit_hash: hash.to_string(),
            status: AuditStatus::Unreachable,
            commit: None,
            error: None,
        };

        match self
            .remote
            .call(target, "get_commit", |s| s.get_commit(target, hash))
            .await
        {
            Ok(Some(commit)) => {
                entry.status = AuditStatus::Verified;
                entry.commit = Some(commit);
            }
            Ok(None) => {
                warn!(repository = %entry.repository, commit = %hash, "Recorded commit not found");
                entry.status = AuditStatus::Missing;
            }
            Err(e) => {
                warn!(repository = %entry.repository, error = %e, "Could not audit commit");
                entry.error = Some(e.to_string());
            }
        }
        entry
    }
}
