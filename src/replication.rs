// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine: fan one message out to every repository target.
//!
//! # Fan-out
//!
//! ```text
//!                     ┌─► target A: get_file → create | update(sha) → hash
//! message ─► envelope ┼─► target B: get_file → create | update(sha) → ✗ (logged)
//!                     └─► target C: get_file → create | update(sha) → hash
//!                                      │
//!                         join_all (barrier) ─► { "A": hash, "C": hash }
//! ```
//!
//! Each target is written independently and concurrently. Results are
//! collected only after every target has finished or failed; a failure is
//! logged and becomes an absent entry, never an error for the whole fan-out.
//!
//! # Idempotence
//!
//! The file path depends only on the target and the message id. If the file
//! already exists it is updated against its current revision token instead
//! of being created again, so replaying a message (a push retry) rewrites the
//! same file. A revision that goes stale between read and write is reported
//! as a failed outcome for that target; the next push reads a fresh token.
//!
//! The engine does not retry and keeps no memory of earlier outcomes. The
//! commit ledger is the durable record of what succeeded.

use crate::error::{MirrorError, Result};
use crate::message::{CommitMap, Message};
use crate::remote::GuardedRemote;
use crate::target::RepositoryTarget;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of replicating one message to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationOutcome {
    pub target: RepositoryTarget,
    pub success: bool,
    pub commit_hash: Option<String>,
    pub error: Option<String>,
}

impl ReplicationOutcome {
    fn succeeded(target: &RepositoryTarget, commit_hash: String) -> Self {
        Self {
            target: target.clone(),
            success: true,
            commit_hash: Some(commit_hash),
            error: None,
        }
    }

    fn failed(target: &RepositoryTarget, error: &MirrorError) -> Self {
        Self {
            target: target.clone(),
            success: false,
            commit_hash: None,
            error: Some(error.to_string()),
        }
    }

    /// `owner/name` of the target.
    pub fn repository(&self) -> String {
        self.target.key()
    }
}

/// Fold outcomes into the repository → commit hash map (successes only).
pub fn commit_map(outcomes: &[ReplicationOutcome]) -> CommitMap {
    outcomes
        .iter()
        .filter_map(|o| o.commit_hash.as_ref().map(|hash| (o.repository(), hash.clone())))
        .collect()
}

/// Writes message envelopes to repository targets.
pub struct Replicator {
    remote: Arc<GuardedRemote>,
}

impl Replicator {
    pub fn new(remote: Arc<GuardedRemote>) -> Self {
        Self { remote }
    }

    /// Replicate to every target; only successes appear in the result.
    ///
    /// Zero targets yields an empty map.
    pub async fn replicate(&self, message: &Message, targets: &[RepositoryTarget]) -> CommitMap {
        commit_map(&self.replicate_outcomes(message, targets).await)
    }

    /// Replicate to every target, one outcome per target in input order.
    pub async fn replicate_outcomes(
        &self,
        message: &Message,
        targets: &[RepositoryTarget],
    ) -> Vec<ReplicationOutcome> {
        if targets.is_empty() {
            debug!(message_id = message.id, "No repository targets, nothing to replicate");
            return Vec::new();
        }

        let started = Instant::now();
        let span = info_span!("fanout", message_id = message.id, targets = targets.len());

        let outcomes = join_all(targets.iter().map(|target| async move {
            match self.replicate_one(message, target).await {
                Ok(hash) => {
                    crate::metrics::record_replication_outcome(&target.key(), true);
                    ReplicationOutcome::succeeded(target, hash)
                }
                Err(e) => {
                    warn!(
                        message_id = message.id,
                        repository = %target.key(),
                        error = %e,
                        retryable = e.is_retryable(),
                        "Replication to repository failed"
                    );
                    crate::metrics::record_replication_outcome(&target.key(), false);
                    crate::metrics::record_replication_error(&target.key(), e.kind());
                    ReplicationOutcome::failed(target, &e)
                }
            }
        }))
        .instrument(span)
        .await;

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        crate::metrics::record_fanout(targets.len(), succeeded, started.elapsed());
        info!(
            message_id = message.id,
            targets = targets.len(),
            succeeded,
            "Fan-out complete"
        );

        outcomes
    }

    /// Create-or-update the message file on one target and return the commit hash.
    pub async fn replicate_one(&self, message: &Message, target: &RepositoryTarget) -> Result<String> {
        self.replicate_one_with(message, target, None).await
    }

    /// [`replicate_one`](Self::replicate_one) with a caller-chosen commit
    /// message in place of `Add message N` / `Update message N`.
    pub async fn replicate_one_with(
        &self,
        message: &Message,
        target: &RepositoryTarget,
        commit_message: Option<&str>,
    ) -> Result<String> {
        let path = target.message_path(message.id);
        let body = message.envelope().to_json()?;

        let existing = self
            .remote
            .call(target, "get_file", |s| s.get_file(target, &path))
            .await?;

        let outcome = match existing {
            Some(file) => {
                let commit_message = commit_message
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Update message {}", message.id));
                let revision = file.sha;
                self.remote
                    .call(target, "update_file", |s| {
                        s.update_file(target, &path, body.as_bytes(), &commit_message, &revision)
                    })
                    .await?
            }
            None => {
                let commit_message = commit_message
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Add message {}", message.id));
                self.remote
                    .call(target, "create_file", |s| {
                        s.create_file(target, &path, body.as_bytes(), &commit_message)
                    })
                    .await?
            }
        };

        let hash = match outcome.commit_sha {
            Some(sha) => sha,
            None => {
                self.remote
                    .call(target, "get_branch_head", |s| s.get_branch_head(target))
                    .await?
            }
        };

        if hash.trim().is_empty() {
            return Err(MirrorError::remote(
                target.key(),
                format!("no commit hash reported for {}", path),
            ));
        }

        debug!(message_id = message.id, repository = %target.key(), commit = %hash, "Message mirrored");
        Ok(hash)
    }
}
