// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Push: replay unmirrored messages to their targets.
//!
//! For each target, every message without a ledger entry for it is
//! replicated again, oldest first, and each success is recorded. Targets run
//! concurrently; messages within a target run one after another so a push
//! never floods a single repository.
//!
//! Remote failures are collected into the report. A local store failure
//! aborts the whole push.
//!
//! A push may carry its own commit message; otherwise each file write uses
//! the usual `Add message N` / `Update message N`.

use super::types::{PushReport, TargetPushStatus};
use super::MirrorService;
use crate::error::{MirrorError, Result};
use crate::message::CommitMap;
use crate::target::RepositoryTarget;
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

impl MirrorService {
    /// Push to every registered target.
    pub async fn push_all(&self) -> Result<PushReport> {
        self.push(None, None).await
    }

    /// Push to a single registered target.
    pub async fn push_repository(&self, key: &str) -> Result<PushReport> {
        self.push(Some(key), None).await
    }

    /// Push to one registered target, or to all of them, optionally with a
    /// custom commit message. An empty message counts as none.
    pub async fn push(&self, repository: Option<&str>, commit_message: Option<&str>) -> Result<PushReport> {
        let targets = match repository {
            Some(key) => {
                let target = self.registry.get(key).await.ok_or_else(|| {
                    MirrorError::validation(format!("Repository {} is not registered", key))
                })?;
                vec![target]
            }
            None => self.registry.snapshot().await,
        };
        let commit_message = commit_message.filter(|m| !m.trim().is_empty());
        self.push_targets(&targets, commit_message).await
    }

    /// Push to the given targets, one status per target in input order.
    pub async fn push_targets(
        &self,
        targets: &[RepositoryTarget],
        commit_message: Option<&str>,
    ) -> Result<PushReport> {
        let span = info_span!("push", targets = targets.len());

        let results = join_all(targets.iter().map(|target| self.push_target(target, commit_message)))
            .instrument(span)
            .await;

        let statuses = results.into_iter().collect::<Result<Vec<_>>>()?;
        let report = PushReport { targets: statuses };
        info!(
            targets = report.targets.len(),
            mirrored = report.total_mirrored(),
            failed = report.total_failed(),
            "Push complete"
        );
        Ok(report)
    }

    async fn push_target(
        &self,
        target: &RepositoryTarget,
        commit_message: Option<&str>,
    ) -> Result<TargetPushStatus> {
        let started = Instant::now();
        let key = target.key();
        let mut status = TargetPushStatus::new(&key);

        let pending = self
            .store
            .messages_missing(key.clone(), self.config.remote.push_batch_limit)
            .await?;
        status.attempted = pending.len();
        debug!(repository = %key, pending = pending.len(), "Pushing unmirrored messages");

        for message in &pending {
            match self
                .replicator
                .replicate_one_with(message, target, commit_message)
                .await
            {
                Ok(hash) => {
                    let commits = CommitMap::from([(key.clone(), hash)]);
                    if self.store.record_commits(message.id, commits).await? == 1 {
                        status.mirrored += 1;
                    } else {
                        status.failed += 1;
                        status.note_error(format!(
                            "message {}: ledger refused commit, repository not registered",
                            message.id
                        ));
                    }
                }
                Err(e) => {
                    warn!(repository = %key, message_id = message.id, error = %e, "Push of message failed");
                    status.failed += 1;
                    status.note_error(format!("message {}: {}", message.id, e));
                }
            }
        }

        match self
            .remote
            .call(target, "get_branch_head", |s| s.get_branch_head(target))
            .await
        {
            Ok(head) => status.head_commit = Some(head),
            Err(e) => {
                warn!(repository = %key, error = %e, "Could not read branch head");
                status.note_error(format!("head commit: {}", e));
            }
        }

        crate::metrics::record_push(&key, status.attempted, status.mirrored, started.elapsed());
        info!(
            repository = %key,
            attempted = status.attempted,
            mirrored = status.mirrored,
            failed = status.failed,
            "Repository push finished"
        );
        Ok(status)
    }
}
