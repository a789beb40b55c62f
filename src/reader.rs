// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconciliation reader: two distinct views of message history.
//!
//! | Mode | Source | Order | Annotation |
//! |------|--------|-------|------------|
//! | [`list_messages`](ReconciliationReader::list_messages) | local store + ledger | newest first | repository → commit hash |
//! | [`fetch_remote_messages`](ReconciliationReader::fetch_remote_messages) | repositories only | oldest first | source repository |
//!
//! The remote mode never touches the local store. It rebuilds history from
//! the mirrors alone (disaster recovery, audits), so it can disagree with the
//! local feed; that is the point of having it.

use crate::config::ListConfig;
use crate::error::{MirrorError, Result};
use crate::message::{compare_timestamps, MessageEnvelope, MirroredMessage, RemoteMessage};
use crate::remote::GuardedRemote;
use crate::store::MessageRepository;
use crate::target::RepositoryTarget;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// Messages read back from the repositories, merged into one timeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemoteFeed {
    pub messages: Vec<RemoteMessage>,
    /// Repositories that could not be read, with the reason.
    pub failed: BTreeMap<String, String>,
}

/// Sort remote messages oldest first.
///
/// Timestamps compare by instant; equal instants fall back to the raw
/// string, then repository key, then message id, so the merge is total.
pub fn sort_remote(messages: &mut [RemoteMessage]) {
    messages.sort_by(|a, b| {
        compare_timestamps(&a.envelope.timestamp, &b.envelope.timestamp)
            .then_with(|| a.repository.cmp(&b.repository))
            .then_with(|| a.envelope.id.cmp(&b.envelope.id))
    });
}

pub struct ReconciliationReader {
    store: Arc<dyn MessageRepository>,
    remote: Arc<GuardedRemote>,
    list: ListConfig,
}

impl ReconciliationReader {
    pub fn new(store: Arc<dyn MessageRepository>, remote: Arc<GuardedRemote>, list: ListConfig) -> Self {
        Self { store, remote, list }
    }

    /// Local feed, newest first, each message with its known commits.
    ///
    /// `limit` defaults to the configured page size and is clamped to the
    /// configured maximum.
    pub async fn list_messages(&self, limit: Option<u32>, offset: u32) -> Result<Vec<MirroredMessage>> {
        let limit = self.list.clamp(limit);
        self.store.list_messages(limit, offset).await
    }

    /// Read every target's message files and merge them oldest first.
    ///
    /// A repository that cannot be read is reported in
    /// [`RemoteFeed::failed`]; the others are still returned.
    pub async fn fetch_remote_messages(&self, targets: &[RepositoryTarget]) -> RemoteFeed {
        let span = info_span!("remote_fetch", targets = targets.len());

        let results = join_all(targets.iter().map(|target| async move {
            let result = self.fetch_repository(target).await;
            (target.key(), result)
        }))
        .instrument(span)
        .await;

        let mut feed = RemoteFeed::default();
        for (key, result) in results {
            match result {
                Ok(messages) => {
                    crate::metrics::record_remote_fetch(&key, messages.len(), true);
                    feed.messages.extend(messages);
                }
                Err(e) => {
                    warn!(repository = %key, error = %e, "Failed to read messages from repository");
                    crate::metrics::record_remote_fetch(&key, 0, false);
                    feed.failed.insert(key, e.to_string());
                }
            }
        }

        sort_remote(&mut feed.messages);
        feed
    }

    /// All parseable message envelopes in one target's storage directory.
    pub async fn fetch_repository(&self, target: &RepositoryTarget) -> Result<Vec<RemoteMessage>> {
        let key = target.key();
        let dir = target.storage_dir();

        let entries = match self
            .remote
            .call(target, "list_directory", |s| s.list_directory(target, dir))
            .await
        {
            Ok(entries) => entries,
            Err(MirrorError::RemoteNotFound { .. }) => {
                debug!(repository = %key, path = dir, "No message directory yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let files: Vec<_> = entries.into_iter().filter(|e| e.is_json_file()).collect();

        let fetched = join_all(files.iter().map(|entry| {
            let path = entry.path.as_str();
            async move {
                let file = self
                    .remote
                    .call(target, "get_file", |s| s.get_file(target, path))
                    .await?;
                Ok::<_, MirrorError>((path, file))
            }
        }))
        .await;

        let mut messages = Vec::with_capacity(fetched.len());
        for result in fetched {
            let (path, file) = result?;
            // Deleted between listing and reading.
            let Some(file) = file else { continue };
            match MessageEnvelope::from_slice(&file.content) {
                Ok(envelope) => messages.push(RemoteMessage {
                    envelope,
                    repository: key.clone(),
                }),
                Err(e) => {
                    warn!(repository = %key, path, error = %e, "Skipping unparsable message file");
                }
            }
        }

        debug!(repository = %key, count = messages.len(), "Read messages from repository");
        Ok(messages)
    }
}
