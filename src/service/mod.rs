// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The mirror service.
//!
//! One long-lived object per process that owns every collaborator:
//! - the local store ([`MessageRepository`])
//! - the repository registry ([`TargetRegistry`])
//! - the guarded content service ([`GuardedRemote`])
//! - the replication engine and reconciliation reader built on them
//!
//! Configuration (credential, registry path, limits) is resolved once when
//! the service is built and never re-read while serving requests.
//!
//! # Write path
//!
//! ```text
//! create_message ─► store.insert (tx 1) ─► fan-out ─► store.record_commits (tx 2) ─► response
//! ```
//!
//! The message insert and the ledger write are separate transactions: the
//! fan-out between them has no atomic outcome. A message is kept even if it
//! reached no repository at all.

mod audit;
mod push;
mod types;

pub use types::{
    AuditReport, AuditStatus, CommitAudit, CreatedMessage, PushReport, TargetPushStatus,
    MAX_REPORTED_ERRORS,
};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::message::{format_timestamp, parse_timestamp, CommitMap, MirroredMessage};
use crate::reader::{ReconciliationReader, RemoteFeed};
use crate::registry::{Registration, TargetRegistry};
use crate::remote::{ContentService, GuardedRemote};
use crate::replication::Replicator;
use crate::store::MessageRepository;
use crate::target::RepositoryTarget;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct MirrorService {
    config: MirrorConfig,
    store: Arc<dyn MessageRepository>,
    registry: TargetRegistry,
    remote: Arc<GuardedRemote>,
    replicator: Replicator,
    reader: ReconciliationReader,
}

impl MirrorService {
    /// Assemble the service and reconcile the registry into the store.
    ///
    /// After this returns, the store's active repositories are exactly the
    /// registry's targets.
    pub async fn new(
        config: MirrorConfig,
        store: Arc<dyn MessageRepository>,
        registry: TargetRegistry,
        content: Arc<dyn ContentService>,
    ) -> Result<Self> {
        let remote = Arc::new(GuardedRemote::new(content, &config.remote));
        let replicator = Replicator::new(Arc::clone(&remote));
        let reader = ReconciliationReader::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            config.list.clone(),
        );

        let targets = registry.snapshot().await;
        store.sync_repositories(targets.clone()).await?;
        crate::metrics::set_registered_targets(targets.len());
        info!(
            targets = targets.len(),
            registry = %registry.path().display(),
            timeout = %humantime::format_duration(remote.timeout()),
            "Mirror service ready"
        );

        Ok(Self {
            config,
            store,
            registry,
            remote,
            replicator,
            reader,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn remote(&self) -> &GuardedRemote {
        &self.remote
    }

    /// Store a message and mirror it to every registered repository.
    ///
    /// Fails with `Validation` for empty or whitespace-only content. The
    /// content is stored and mirrored exactly as given. Remote failures never
    /// fail the call; they are simply absent from the returned repository map.
    pub async fn create_message(&self, content: &str) -> Result<CreatedMessage> {
        self.create_message_at(content, format_timestamp(Utc::now())).await
    }

    /// [`create_message`](Self::create_message) with a caller-supplied timestamp.
    ///
    /// The timestamp must be ISO-8601; it is stored normalised to UTC
    /// (`2024-01-01T08:00:00.000000Z`) so the local feed orders by instant.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub async fn create_message_at(&self, content: &str, timestamp: String) -> Result<CreatedMessage> {
        if content.trim().is_empty() {
            return Err(MirrorError::validation("Message content cannot be empty"));
        }
        let timestamp = parse_timestamp(&timestamp).map(format_timestamp).ok_or_else(|| {
            MirrorError::validation(format!("Invalid timestamp '{}': expected ISO-8601", timestamp))
        })?;

        let message = self
            .store
            .insert_message(content.to_string(), timestamp)
            .await?;
        crate::metrics::record_message_created();

        let targets = self.registry.snapshot().await;
        let commits = self.replicator.replicate(&message, &targets).await;
        let repositories = self.record(message.id, commits).await?;

        info!(
            message_id = message.id,
            mirrored = repositories.len(),
            targets = targets.len(),
            "Message created"
        );

        Ok(CreatedMessage {
            id: message.id,
            content: message.content,
            timestamp: message.timestamp,
            repositories,
        })
    }

    /// Write fan-out results to the ledger and return the entries it kept.
    async fn record(&self, message_id: i64, commits: CommitMap) -> Result<CommitMap> {
        if commits.is_empty() {
            return Ok(commits);
        }
        let written = self.store.record_commits(message_id, commits.clone()).await?;
        if written == commits.len() {
            return Ok(commits);
        }

        let recorded = self.store.lookup_commits(message_id).await?;
        let kept: CommitMap = commits
            .into_iter()
            .filter(|(key, hash)| recorded.get(key) == Some(hash))
            .collect();
        warn!(
            message_id,
            written,
            kept = kept.len(),
            "Ledger refused commits for repositories not active in the store"
        );
        Ok(kept)
    }

    /// Local feed, newest first. See [`ReconciliationReader::list_messages`].
    pub async fn list_messages(&self, limit: Option<u32>, offset: u32) -> Result<Vec<MirroredMessage>> {
        self.reader.list_messages(limit, offset).await
    }

    /// Messages rebuilt from the registered repositories alone, oldest first.
    pub async fn fetch_remote_messages(&self) -> RemoteFeed {
        let targets = self.registry.snapshot().await;
        self.reader.fetch_remote_messages(&targets).await
    }

    /// Ledger entries for one message.
    pub async fn lookup(&self, message_id: i64) -> Result<CommitMap> {
        self.store.lookup_commits(message_id).await
    }

    pub async fn targets(&self) -> Vec<RepositoryTarget> {
        self.registry.snapshot().await
    }

    /// Register a target after checking that the remote repository exists.
    ///
    /// A repository the service reports as missing is a `Validation` error;
    /// other remote failures propagate. Either way the registry is untouched.
    /// The store is written first; if the registry then fails to persist, the
    /// store is put back the way it was.
    #[instrument(skip(self, target), fields(repository = %target.key()))]
    pub async fn add_target(&self, target: RepositoryTarget) -> Result<Registration> {
        target.validate()?;

        self.remote
            .call(&target, "get_repository", |s| s.get_repository(&target))
            .await
            .map_err(|e| match e {
                MirrorError::RemoteNotFound { repository, .. } => MirrorError::validation(format!(
                    "Repository {} does not exist or is not accessible",
                    repository
                )),
                other => other,
            })?;

        let previous = self.registry.get(&target.key()).await;
        self.store.register_repository(target.clone()).await?;

        let registration = match self.registry.upsert(target.clone()).await {
            Ok(registration) => registration,
            Err(e) => {
                let restored = match previous {
                    Some(previous) => self.store.register_repository(previous).await,
                    None => self
                        .store
                        .deactivate_repository(target.owner.clone(), target.name.clone())
                        .await
                        .map(|_| ()),
                };
                if let Err(restore_err) = restored {
                    warn!(error = %restore_err, "Could not restore store after registry failure");
                }
                return Err(e);
            }
        };

        crate::metrics::set_registered_targets(self.registry.len().await);
        info!(?registration, "Repository target registered");
        Ok(registration)
    }

    /// Unregister a target by `owner/name`.
    ///
    /// Its ledger history is kept. Returns the removed target, or `None` if
    /// the key was not registered. The store is deactivated before the
    /// registry is rewritten, and re-activated if that rewrite fails.
    pub async fn remove_target(&self, key: &str) -> Result<Option<RepositoryTarget>> {
        let key = RepositoryTarget::from_key(key)?.key();
        let Some(existing) = self.registry.get(&key).await else {
            warn!(repository = %key, "Remove requested for unregistered repository");
            return Ok(None);
        };

        self.store
            .deactivate_repository(existing.owner.clone(), existing.name.clone())
            .await?;

        let removed = match self.registry.remove(&key).await {
            Ok(removed) => removed,
            Err(e) => {
                if let Err(restore_err) = self.store.register_repository(existing).await {
                    warn!(repository = %key, error = %restore_err, "Could not re-activate repository");
                }
                return Err(e);
            }
        };

        crate::metrics::set_registered_targets(self.registry.len().await);
        info!(repository = %key, "Repository target removed");
        Ok(removed)
    }
}
