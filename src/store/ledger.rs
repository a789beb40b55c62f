// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Commit ledger: which repositories acknowledged which messages.
//!
//! One entry per (message, repository). Recording again for the same pair
//! overwrites the hash (a re-push produced a new commit). Entries are only
//! accepted for repositories that are currently registered; entries left
//! behind by removed repositories stay readable.

use super::{execute_with_retry, SqliteStore, SQL_NOW};
use crate::error::Result;
use crate::message::CommitMap;
use crate::target::{parse_repo_key, repo_key, RepositoryTarget};
use tracing::{debug, info, warn};

const UPSERT_TARGET: &str = r#"
    INSERT INTO repositories (owner, name, branch, storage_path, active)
    VALUES (?, ?, ?, ?, 1)
    ON CONFLICT(owner, name) DO UPDATE SET
        branch = excluded.branch,
        storage_path = excluded.storage_path,
        active = 1
"#;

impl SqliteStore {
    pub(crate) async fn upsert_target(&self, target: &RepositoryTarget) -> Result<()> {
        let pool = self.pool();

        execute_with_retry("register_repository", || async {
            sqlx::query(UPSERT_TARGET)
                .bind(&target.owner)
                .bind(&target.name)
                .bind(&target.branch)
                .bind(&target.storage_path)
                .execute(pool)
                .await
        })
        .await?;

        debug!(repository = %target.key(), "Repository registered in store");
        Ok(())
    }

    pub(crate) async fn deactivate_target(&self, owner: &str, name: &str) -> Result<bool> {
        let pool = self.pool();

        let result = execute_with_retry("deactivate_repository", || async {
            sqlx::query("UPDATE repositories SET active = 0 WHERE owner = ? AND name = ? AND active = 1")
                .bind(owner)
                .bind(name)
                .execute(pool)
                .await
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Active set becomes exactly `targets`, in one transaction.
    pub(crate) async fn sync_targets(&self, targets: &[RepositoryTarget]) -> Result<()> {
        let pool = self.pool();

        execute_with_retry("sync_repositories", || async {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE repositories SET active = 0")
                .execute(&mut *tx)
                .await?;
            for target in targets {
                sqlx::query(UPSERT_TARGET)
                    .bind(&target.owner)
                    .bind(&target.name)
                    .bind(&target.branch)
                    .bind(&target.storage_path)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await
        })
        .await?;

        info!(active = targets.len(), "Repository table reconciled with registry");
        Ok(())
    }

    pub(crate) async fn record(&self, message_id: i64, commits: &CommitMap) -> Result<usize> {
        if commits.is_empty() {
            return Ok(0);
        }

        // Resolve keys to active repository ids first; anything else is skipped.
        let mut resolved: Vec<(i64, &str)> = Vec::with_capacity(commits.len());
        let mut skipped = 0;
        for (key, hash) in commits {
            if hash.trim().is_empty() {
                warn!(message_id, repository = %key, "Empty commit hash, not recorded");
                skipped += 1;
                continue;
            }
            let (owner, name) = match parse_repo_key(key) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(message_id, repository = %key, error = %e, "Malformed repository key, not recorded");
                    skipped += 1;
                    continue;
                }
            };
            match self.active_repository_id(&owner, &name).await? {
                Some(id) => resolved.push((id, hash.as_str())),
                None => {
                    warn!(message_id, repository = %key, "Repository not registered, commit not recorded");
                    skipped += 1;
                }
            }
        }

        if resolved.is_empty() {
            crate::metrics::record_ledger_writes(0, skipped);
            return Ok(0);
        }

        let pool = self.pool();
        let upsert = format!(
            r#"
            INSERT INTO message_commits (message_id, repository_id, commit_hash, recorded_at)
            VALUES (?, ?, ?, {now})
            ON CONFLICT(message_id, repository_id) DO UPDATE SET
                commit_hash = excluded.commit_hash,
                recorded_at = excluded.recorded_at
            "#,
            now = SQL_NOW
        );
        let upsert = upsert.as_str();
        let entries = resolved.as_slice();

        execute_with_retry("record_commits", || async move {
            let mut tx = pool.begin().await?;
            for (repository_id, hash) in entries {
                sqlx::query(upsert)
                    .bind(message_id)
                    .bind(*repository_id)
                    .bind(*hash)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await
        })
        .await?;

        let written = resolved.len();
        crate::metrics::record_ledger_writes(written, skipped);
        debug!(message_id, written, skipped, "Ledger entries recorded");
        Ok(written)
    }

    pub(crate) async fn lookup(&self, message_id: i64) -> Result<CommitMap> {
        let pool = self.pool();

        let rows: Vec<(String, String, String)> = execute_with_retry("lookup_commits", || async {
            sqlx::query_as(
                r#"
                SELECT r.owner, r.name, mc.commit_hash
                FROM message_commits mc
                JOIN repositories r ON r.id = mc.repository_id
                WHERE mc.message_id = ?
                "#,
            )
            .bind(message_id)
            .fetch_all(pool)
            .await
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|(owner, name, hash)| (repo_key(&owner, &name), hash))
            .collect())
    }

    async fn active_repository_id(&self, owner: &str, name: &str) -> Result<Option<i64>> {
        let pool = self.pool();

        let id: Option<(i64,)> = execute_with_retry("resolve_repository", || async {
            sqlx::query_as("SELECT id FROM repositories WHERE owner = ? AND name = ? AND active = 1")
                .bind(owner)
                .bind(name)
                .fetch_optional(pool)
                .await
        })
        .await?;

        Ok(id.map(|(id,)| id))
    }
}
