// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Message log queries.

use super::{execute_with_retry, SqliteStore};
use crate::error::Result;
use crate::message::{CommitMap, Message, MirroredMessage};
use crate::target::{parse_repo_key, repo_key};
use tracing::debug;

type MessageRow = (i64, String, String, String);

/// One row of the paged outer join: the message plus at most one ledger entry.
type FeedRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn to_message((id, content, timestamp, created_at): MessageRow) -> Message {
    Message {
        id,
        content,
        timestamp,
        created_at,
    }
}

/// Fold joined rows into annotated messages, keeping the row order.
fn fold_feed(rows: Vec<FeedRow>) -> Vec<MirroredMessage> {
    let mut feed: Vec<MirroredMessage> = Vec::new();

    for (id, content, timestamp, created_at, owner, name, commit_hash) in rows {
        let is_new = feed.last().map_or(true, |last| last.message.id != id);
        if is_new {
            feed.push(MirroredMessage {
                message: Message {
                    id,
                    content,
                    timestamp,
                    created_at,
                },
                repositories: CommitMap::new(),
            });
        }
        if let (Some(owner), Some(name), Some(hash), Some(entry)) =
            (owner, name, commit_hash, feed.last_mut())
        {
            entry.repositories.insert(repo_key(&owner, &name), hash);
        }
    }

    feed
}

impl SqliteStore {
    pub(crate) async fn insert(&self, content: &str, timestamp: &str) -> Result<Message> {
        let pool = self.pool();

        let row: MessageRow = execute_with_retry("insert_message", || async {
            sqlx::query_as(
                r#"
                INSERT INTO messages (content, timestamp)
                VALUES (?, ?)
                RETURNING id, content, timestamp, created_at
                "#,
            )
            .bind(content)
            .bind(timestamp)
            .fetch_one(pool)
            .await
        })
        .await?;

        debug!(message_id = row.0, "Message stored");
        Ok(to_message(row))
    }

    pub(crate) async fn get(&self, id: i64) -> Result<Option<Message>> {
        let pool = self.pool();

        let row: Option<MessageRow> = execute_with_retry("get_message", || async {
            sqlx::query_as("SELECT id, content, timestamp, created_at FROM messages WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await
        })
        .await?;

        Ok(row.map(to_message))
    }

    /// Mode 1 feed page. LIMIT/OFFSET apply to messages, not joined rows,
    /// so a page never cuts a message's repository map short.
    pub(crate) async fn page(&self, limit: u32, offset: u32) -> Result<Vec<MirroredMessage>> {
        let pool = self.pool();

        let rows: Vec<FeedRow> = execute_with_retry("list_messages", || async {
            sqlx::query_as(
                r#"
                SELECT m.id, m.content, m.timestamp, m.created_at,
                       r.owner, r.name, mc.commit_hash
                FROM (
                    SELECT id, content, timestamp, created_at
                    FROM messages
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ? OFFSET ?
                ) AS m
                LEFT JOIN message_commits mc ON mc.message_id = m.id
                LEFT JOIN repositories r ON r.id = mc.repository_id
                ORDER BY m.timestamp DESC, m.id DESC, r.owner, r.name
                "#,
            )
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(pool)
            .await
        })
        .await?;

        Ok(fold_feed(rows))
    }

    pub(crate) async fn missing_for(&self, repository: &str, limit: u32) -> Result<Vec<Message>> {
        let (owner, name) = parse_repo_key(repository)?;
        let pool = self.pool();

        let rows: Vec<MessageRow> = execute_with_retry("messages_missing", || async {
            sqlx::query_as(
                r#"
                SELECT m.id, m.content, m.timestamp, m.created_at
                FROM messages m
                WHERE NOT EXISTS (
                    SELECT 1
                    FROM message_commits mc
                    JOIN repositories r ON r.id = mc.repository_id
                    WHERE mc.message_id = m.id AND r.owner = ? AND r.name = ?
                )
                ORDER BY m.timestamp ASC, m.id ASC
                LIMIT ?
                "#,
            )
            .bind(&owner)
            .bind(&name)
            .bind(i64::from(limit))
            .fetch_all(pool)
            .await
        })
        .await?;

        Ok(rows.into_iter().map(to_message).collect())
    }
}
